/// 电源状态协调
///
/// 清单过滤 -> 等待操作队列清空 -> 规划 -> 提交并等待任务 -> 汇总结果

pub mod facts;
pub mod guard;
pub mod inventory;
pub mod planner;
pub mod provision;
pub mod reconciler;
pub mod waiter;

use common::{DesiredState, Error, Result, VmRecord, VmSelector};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::hypervisor::XenApi;

pub use guard::PendingOperationGuard;
pub use reconciler::{ReconcileOptions, ReconcileReport, Reconciler};
pub use waiter::AsyncTaskWaiter;

/// 轮询参数
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub poll_interval: Duration,
    /// None 表示不限时
    pub guard_timeout: Option<Duration>,
    /// None 表示不限时
    pub task_timeout: Option<Duration>,
    pub concurrency: usize,
}

impl EngineSettings {
    pub fn guard(&self) -> PendingOperationGuard {
        PendingOperationGuard::new(self.poll_interval, self.guard_timeout)
    }

    pub fn waiter(&self) -> AsyncTaskWaiter {
        AsyncTaskWaiter::new(self.poll_interval, self.task_timeout)
    }
}

/// 一次协调请求
#[derive(Debug, Clone)]
pub struct ApplyRequest {
    pub selector: VmSelector,
    pub desired: DesiredState,
    /// `present` 时用于创建虚拟机的模板名称
    pub template: Option<String>,
    pub asynchronous: bool,
    pub check_mode: bool,
}

impl ApplyRequest {
    /// 校验参数组合
    pub fn validate(&self) -> Result<()> {
        let empty = match &self.selector {
            VmSelector::Names(names) => names.is_empty(),
            VmSelector::Tags(tags) => tags.is_empty(),
        };
        if empty {
            return Err(Error::InvalidArgument("名称或标签列表不能为空".to_string()));
        }
        if self.desired == DesiredState::Present {
            if self.template.as_deref().map_or(true, str::is_empty) {
                return Err(Error::InvalidArgument(
                    "期望状态为 present 时必须指定 template".to_string(),
                ));
            }
            if !matches!(self.selector, VmSelector::Names(_)) {
                return Err(Error::InvalidArgument(
                    "期望状态为 present 时必须按名称选择虚拟机".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// 协调入口：获取清单并将每台虚拟机推进到期望状态
pub async fn apply(
    api: &dyn XenApi,
    settings: &EngineSettings,
    request: &ApplyRequest,
    cancel: CancellationToken,
) -> Result<ReconcileReport> {
    request.validate()?;

    let inventory = fetch_inventory(api, &request.selector).await?;
    info!(
        "匹配到 {} 台虚拟机，期望状态: {}{}",
        inventory.len(),
        request.desired,
        if request.check_mode { " (check)" } else { "" }
    );

    if let (DesiredState::Present, VmSelector::Names(names), Some(template)) =
        (request.desired, &request.selector, request.template.as_deref())
    {
        let provisioner = provision::Provisioner::new(api, settings.waiter(), cancel);
        return provisioner
            .ensure_present(
                inventory,
                names,
                template,
                request.asynchronous,
                request.check_mode,
            )
            .await;
    }

    let options = ReconcileOptions {
        desired: request.desired,
        asynchronous: request.asynchronous,
        check_mode: request.check_mode,
        concurrency: settings.concurrency,
    };
    let reconciler = Reconciler::new(api, settings.guard(), settings.waiter(), options, cancel);
    reconciler.reconcile_all(inventory).await
}

/// 获取并过滤清单，按名称排序
pub async fn fetch_inventory(api: &dyn XenApi, selector: &VmSelector) -> Result<Vec<VmRecord>> {
    let records = api.list_vms().await?;
    let mut selected: Vec<VmRecord> = inventory::filter_inventory(records, selector).collect();
    selected.sort_by(|a, b| {
        a.name_label
            .cmp(&b.name_label)
            .then_with(|| a.object_ref.cmp(&b.object_ref))
    });
    Ok(selected)
}

/// 等待一个轮询间隔
///
/// 超过截止时间返回 `Timeout`，收到取消信号返回 `Cancelled`
pub(crate) async fn pause(
    interval: Duration,
    deadline: Option<Instant>,
    cancel: &CancellationToken,
    what: &str,
) -> Result<()> {
    let mut sleep_for = interval;
    if let Some(deadline) = deadline {
        let now = Instant::now();
        if now >= deadline {
            return Err(Error::Timeout(what.to_string()));
        }
        sleep_for = sleep_for.min(deadline - now);
    }

    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Cancelled(what.to_string())),
        _ = tokio::time::sleep(sleep_for) => Ok(()),
    }
}
