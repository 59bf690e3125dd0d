/// 异步任务提交与等待
///
/// 所有操作都通过 `Async.VM.*` 提交；是否等待任务完成由调用方决定

use common::rpc::VmCall;
use common::{Error, Result, TaskStatus, VmRecord};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::pause;
use crate::hypervisor::XenApi;

/// 提交结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// 任务已成功结束且句柄已释放
    Completed { result: Option<String> },
    /// 未等待任务结束，句柄交由 hypervisor 回收
    Detached { task: String },
}

#[derive(Debug, Clone)]
pub struct AsyncTaskWaiter {
    poll_interval: Duration,
    timeout: Option<Duration>,
}

impl AsyncTaskWaiter {
    pub fn new(poll_interval: Duration, timeout: Option<Duration>) -> Self {
        Self {
            poll_interval,
            timeout,
        }
    }

    /// 校验操作是否被允许，然后提交
    pub async fn execute(
        &self,
        api: &dyn XenApi,
        record: &VmRecord,
        call: &VmCall,
        asynchronous: bool,
        cancel: &CancellationToken,
    ) -> Result<TaskOutcome> {
        let operation = call.operation();
        if !record.allows(operation) {
            // 常见原因：虚拟机仍在启动中时请求 clean_shutdown
            warn!(
                "虚拟机 {} 当前不允许 {} (允许: {:?})",
                record.name_label, operation, record.allowed_operations
            );
            return Err(Error::OperationRefused {
                vm: record.name_label.clone(),
                operation: operation.to_string(),
            });
        }

        self.submit(api, &record.object_ref, call, asynchronous, cancel)
            .await
    }

    /// 直接提交，不做 allowed_operations 校验
    pub async fn submit(
        &self,
        api: &dyn XenApi,
        object_ref: &str,
        call: &VmCall,
        asynchronous: bool,
        cancel: &CancellationToken,
    ) -> Result<TaskOutcome> {
        let operation = call.operation();
        let task = api.submit(object_ref, call).await?;
        info!("📤 已提交 {} ({}), 任务: {}", operation, object_ref, task);

        if asynchronous {
            debug!("异步模式，不等待任务 {}", task);
            return Ok(TaskOutcome::Detached { task });
        }

        let result = self.wait(api, &task, cancel).await?;
        info!("✅ {} ({}) 已完成", operation, object_ref);
        Ok(TaskOutcome::Completed { result })
    }

    /// 等待任务到达终态并释放句柄
    ///
    /// 超时或取消时不取消 hypervisor 上的任务，也不释放句柄
    pub async fn wait(
        &self,
        api: &dyn XenApi,
        task: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<String>> {
        let deadline = self.timeout.map(|timeout| Instant::now() + timeout);
        let what = format!("等待任务 {} 完成", task);

        let status = loop {
            let status = api.task_status(task).await?;
            if status.is_terminal() {
                break status;
            }
            if let Err(e) = pause(self.poll_interval, deadline, cancel, &what).await {
                warn!("停止等待任务 {}，任务仍由 hypervisor 继续执行", task);
                return Err(e);
            }
        };

        match status {
            // 先释放句柄，再返回结果查询的错误
            TaskStatus::Success => {
                let result = api.task_result(task).await;
                api.destroy_task(task).await?;
                result
            }
            TaskStatus::Failure => {
                let info = api.task_error(task).await;
                api.destroy_task(task).await?;
                Err(Error::TaskFailed {
                    task: task.to_string(),
                    reason: info?.join(", "),
                })
            }
            _ => {
                api.destroy_task(task).await?;
                Err(Error::TaskFailed {
                    task: task.to_string(),
                    reason: "任务已被取消".to_string(),
                })
            }
        }
    }
}
