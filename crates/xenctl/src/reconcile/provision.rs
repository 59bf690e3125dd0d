/// 按模板创建虚拟机
///
/// 已存在同名虚拟机时不做任何修改；新建的虚拟机保持停止状态

use common::rpc::VmCall;
use common::{DesiredState, Error, Result, VmOperation, VmRecord};
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::planner;
use super::reconciler::{ReconcileReport, VmOutcome};
use super::waiter::{AsyncTaskWaiter, TaskOutcome};
use crate::hypervisor::XenApi;

pub struct Provisioner<'a> {
    api: &'a dyn XenApi,
    waiter: AsyncTaskWaiter,
    cancel: CancellationToken,
}

impl<'a> Provisioner<'a> {
    pub fn new(api: &'a dyn XenApi, waiter: AsyncTaskWaiter, cancel: CancellationToken) -> Self {
        Self { api, waiter, cancel }
    }

    /// 确保每个名称都有对应的虚拟机
    pub async fn ensure_present(
        &self,
        existing: Vec<VmRecord>,
        names: &[String],
        template: &str,
        asynchronous: bool,
        check_mode: bool,
    ) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        let present: HashSet<&str> = existing.iter().map(|r| r.name_label.as_str()).collect();
        let mut seen = HashSet::new();
        let missing: Vec<&String> = names
            .iter()
            .filter(|name| !present.contains(name.as_str()) && seen.insert(name.as_str()))
            .collect();

        for record in existing {
            match planner::plan(DesiredState::Present, record.power_state) {
                Ok(_) => report.push_outcome(VmOutcome::unchanged(record)),
                Err(e) => {
                    let err = Error::UnexpectedPowerState {
                        vm: record.name_label.clone(),
                        state: e.0.to_string(),
                    };
                    warn!("{}", err);
                    report.push_failure(record.name_label.clone(), &err, Some(record));
                }
            }
        }

        if missing.is_empty() {
            info!("所有虚拟机均已存在");
            return Ok(report);
        }

        let template_ref = self.resolve_template(template).await?;
        info!("使用模板 {} ({}) 创建 {} 台虚拟机", template, template_ref, missing.len());

        for name in missing {
            if check_mode {
                info!("[check] 将从模板 {} 创建虚拟机 {}", template, name);
                report.push_outcome(VmOutcome {
                    name: name.clone(),
                    instance: None,
                    changed: true,
                    operations: vec![VmOperation::Clone, VmOperation::Provision],
                    pending_tasks: Vec::new(),
                });
                continue;
            }

            let created = match self.clone_vm(&template_ref, name).await {
                Ok(vm_ref) => match self.provision(&vm_ref, name, asynchronous).await {
                    Ok(outcome) => Ok(outcome),
                    Err(e) => Err((e, Some(vm_ref))),
                },
                Err(e) => Err((e, None)),
            };

            match created {
                Ok(outcome) => report.push_outcome(outcome),
                Err((e, _)) if e.is_session_error() => {
                    error!("❌ 会话错误，中止处理: {}", e);
                    return Err(e);
                }
                Err((e, vm_ref)) => {
                    warn!("创建虚拟机 {} 失败: {}", name, e);
                    // 克隆已完成时附上新虚拟机，便于人工清理
                    let instance = match vm_ref {
                        Some(vm_ref) => self.api.get_vm(&vm_ref).await.ok(),
                        None => None,
                    };
                    report.push_failure(name.clone(), &e, instance);
                }
            }
        }

        Ok(report)
    }

    /// 按名称查找唯一的模板
    async fn resolve_template(&self, template: &str) -> Result<String> {
        let mut templates = Vec::new();
        for object_ref in self.api.find_vms_by_name(template).await? {
            if self.api.get_raw_vm(&object_ref).await?.is_a_template {
                templates.push(object_ref);
            }
        }

        match templates.len() {
            0 => Err(Error::NotFound(format!("模板不存在: {}", template))),
            1 => Ok(templates.remove(0)),
            n => Err(Error::InvalidArgument(format!(
                "模板名称 {} 匹配到 {} 个模板",
                template, n
            ))),
        }
    }

    /// 从模板克隆，返回新虚拟机的引用
    ///
    /// 克隆必须等待完成以获得新虚拟机的引用
    async fn clone_vm(&self, template_ref: &str, name: &str) -> Result<String> {
        let clone = VmCall::Clone {
            new_name: name.to_string(),
        };
        match self
            .waiter
            .submit(self.api, template_ref, &clone, false, &self.cancel)
            .await?
        {
            TaskOutcome::Completed { result: Some(vm_ref) } => Ok(vm_ref),
            _ => Err(Error::Internal(format!(
                "克隆虚拟机 {} 后未返回对象引用",
                name
            ))),
        }
    }

    /// 初始化新克隆的虚拟机，异步只作用于这一步
    async fn provision(&self, vm_ref: &str, name: &str, asynchronous: bool) -> Result<VmOutcome> {
        let mut pending_tasks = Vec::new();
        if let TaskOutcome::Detached { task } = self
            .waiter
            .submit(self.api, vm_ref, &VmCall::Provision, asynchronous, &self.cancel)
            .await?
        {
            pending_tasks.push(task);
        }

        let record = self.api.get_vm(vm_ref).await?;
        info!("✅ 虚拟机 {} 已创建 ({})", name, vm_ref);

        Ok(VmOutcome {
            name: name.to_string(),
            instance: Some(record),
            changed: true,
            operations: vec![VmOperation::Clone, VmOperation::Provision],
            pending_tasks,
        })
    }
}
