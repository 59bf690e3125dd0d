/// 虚拟机协调器
///
/// 对每台虚拟机依次执行：等待队列清空 -> 规划 -> 校验 -> 提交 -> 等待

use common::rpc::VmCall;
use common::{DesiredState, Error, Result, VmOperation, VmRecord};
use futures::StreamExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::guard::PendingOperationGuard;
use super::planner;
use super::waiter::{AsyncTaskWaiter, TaskOutcome};
use crate::hypervisor::XenApi;

/// 单台虚拟机最多执行的步骤数（absent 需要先关机再删除）
const MAX_STEPS: usize = 3;

#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    pub desired: DesiredState,
    pub asynchronous: bool,
    pub check_mode: bool,
    pub concurrency: usize,
}

/// 单台虚拟机的协调结果
#[derive(Debug, Clone, Serialize)]
pub struct VmOutcome {
    pub name: String,
    /// 最后一次观察到的记录（check 模式下新建的虚拟机为空）
    pub instance: Option<VmRecord>,
    pub changed: bool,
    /// 已提交（check 模式下为将要提交）的操作
    pub operations: Vec<VmOperation>,
    /// 异步模式下未等待的任务句柄
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pending_tasks: Vec<String>,
}

impl VmOutcome {
    pub fn unchanged(record: VmRecord) -> Self {
        Self {
            name: record.name_label.clone(),
            instance: Some(record),
            changed: false,
            operations: Vec::new(),
            pending_tasks: Vec::new(),
        }
    }
}

/// 单台虚拟机的失败信息
#[derive(Debug, Clone, Serialize)]
pub struct VmFailure {
    pub name: String,
    pub msg: String,
    pub instance: Option<VmRecord>,
}

/// 整批协调结果
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub changed: bool,
    pub instances: Vec<VmOutcome>,
    pub failures: Vec<VmFailure>,
}

impl ReconcileReport {
    pub fn push_outcome(&mut self, outcome: VmOutcome) {
        self.changed |= outcome.changed;
        self.instances.push(outcome);
    }

    pub fn push_failure(&mut self, name: impl Into<String>, err: &Error, instance: Option<VmRecord>) {
        self.failures.push(VmFailure {
            name: name.into(),
            msg: err.to_string(),
            instance,
        });
    }

    pub fn failed(&self) -> bool {
        !self.failures.is_empty()
    }
}

pub struct Reconciler<'a> {
    api: &'a dyn XenApi,
    guard: PendingOperationGuard,
    waiter: AsyncTaskWaiter,
    options: ReconcileOptions,
    cancel: CancellationToken,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        api: &'a dyn XenApi,
        guard: PendingOperationGuard,
        waiter: AsyncTaskWaiter,
        options: ReconcileOptions,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            api,
            guard,
            waiter,
            options,
            cancel,
        }
    }

    /// 协调一批虚拟机
    ///
    /// 单台失败不影响其他虚拟机；会话级错误立即中止整批处理
    pub async fn reconcile_all(&self, records: Vec<VmRecord>) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        let results = futures::stream::iter(records.into_iter().map(|record| async move {
            let snapshot = record.clone();
            (snapshot, self.reconcile_vm(record).await)
        }))
        .buffered(self.options.concurrency.max(1));
        let mut results = std::pin::pin!(results);

        while let Some((record, result)) = results.next().await {
            match result {
                Ok(outcome) => report.push_outcome(outcome),
                Err(e) if e.is_session_error() => {
                    error!("❌ 会话错误，中止处理: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    warn!("虚拟机 {} 协调失败: {}", record.name_label, e);
                    report.push_failure(record.name_label.clone(), &e, Some(record));
                }
            }
        }

        info!(
            "协调完成: {} 台成功, {} 台失败, changed={}",
            report.instances.len(),
            report.failures.len(),
            report.changed
        );
        Ok(report)
    }

    /// 协调单台虚拟机，返回是否发生（或将发生）变更
    pub async fn reconcile_vm(&self, record: VmRecord) -> Result<VmOutcome> {
        let desired = self.options.desired;
        let mut record = record;
        let mut operations = Vec::new();
        let mut pending_tasks = Vec::new();

        for _ in 0..MAX_STEPS {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled(format!("协调虚拟机 {}", record.name_label)));
            }

            record = self.guard.wait_idle(self.api, record, &self.cancel).await?;

            let operation = planner::plan(desired, record.power_state).map_err(|e| {
                Error::UnexpectedPowerState {
                    vm: record.name_label.clone(),
                    state: e.0.to_string(),
                }
            })?;

            let Some(operation) = operation else {
                return Ok(self.finish(record, operations, pending_tasks));
            };
            operations.push(operation);

            if self.options.check_mode {
                info!(
                    "[check] 虚拟机 {} ({}) 需要执行 {}",
                    record.name_label, record.power_state, operation
                );
                return Ok(self.finish(record, operations, pending_tasks));
            }

            let call = VmCall::for_operation(operation)
                .ok_or_else(|| Error::Internal(format!("无法直接提交操作 {}", operation)))?;
            let intermediate = planner::is_intermediate(desired, operation);
            // 中间步骤必须等待完成，异步只作用于最后一步
            let asynchronous = self.options.asynchronous && !intermediate;

            info!(
                "虚拟机 {} ({}) -> {}: 执行 {}",
                record.name_label, record.power_state, desired, operation
            );
            let outcome = self
                .waiter
                .execute(self.api, &record, &call, asynchronous, &self.cancel)
                .await?;

            if let TaskOutcome::Detached { task } = outcome {
                pending_tasks.push(task);
            }

            if !intermediate {
                return Ok(self.finish(record, operations, pending_tasks));
            }

            record = self.api.get_vm(&record.object_ref).await?;
        }

        Err(Error::Internal(format!(
            "虚拟机 {} 在 {} 步内未达到期望状态 {}",
            record.name_label, MAX_STEPS, desired
        )))
    }

    fn finish(
        &self,
        record: VmRecord,
        operations: Vec<VmOperation>,
        pending_tasks: Vec<String>,
    ) -> VmOutcome {
        VmOutcome {
            name: record.name_label.clone(),
            changed: !operations.is_empty(),
            instance: Some(record),
            operations,
            pending_tasks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypervisor::fake::{vm, FakeXen, TaskBehaviour};
    use common::PowerState;
    use std::time::Duration;

    const ALL_DESIRED: [DesiredState; 4] = [
        DesiredState::Running,
        DesiredState::Halted,
        DesiredState::Restarted,
        DesiredState::Absent,
    ];
    const ALL_STATES: [PowerState; 3] =
        [PowerState::Halted, PowerState::Running, PowerState::Suspended];

    fn options(desired: DesiredState) -> ReconcileOptions {
        ReconcileOptions {
            desired,
            asynchronous: false,
            check_mode: false,
            concurrency: 2,
        }
    }

    fn reconciler(api: &dyn XenApi, options: ReconcileOptions) -> Reconciler<'_> {
        Reconciler::new(
            api,
            PendingOperationGuard::new(Duration::from_millis(1), Some(Duration::from_secs(5))),
            AsyncTaskWaiter::new(Duration::from_millis(1), Some(Duration::from_secs(5))),
            options,
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn test_already_in_desired_state_is_noop() {
        for (desired, state) in [
            (DesiredState::Running, PowerState::Running),
            (DesiredState::Halted, PowerState::Halted),
        ] {
            let fake = FakeXen::new().with_vm(vm("OpaqueRef:1", "vm1", state));
            let outcome = reconciler(&fake, options(desired))
                .reconcile_vm(fake.record("OpaqueRef:1"))
                .await
                .unwrap();

            assert!(!outcome.changed);
            assert!(outcome.operations.is_empty());
            assert!(fake.calls().is_empty());
        }
    }

    #[tokio::test]
    async fn test_executes_planned_operation() {
        let fake = FakeXen::new().with_vm(vm("OpaqueRef:1", "vm1", PowerState::Running));
        let outcome = reconciler(&fake, options(DesiredState::Halted))
            .reconcile_vm(fake.record("OpaqueRef:1"))
            .await
            .unwrap();

        assert!(outcome.changed);
        assert_eq!(outcome.operations, vec![VmOperation::CleanShutdown]);
        assert_eq!(fake.submitted(), vec!["Async.VM.clean_shutdown OpaqueRef:1"]);
        assert_eq!(fake.power_state("OpaqueRef:1"), Some(PowerState::Halted));
    }

    #[tokio::test]
    async fn test_check_mode_never_mutates() {
        for desired in ALL_DESIRED {
            for state in ALL_STATES {
                let live = FakeXen::new().with_vm(vm("OpaqueRef:1", "vm1", state));
                let expected = reconciler(&live, options(desired))
                    .reconcile_vm(live.record("OpaqueRef:1"))
                    .await
                    .unwrap();

                let fake = FakeXen::new().with_vm(vm("OpaqueRef:1", "vm1", state));
                let mut opts = options(desired);
                opts.check_mode = true;
                let outcome = reconciler(&fake, opts)
                    .reconcile_vm(fake.record("OpaqueRef:1"))
                    .await
                    .unwrap();

                assert_eq!(outcome.changed, expected.changed, "{:?} from {:?}", desired, state);
                assert!(fake.submitted().is_empty(), "{:?} from {:?}", desired, state);
                assert_eq!(fake.power_state("OpaqueRef:1"), Some(state));
            }
        }
    }

    #[tokio::test]
    async fn test_guard_runs_before_submission() {
        let fake = FakeXen::new().with_vm(vm("OpaqueRef:1", "vm1", PowerState::Halted).busy());
        fake.busy_for("OpaqueRef:1", 3);

        let outcome = reconciler(&fake, options(DesiredState::Running))
            .reconcile_vm(fake.record("OpaqueRef:1"))
            .await
            .unwrap();

        assert!(outcome.changed);
        let calls = fake.calls();
        let submit = calls.iter().position(|c| c.starts_with("Async.VM.start")).unwrap();
        let last_refetch = calls.iter().rposition(|c| c.starts_with("VM.get_record")).unwrap();
        assert_eq!(fake.count("VM.get_record"), 4);
        assert!(last_refetch < submit);
    }

    #[tokio::test]
    async fn test_refused_operation() {
        let fake = FakeXen::new()
            .with_vm(vm("OpaqueRef:1", "vm1", PowerState::Running).allowing(&["hard_shutdown"]));

        let result = reconciler(&fake, options(DesiredState::Halted))
            .reconcile_vm(fake.record("OpaqueRef:1"))
            .await;

        assert!(matches!(result, Err(Error::OperationRefused { .. })));
        assert!(fake.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_restart_from_halted_starts() {
        let fake = FakeXen::new().with_vm(vm("OpaqueRef:1", "vm1", PowerState::Halted));
        let outcome = reconciler(&fake, options(DesiredState::Restarted))
            .reconcile_vm(fake.record("OpaqueRef:1"))
            .await
            .unwrap();

        assert!(outcome.changed);
        assert_eq!(fake.submitted(), vec!["Async.VM.start OpaqueRef:1"]);
    }

    #[tokio::test]
    async fn test_async_does_not_poll() {
        let fake = FakeXen::new().with_vm(vm("OpaqueRef:1", "vm1", PowerState::Halted));
        fake.set_task_behaviour(TaskBehaviour::Hang);
        let mut opts = options(DesiredState::Running);
        opts.asynchronous = true;

        let outcome = reconciler(&fake, opts)
            .reconcile_vm(fake.record("OpaqueRef:1"))
            .await
            .unwrap();

        assert!(outcome.changed);
        assert_eq!(outcome.pending_tasks.len(), 1);
        assert_eq!(fake.count("task.get_status"), 0);
    }

    #[tokio::test]
    async fn test_absent_shuts_down_then_destroys() {
        let fake = FakeXen::new().with_vm(vm("OpaqueRef:1", "vm1", PowerState::Running));
        let mut opts = options(DesiredState::Absent);
        opts.asynchronous = true;

        let outcome = reconciler(&fake, opts)
            .reconcile_vm(fake.record("OpaqueRef:1"))
            .await
            .unwrap();

        assert_eq!(
            outcome.operations,
            vec![VmOperation::HardShutdown, VmOperation::Destroy]
        );
        assert_eq!(
            fake.submitted(),
            vec!["Async.VM.hard_shutdown OpaqueRef:1", "Async.VM.destroy OpaqueRef:1"]
        );
        // 关机步骤已等待完成，只有删除任务未等待
        assert_eq!(outcome.pending_tasks.len(), 1);
    }

    #[tokio::test]
    async fn test_unexpected_power_state() {
        let fake = FakeXen::new().with_vm(vm("OpaqueRef:1", "vm1", PowerState::Paused));
        let result = reconciler(&fake, options(DesiredState::Running))
            .reconcile_vm(fake.record("OpaqueRef:1"))
            .await;

        assert!(matches!(result, Err(Error::UnexpectedPowerState { .. })));
        assert!(fake.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_batch_collects_failures_and_continues() {
        let fake = FakeXen::new()
            .with_vm(vm("OpaqueRef:1", "vm1", PowerState::Paused))
            .with_vm(vm("OpaqueRef:2", "vm2", PowerState::Halted))
            .with_vm(vm("OpaqueRef:3", "vm3", PowerState::Running));
        let records = vec![
            fake.record("OpaqueRef:1"),
            fake.record("OpaqueRef:2"),
            fake.record("OpaqueRef:3"),
        ];

        let report = reconciler(&fake, options(DesiredState::Running))
            .reconcile_all(records)
            .await
            .unwrap();

        assert!(report.changed);
        assert!(report.failed());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].name, "vm1");
        let names: Vec<&str> = report.instances.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["vm2", "vm3"]);
        assert_eq!(fake.submitted(), vec!["Async.VM.start OpaqueRef:2"]);
    }

    #[tokio::test]
    async fn test_session_error_aborts_batch() {
        let fake = FakeXen::new()
            .with_vm(vm("OpaqueRef:1", "vm1", PowerState::Halted).busy())
            .with_vm(vm("OpaqueRef:2", "vm2", PowerState::Halted));
        fake.fail_session_on("OpaqueRef:1");
        let records = vec![fake.record("OpaqueRef:1"), fake.record("OpaqueRef:2")];
        let mut opts = options(DesiredState::Running);
        opts.concurrency = 1;

        let result = reconciler(&fake, opts).reconcile_all(records).await;

        assert!(matches!(result, Err(ref e) if e.is_session_error()));
        assert!(fake.submitted().is_empty());
    }
}
