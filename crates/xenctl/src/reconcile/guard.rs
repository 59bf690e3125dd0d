/// 等待进行中的操作完成
///
/// 同一虚拟机同一时刻最多只有一个变更操作

use common::{Result, VmRecord};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::pause;
use crate::hypervisor::XenApi;

#[derive(Debug, Clone)]
pub struct PendingOperationGuard {
    poll_interval: Duration,
    timeout: Option<Duration>,
}

impl PendingOperationGuard {
    pub fn new(poll_interval: Duration, timeout: Option<Duration>) -> Self {
        Self {
            poll_interval,
            timeout,
        }
    }

    /// 返回操作队列为空的记录
    ///
    /// 队列非空时按固定间隔重新获取记录，直到队列清空、超时或被取消
    pub async fn wait_idle(
        &self,
        api: &dyn XenApi,
        mut record: VmRecord,
        cancel: &CancellationToken,
    ) -> Result<VmRecord> {
        if record.is_idle() {
            return Ok(record);
        }

        let deadline = self.timeout.map(|timeout| Instant::now() + timeout);
        let what = format!("等待虚拟机 {} 的操作队列清空", record.name_label);
        let mut polls = 0u32;

        while !record.is_idle() {
            debug!(
                "虚拟机 {} 有 {} 个进行中的操作: {:?}",
                record.name_label,
                record.current_operations.len(),
                record.current_operations.values().collect::<Vec<_>>()
            );
            pause(self.poll_interval, deadline, cancel, &what).await?;
            record = api.get_vm(&record.object_ref).await?;
            polls += 1;
        }

        info!("虚拟机 {} 操作队列已清空 (轮询 {} 次)", record.name_label, polls);
        Ok(record)
    }
}
