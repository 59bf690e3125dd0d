/// 虚拟化接口
///
/// 与 XenServer/XCP-ng 的 XenAPI 交互

pub mod session;

#[cfg(test)]
pub mod fake;

use async_trait::async_trait;
use common::rpc::{RawVmRecord, VmCall};
use common::{Result, TaskStatus, VmRecord};
use serde_json::Value;
use std::collections::HashMap;

pub use session::XenSession;

/// XenAPI 能力抽象
///
/// 只包含电源状态管理与任务轮询所需的调用
#[async_trait]
pub trait XenApi: Send + Sync {
    /// 获取所有虚拟机的完整记录（包括模板），键为对象引用
    async fn list_vms(&self) -> Result<HashMap<String, RawVmRecord>>;

    /// 获取所有虚拟机的原始 JSON 记录，不做任何字段转换
    async fn list_vm_facts(&self) -> Result<HashMap<String, Value>>;

    /// 按对象引用获取单个虚拟机的完整记录
    async fn get_raw_vm(&self, vm_ref: &str) -> Result<RawVmRecord>;

    /// 重新获取虚拟机记录
    async fn get_vm(&self, vm_ref: &str) -> Result<VmRecord> {
        Ok(self.get_raw_vm(vm_ref).await?.into_record(vm_ref))
    }

    /// 按名称查找对象引用
    async fn find_vms_by_name(&self, name: &str) -> Result<Vec<String>>;

    /// 提交异步调用，返回任务引用
    async fn submit(&self, vm_ref: &str, call: &VmCall) -> Result<String>;

    /// 查询任务状态
    async fn task_status(&self, task: &str) -> Result<TaskStatus>;

    /// 获取任务结果（例如克隆出的虚拟机引用）
    async fn task_result(&self, task: &str) -> Result<Option<String>>;

    /// 获取任务失败原因
    async fn task_error(&self, task: &str) -> Result<Vec<String>>;

    /// 释放任务句柄
    async fn destroy_task(&self, task: &str) -> Result<()>;
}
