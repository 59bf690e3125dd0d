/// XenAPI 数据类型定义
///
/// 对应 `VM.get_record` 返回的原始记录以及各异步调用的参数

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::models::{PowerState, VmOperation, VmRecord};

// ============================================================================
// 虚拟机记录
// ============================================================================

/// `VM.get_record` / `VM.get_all_records` 返回的原始记录
///
/// 只显式声明用到的字段，其余字段保存在 `extra` 中以便输出完整信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawVmRecord {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub name_label: String,
    #[serde(default)]
    pub name_description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub power_state: PowerState,
    #[serde(default)]
    pub current_operations: HashMap<String, String>,
    #[serde(default)]
    pub allowed_operations: Vec<String>,
    #[serde(default)]
    pub is_a_template: bool,
    #[serde(default)]
    pub is_control_domain: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl RawVmRecord {
    /// 裁剪为固定输出字段的记录
    pub fn into_record(self, object_ref: impl Into<String>) -> VmRecord {
        VmRecord {
            object_ref: object_ref.into(),
            uuid: self.uuid,
            name_label: self.name_label,
            name_description: self.name_description,
            tags: self.tags,
            power_state: self.power_state,
            current_operations: self.current_operations,
            allowed_operations: self.allowed_operations,
        }
    }
}

// ============================================================================
// 异步调用
// ============================================================================

/// 启动/恢复时是否暂停（固定为 false）
pub const START_PAUSED: bool = false;

/// 启动/恢复时是否强制（固定为 false）
pub const START_FORCE: bool = false;

/// 针对单个虚拟机的异步调用
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VmCall {
    Start,
    Resume,
    CleanShutdown,
    HardShutdown,
    CleanReboot,
    Destroy,
    /// 以当前对象（模板）克隆出新虚拟机
    Clone { new_name: String },
    Provision,
}

impl VmCall {
    /// 由操作动词构造（克隆需要额外参数，不在此列）
    pub fn for_operation(operation: VmOperation) -> Option<Self> {
        match operation {
            VmOperation::Start => Some(Self::Start),
            VmOperation::Resume => Some(Self::Resume),
            VmOperation::CleanShutdown => Some(Self::CleanShutdown),
            VmOperation::HardShutdown => Some(Self::HardShutdown),
            VmOperation::CleanReboot => Some(Self::CleanReboot),
            VmOperation::Destroy => Some(Self::Destroy),
            VmOperation::Provision => Some(Self::Provision),
            VmOperation::Clone => None,
        }
    }

    pub fn operation(&self) -> VmOperation {
        match self {
            Self::Start => VmOperation::Start,
            Self::Resume => VmOperation::Resume,
            Self::CleanShutdown => VmOperation::CleanShutdown,
            Self::HardShutdown => VmOperation::HardShutdown,
            Self::CleanReboot => VmOperation::CleanReboot,
            Self::Destroy => VmOperation::Destroy,
            Self::Clone { .. } => VmOperation::Clone,
            Self::Provision => VmOperation::Provision,
        }
    }

    /// 会话与对象引用之后的位置参数
    pub fn extra_params(&self) -> Vec<Value> {
        match self {
            Self::Start | Self::Resume => vec![json!(START_PAUSED), json!(START_FORCE)],
            Self::Clone { new_name } => vec![json!(new_name)],
            _ => Vec::new(),
        }
    }
}
