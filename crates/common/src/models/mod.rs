/// 共享数据模型
///
/// 定义虚拟机记录、电源状态、期望状态、操作动词和任务状态

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// 虚拟机电源状态
///
/// 取值与 XenAPI 的 `power_state` 字段一致；未知取值统一落入 `Unknown`。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PowerState {
    Halted,
    Running,
    Suspended,
    Paused,
    #[serde(other)]
    Unknown,
}

impl PowerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Halted => "halted",
            Self::Running => "running",
            Self::Suspended => "suspended",
            Self::Paused => "paused",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 期望状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DesiredState {
    Present,
    Absent,
    Running,
    Halted,
    Restarted,
}

impl DesiredState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::Running => "running",
            Self::Halted => "halted",
            Self::Restarted => "restarted",
        }
    }
}

impl fmt::Display for DesiredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DesiredState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "present" => Ok(Self::Present),
            "absent" => Ok(Self::Absent),
            "running" => Ok(Self::Running),
            "halted" => Ok(Self::Halted),
            "restarted" => Ok(Self::Restarted),
            other => Err(Error::InvalidArgument(format!("未知的期望状态: {}", other))),
        }
    }
}

/// 虚拟机操作
///
/// `as_str` 与 XenAPI `allowed_operations` 中的名称一致
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VmOperation {
    Start,
    Resume,
    CleanShutdown,
    HardShutdown,
    CleanReboot,
    Destroy,
    Clone,
    Provision,
}

impl VmOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Resume => "resume",
            Self::CleanShutdown => "clean_shutdown",
            Self::HardShutdown => "hard_shutdown",
            Self::CleanReboot => "clean_reboot",
            Self::Destroy => "destroy",
            Self::Clone => "clone",
            Self::Provision => "provision",
        }
    }

    /// 对应的异步 RPC 方法名
    pub fn async_method(&self) -> &'static str {
        match self {
            Self::Start => "Async.VM.start",
            Self::Resume => "Async.VM.resume",
            Self::CleanShutdown => "Async.VM.clean_shutdown",
            Self::HardShutdown => "Async.VM.hard_shutdown",
            Self::CleanReboot => "Async.VM.clean_reboot",
            Self::Destroy => "Async.VM.destroy",
            Self::Clone => "Async.VM.clone",
            Self::Provision => "Async.VM.provision",
        }
    }
}

impl fmt::Display for VmOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 任务状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Success,
    Failure,
    Cancelling,
    Cancelled,
}

impl TaskStatus {
    /// 是否已到达终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure | Self::Cancelled)
    }
}

/// 虚拟机记录快照
///
/// `power_state` 与 `allowed_operations` 只在获取的瞬间可信
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VmRecord {
    pub object_ref: String,
    pub uuid: String,
    pub name_label: String,
    pub name_description: String,
    pub tags: Vec<String>,
    pub power_state: PowerState,
    /// 进行中的操作（task 引用 -> 操作名）
    pub current_operations: HashMap<String, String>,
    pub allowed_operations: Vec<String>,
}

impl VmRecord {
    /// 操作队列是否为空
    pub fn is_idle(&self) -> bool {
        self.current_operations.is_empty()
    }

    /// hypervisor 当前是否允许该操作
    pub fn allows(&self, operation: VmOperation) -> bool {
        self.allowed_operations.iter().any(|op| op == operation.as_str())
    }
}

/// 虚拟机选择条件（名称与标签互斥）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VmSelector {
    /// 名称在列表中即匹配
    Names(Vec<String>),
    /// 必须包含所有标签
    Tags(Vec<String>),
}

/// 常量定义
pub mod constants {
    /// 默认轮询间隔（毫秒）
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

    /// 默认等待操作队列清空的超时（秒）
    pub const DEFAULT_GUARD_TIMEOUT: u64 = 300;

    /// 默认等待任务完成的超时（秒）
    pub const DEFAULT_TASK_TIMEOUT: u64 = 900;

    /// 默认单次 RPC 请求超时（秒）
    pub const DEFAULT_REQUEST_TIMEOUT: u64 = 30;

    /// 默认并发处理的虚拟机数量
    pub const DEFAULT_CONCURRENCY: usize = 4;

    /// 登录时上报的 API 版本与客户端名称
    pub const API_VERSION: &str = "1.0";
    pub const ORIGINATOR: &str = "xenctl";
}
