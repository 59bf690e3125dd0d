use thiserror::Error;

/// 统一错误类型
#[derive(Error, Debug)]
pub enum Error {
    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("认证错误: {0}")]
    Authentication(String),

    #[error("连接错误: {0}")]
    Connection(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("无效参数: {0}")]
    InvalidArgument(String),

    #[error("虚拟化错误: {0}")]
    Hypervisor(String),

    #[error("虚拟机 {vm} 处于意外的电源状态: {state}")]
    UnexpectedPowerState { vm: String, state: String },

    #[error("虚拟机 {vm} 当前拒绝执行 {operation}")]
    OperationRefused { vm: String, operation: String },

    #[error("任务 {task} 执行失败: {reason}")]
    TaskFailed { task: String, reason: String },

    #[error("操作超时: {0}")]
    Timeout(String),

    #[error("操作已取消: {0}")]
    Cancelled(String),

    #[error("内部错误: {0}")]
    Internal(String),

    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// 是否为会话级错误
    ///
    /// 会话级错误意味着与 hypervisor 的连接已不可用，整个调用必须中止；
    /// 其他错误只影响当前虚拟机。
    pub fn is_session_error(&self) -> bool {
        matches!(self, Self::Authentication(_) | Self::Connection(_))
    }
}

/// 统一结果类型
pub type Result<T> = std::result::Result<T, Error>;
