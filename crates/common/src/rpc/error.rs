/// XenAPI RPC 错误定义

use std::fmt;

use super::message::RpcErrorInfo;

/// RPC 错误码
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcErrorCode {
    // 传输层错误
    Transport,
    Timeout,
    InvalidResponse,
    SerializationError,

    // XenAPI 故障码
    SessionAuthenticationFailed,
    SessionInvalid,
    HandleInvalid,
    OtherOperationInProgress,
    OperationNotAllowed,
    VmBadPowerState,
    UuidInvalid,
    MessageMethodUnknown,

    /// 未单独建模的 XenAPI 故障码
    Fault(String),
}

impl RpcErrorCode {
    /// 转换为字符串码
    pub fn as_str(&self) -> &str {
        match self {
            Self::Transport => "TRANSPORT_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::InvalidResponse => "INVALID_RESPONSE",
            Self::SerializationError => "SERIALIZATION_ERROR",

            Self::SessionAuthenticationFailed => "SESSION_AUTHENTICATION_FAILED",
            Self::SessionInvalid => "SESSION_INVALID",
            Self::HandleInvalid => "HANDLE_INVALID",
            Self::OtherOperationInProgress => "OTHER_OPERATION_IN_PROGRESS",
            Self::OperationNotAllowed => "OPERATION_NOT_ALLOWED",
            Self::VmBadPowerState => "VM_BAD_POWER_STATE",
            Self::UuidInvalid => "UUID_INVALID",
            Self::MessageMethodUnknown => "MESSAGE_METHOD_UNKNOWN",

            Self::Fault(code) => code.as_str(),
        }
    }

    /// 从 XenAPI 故障码解析
    pub fn from_fault(code: &str) -> Self {
        match code {
            "SESSION_AUTHENTICATION_FAILED" => Self::SessionAuthenticationFailed,
            "SESSION_INVALID" => Self::SessionInvalid,
            "HANDLE_INVALID" => Self::HandleInvalid,
            "OTHER_OPERATION_IN_PROGRESS" => Self::OtherOperationInProgress,
            "OPERATION_NOT_ALLOWED" => Self::OperationNotAllowed,
            "VM_BAD_POWER_STATE" => Self::VmBadPowerState,
            "UUID_INVALID" => Self::UuidInvalid,
            "MESSAGE_METHOD_UNKNOWN" => Self::MessageMethodUnknown,
            other => Self::Fault(other.to_string()),
        }
    }
}

impl fmt::Display for RpcErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// RPC 错误
#[derive(Debug, Clone)]
pub struct RpcError {
    pub code: RpcErrorCode,
    pub message: String,
    pub params: Vec<String>,
}

impl RpcError {
    /// 创建新的 RPC 错误
    pub fn new(code: RpcErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            params: Vec::new(),
        }
    }

    /// 由 XenAPI 返回的错误信息构造
    pub fn from_fault(info: &RpcErrorInfo) -> Self {
        let params = info.params();
        Self {
            code: RpcErrorCode::from_fault(&info.message),
            message: params.join(", "),
            params,
        }
    }

    /// 传输错误
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::Transport, message)
    }

    /// 超时错误
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::Timeout, message)
    }

    /// 无效响应
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::InvalidResponse, message)
    }

    /// 序列化错误
    pub fn serialization_error(err: impl fmt::Display) -> Self {
        Self::new(
            RpcErrorCode::SerializationError,
            format!("序列化错误: {}", err),
        )
    }

    /// 是否属于会话/连接层面的故障
    pub fn is_session_fault(&self) -> bool {
        matches!(
            self.code,
            RpcErrorCode::Transport
                | RpcErrorCode::Timeout
                | RpcErrorCode::SessionAuthenticationFailed
                | RpcErrorCode::SessionInvalid
        )
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "[{}]", self.code)
        } else {
            write!(f, "[{}] {}", self.code, self.message)
        }
    }
}

impl std::error::Error for RpcError {}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization_error(err)
    }
}

impl From<reqwest::Error> for RpcError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::timeout(err.to_string())
        } else if err.is_decode() {
            Self::invalid_response(err.to_string())
        } else {
            Self::transport(err.to_string())
        }
    }
}

impl From<RpcError> for crate::Error {
    fn from(err: RpcError) -> Self {
        match err.code {
            RpcErrorCode::SessionAuthenticationFailed | RpcErrorCode::SessionInvalid => {
                crate::Error::Authentication(err.to_string())
            }
            RpcErrorCode::Transport | RpcErrorCode::Timeout => {
                crate::Error::Connection(err.to_string())
            }
            RpcErrorCode::InvalidResponse | RpcErrorCode::SerializationError => {
                crate::Error::Internal(err.to_string())
            }
            _ => crate::Error::Hypervisor(err.to_string()),
        }
    }
}
