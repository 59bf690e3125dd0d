/// XenAPI JSON-RPC 消息定义

use serde::{Deserialize, Serialize};

use crate::utils::generate_id;

/// JSON-RPC 协议版本
pub const JSONRPC_VERSION: &str = "2.0";

/// RPC 请求消息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,

    /// 消息唯一ID
    pub id: String,

    /// XenAPI 方法名，例如 `VM.get_record`
    pub method: String,

    /// 位置参数（首个参数通常是会话引用）
    pub params: Vec<serde_json::Value>,
}

/// RPC 响应消息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub jsonrpc: Option<String>,

    #[serde(default)]
    pub id: Option<serde_json::Value>,

    /// 调用结果（成功时有值）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    /// 错误信息（失败时有值）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorInfo>,
}

/// RPC 错误信息
///
/// XenAPI 把故障码放在 `message`，把故障参数放在 `data`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorInfo {
    #[serde(default)]
    pub code: i64,

    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcRequest {
    /// 创建请求消息
    pub fn new(method: impl Into<String>, params: Vec<serde_json::Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: format!("req-{}", generate_id()),
            method: method.into(),
            params,
        }
    }
}

impl RpcResponse {
    /// 判断是否是错误响应
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// 从 JSON 字符串反序列化
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl RpcErrorInfo {
    /// 故障参数（非字符串参数按 JSON 文本展开）
    pub fn params(&self) -> Vec<String> {
        match &self.data {
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .map(|v| match v {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
            Some(serde_json::Value::String(s)) => vec![s.clone()],
            Some(other) => vec![other.to_string()],
            None => Vec::new(),
        }
    }
}
