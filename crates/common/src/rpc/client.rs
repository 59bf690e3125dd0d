/// XenAPI JSON-RPC 客户端
///
/// 通过 HTTP(S) 向 `{host}/jsonrpc` 发送 JSON-RPC 2.0 请求

use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

use super::message::{RpcRequest, RpcResponse};
use super::RpcError;
use crate::utils::jsonrpc_endpoint;

/// JSON-RPC 客户端连接
#[derive(Clone)]
pub struct JsonRpcClient {
    http: reqwest::Client,
    endpoint: String,
}

impl JsonRpcClient {
    /// 创建新的客户端（不会立即建立连接）
    pub fn new(host: &str, insecure: bool, timeout: Duration) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(insecure)
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::transport(format!("无法创建 HTTP 客户端: {}", e)))?;

        Ok(Self {
            http,
            endpoint: jsonrpc_endpoint(host),
        })
    }

    /// 请求地址
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// 发送请求并等待响应
    pub async fn call(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value, RpcError> {
        let request = RpcRequest::new(method, params);
        debug!("→ {} ({})", method, request.id);

        let resp = self.http.post(&self.endpoint).json(&request).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("{} 返回 HTTP {}", method, status);
            return Err(RpcError::transport(format!(
                "HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        let text = resp.text().await?;
        let response = RpcResponse::from_json(&text)?;

        if let Some(info) = response.error.as_ref() {
            let err = RpcError::from_fault(info);
            debug!("← {} 失败: {}", method, err);
            return Err(err);
        }

        debug!("← {} 成功", method);
        Ok(response.result.unwrap_or(serde_json::Value::Null))
    }

    /// 发送请求并将结果反序列化为指定类型
    pub async fn call_as<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> Result<T, RpcError> {
        let value = self.call(method, params).await?;
        serde_json::from_value(value).map_err(|e| {
            RpcError::invalid_response(format!("{} 返回了无法解析的结果: {}", method, e))
        })
    }
}
