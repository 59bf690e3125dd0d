/// XenAPI 会话
///
/// 负责登录/登出，并通过 JSON-RPC 实现 `XenApi`

use async_trait::async_trait;
use common::models::constants::{API_VERSION, ORIGINATOR};
use common::rpc::{JsonRpcClient, RawVmRecord, VmCall};
use common::utils::parse_task_result;
use common::{Error, Result, TaskStatus};
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{debug, info};

use super::XenApi;
use crate::config::Config;

/// 已登录的 XenAPI 会话
pub struct XenSession {
    client: JsonRpcClient,
    session_ref: String,
    host: String,
}

impl XenSession {
    /// 登录到 XenServer 主机
    pub async fn login(config: &Config) -> Result<Self> {
        let client = JsonRpcClient::new(&config.host, config.insecure, config.request_timeout())?;
        debug!("XenAPI 入口: {}", client.endpoint());

        let session_ref: String = client
            .call_as(
                "session.login_with_password",
                vec![
                    json!(config.username),
                    json!(config.password),
                    json!(API_VERSION),
                    json!(ORIGINATOR),
                ],
            )
            .await?;

        info!("✅ 已连接到 {} (用户: {})", config.host, config.username);

        Ok(Self {
            client,
            session_ref,
            host: config.host.clone(),
        })
    }

    /// 登出并释放会话
    pub async fn logout(self) -> Result<()> {
        self.client
            .call("session.logout", vec![json!(self.session_ref)])
            .await?;
        info!("已断开与 {} 的会话", self.host);
        Ok(())
    }

    /// 以会话引用开头的参数列表
    fn params(&self, rest: Vec<Value>) -> Vec<Value> {
        let mut params = Vec::with_capacity(rest.len() + 1);
        params.push(json!(self.session_ref));
        params.extend(rest);
        params
    }
}

#[async_trait]
impl XenApi for XenSession {
    async fn list_vms(&self) -> Result<HashMap<String, RawVmRecord>> {
        let records = self
            .client
            .call_as("VM.get_all_records", self.params(Vec::new()))
            .await?;
        Ok(records)
    }

    async fn list_vm_facts(&self) -> Result<HashMap<String, Value>> {
        let records = self
            .client
            .call_as("VM.get_all_records", self.params(Vec::new()))
            .await?;
        Ok(records)
    }

    async fn get_raw_vm(&self, vm_ref: &str) -> Result<RawVmRecord> {
        let record = self
            .client
            .call_as("VM.get_record", self.params(vec![json!(vm_ref)]))
            .await?;
        Ok(record)
    }

    async fn find_vms_by_name(&self, name: &str) -> Result<Vec<String>> {
        let refs = self
            .client
            .call_as("VM.get_by_name_label", self.params(vec![json!(name)]))
            .await?;
        Ok(refs)
    }

    async fn submit(&self, vm_ref: &str, call: &VmCall) -> Result<String> {
        let method = call.operation().async_method();
        let mut params = self.params(vec![json!(vm_ref)]);
        params.extend(call.extra_params());

        let task: String = self.client.call_as(method, params).await?;
        debug!("{} {} -> {}", method, vm_ref, task);
        Ok(task)
    }

    async fn task_status(&self, task: &str) -> Result<TaskStatus> {
        let status = self
            .client
            .call_as("task.get_status", self.params(vec![json!(task)]))
            .await?;
        Ok(status)
    }

    async fn task_result(&self, task: &str) -> Result<Option<String>> {
        let raw: Value = self
            .client
            .call("task.get_result", self.params(vec![json!(task)]))
            .await?;
        match raw {
            Value::String(s) => Ok(parse_task_result(&s)),
            Value::Null => Ok(None),
            other => Err(Error::Internal(format!("无法解析任务结果: {}", other))),
        }
    }

    async fn task_error(&self, task: &str) -> Result<Vec<String>> {
        let info = self
            .client
            .call_as("task.get_error_info", self.params(vec![json!(task)]))
            .await?;
        Ok(info)
    }

    async fn destroy_task(&self, task: &str) -> Result<()> {
        self.client
            .call("task.destroy", self.params(vec![json!(task)]))
            .await?;
        Ok(())
    }
}
