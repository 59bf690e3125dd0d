/// 配置管理
///
/// 默认值 -> 配置文件（可选）-> `XEN_` 前缀的环境变量，依次覆盖

use common::models::constants::{
    DEFAULT_CONCURRENCY, DEFAULT_GUARD_TIMEOUT, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_REQUEST_TIMEOUT, DEFAULT_TASK_TIMEOUT,
};
use serde::Deserialize;
use std::time::Duration;

use crate::reconcile::EngineSettings;

/// 环境变量前缀
pub const ENV_PREFIX: &str = "XEN";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub host: String,
    pub username: String,
    pub password: String,
    /// 接受自签名证书
    pub insecure: bool,
    pub request_timeout_secs: u64,
    pub poll_interval_ms: u64,
    /// 0 表示不限时
    pub guard_timeout_secs: u64,
    /// 0 表示不限时
    pub task_timeout_secs: u64,
    pub concurrency: usize,
    pub log_level: String,
}

impl Config {
    /// 加载配置
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    fn load_with_prefix(path: Option<&str>, prefix: &str) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("host", "")?
            .set_default("username", "root")?
            .set_default("password", "")?
            .set_default("insecure", true)?
            .set_default("request_timeout_secs", DEFAULT_REQUEST_TIMEOUT as i64)?
            .set_default("poll_interval_ms", DEFAULT_POLL_INTERVAL_MS as i64)?
            .set_default("guard_timeout_secs", DEFAULT_GUARD_TIMEOUT as i64)?
            .set_default("task_timeout_secs", DEFAULT_TASK_TIMEOUT as i64)?
            .set_default("concurrency", DEFAULT_CONCURRENCY as i64)?
            .set_default("log_level", "info")?;

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }

        let cfg: Self = builder
            .add_source(config::Environment::with_prefix(prefix))
            .build()?
            .try_deserialize()?;

        Ok(cfg)
    }

    /// 校验连接所需的配置项
    pub fn validate(&self) -> common::Result<()> {
        if self.host.trim().is_empty() {
            return Err(common::Error::Config("未配置 host (XEN_HOST)".to_string()));
        }
        if self.password.is_empty() {
            return Err(common::Error::Config("未配置 password (XEN_PASSWORD)".to_string()));
        }
        if self.poll_interval_ms == 0 {
            return Err(common::Error::Config("poll_interval_ms 必须大于 0".to_string()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// 轮询引擎参数
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            guard_timeout: non_zero_secs(self.guard_timeout_secs),
            task_timeout: non_zero_secs(self.task_timeout_secs),
            concurrency: self.concurrency.max(1),
        }
    }
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}
