/// xenctl
///
/// XenServer 虚拟机电源状态管理工具，结果以 JSON 输出到 stdout，日志输出到 stderr

use clap::Parser;
use serde_json::{json, Value};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod cli;
mod config;
mod hypervisor;
mod reconcile;

use cli::{Cli, Command};
use hypervisor::{XenApi, XenSession};
use reconcile::facts::{self, FactFilters};
use reconcile::{ApplyRequest, EngineSettings};

/// 登录前已校验完毕的任务
enum Job {
    Apply(ApplyRequest),
    Facts(FactFilters),
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut cfg = config::Config::load(cli.config.as_deref())?;
    cli.apply_overrides(&mut cfg);

    // RUST_LOG 优先，例如 RUST_LOG=xenctl=debug
    let default_level = cfg.log_level.clone();
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    info!("🚀 启动 xenctl {}...", env!("CARGO_PKG_VERSION"));

    match run(&cli, &cfg).await {
        Ok((payload, failed)) => {
            println!("{}", serde_json::to_string_pretty(&payload)?);
            if failed {
                warn!("部分虚拟机处理失败");
                return Ok(ExitCode::FAILURE);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!("❌ {}", e);
            println!("{}", json!({ "failed": true, "msg": e.to_string() }));
            Ok(ExitCode::FAILURE)
        }
    }
}

/// 校验参数、登录、执行并在所有路径上登出
async fn run(cli: &Cli, cfg: &config::Config) -> common::Result<(Value, bool)> {
    cfg.validate()?;

    let job = match &cli.command {
        Command::Apply(args) => Job::Apply(args.to_request()?),
        Command::Facts(args) => Job::Facts(facts::build_filters(&args.filters)),
    };

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("⚠️ 收到中断信号，停止等待 (已提交的任务仍由 hypervisor 执行)");
            signal_cancel.cancel();
        }
    });

    let session = XenSession::login(cfg).await?;
    let result = execute(&session, &cfg.engine_settings(), job, cancel).await;

    if let Err(e) = session.logout().await {
        warn!("登出失败: {}", e);
    }
    result
}

async fn execute(
    api: &dyn XenApi,
    settings: &EngineSettings,
    job: Job,
    cancel: CancellationToken,
) -> common::Result<(Value, bool)> {
    match job {
        Job::Apply(request) => {
            let report = reconcile::apply(api, settings, &request, cancel).await?;
            let failed = report.failed();
            Ok((serde_json::to_value(&report)?, failed))
        }
        Job::Facts(filters) => {
            let records = api.list_vm_facts().await?;
            let instances = facts::gather_facts(records, &filters);
            info!("📋 收集到 {} 条虚拟机记录", instances.len());
            Ok((json!({ "changed": false, "instances": instances }), false))
        }
    }
}
