/// 命令行参数
///
/// 命令行参数优先于配置文件和环境变量

use clap::{ArgGroup, Args, Parser, Subcommand};
use common::{DesiredState, Error, Result, VmSelector};

use crate::config::Config;
use crate::reconcile::ApplyRequest;

#[derive(Parser, Debug)]
#[command(name = "xenctl")]
#[command(about = "XenServer 虚拟机电源状态管理", long_about = None)]
#[command(version)]
pub struct Cli {
    /// 配置文件路径
    #[arg(short, long, env = "XENCTL_CONFIG")]
    pub config: Option<String>,

    /// XenServer 主机地址
    #[arg(long)]
    pub host: Option<String>,

    #[arg(short, long)]
    pub username: Option<String>,

    #[arg(short, long)]
    pub password: Option<String>,

    /// 日志级别 (RUST_LOG 优先)
    #[arg(long)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// 将虚拟机推进到期望状态
    Apply(ApplyArgs),
    /// 输出虚拟机完整记录
    Facts(FactsArgs),
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("selector").required(true).args(["name", "tags"])))]
pub struct ApplyArgs {
    /// 虚拟机名称，逗号分隔
    #[arg(short, long, value_delimiter = ',')]
    pub name: Vec<String>,

    /// 标签，虚拟机需包含全部标签
    #[arg(short, long, value_delimiter = ',')]
    pub tags: Vec<String>,

    /// present / absent / running / halted / restarted
    #[arg(short, long, default_value = "present")]
    pub state: DesiredState,

    /// 创建虚拟机使用的模板名称
    #[arg(long)]
    pub template: Option<String>,

    /// 提交任务后不等待完成
    #[arg(long = "async")]
    pub asynchronous: bool,

    /// 只报告将要执行的操作
    #[arg(long)]
    pub check: bool,

    /// 同时处理的虚拟机数量
    #[arg(long)]
    pub concurrency: Option<usize>,
}

#[derive(Args, Debug)]
pub struct FactsArgs {
    /// 字段过滤条件 key=value，可重复
    #[arg(short, long = "filter", value_parser = parse_filter)]
    pub filters: Vec<(String, String)>,
}

impl Cli {
    /// 用命令行参数覆盖配置
    pub fn apply_overrides(&self, cfg: &mut Config) {
        if let Some(host) = &self.host {
            cfg.host = host.clone();
        }
        if let Some(username) = &self.username {
            cfg.username = username.clone();
        }
        if let Some(password) = &self.password {
            cfg.password = password.clone();
        }
        if let Some(level) = &self.log_level {
            cfg.log_level = level.clone();
        }
        if let Command::Apply(args) = &self.command {
            if let Some(concurrency) = args.concurrency {
                cfg.concurrency = concurrency;
            }
        }
    }
}

impl ApplyArgs {
    pub fn to_request(&self) -> Result<ApplyRequest> {
        let selector = match (self.name.is_empty(), self.tags.is_empty()) {
            (false, true) => VmSelector::Names(self.name.clone()),
            (true, false) => VmSelector::Tags(self.tags.clone()),
            (true, true) => {
                return Err(Error::InvalidArgument("必须指定 --name 或 --tags".to_string()))
            }
            (false, false) => {
                return Err(Error::InvalidArgument(
                    "--name 与 --tags 不能同时使用".to_string(),
                ))
            }
        };

        let request = ApplyRequest {
            selector,
            desired: self.state,
            template: self.template.clone(),
            asynchronous: self.asynchronous,
            check_mode: self.check,
        };
        request.validate()?;
        Ok(request)
    }
}

fn parse_filter(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("过滤条件格式应为 key=value: {}", raw)),
    }
}
