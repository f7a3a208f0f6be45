//! 靶场重置 CLI

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing::{error, info, Level};

use range_orchestrator::{ResetAction, ResetScope};

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "range-reset")]
#[command(about = "Cyber Range 重置编排 - 批量快照恢复 / 电源循环", long_about = None)]
#[command(version)]
struct Cli {
    /// 日志级别
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 规划并执行重置
    Reset {
        #[command(flatten)]
        target: TargetArgs,

        /// 最大并发数（默认取配置文件）
        #[arg(short, long)]
        parallel: Option<usize>,

        /// 使用模拟后端，不接触真实平台
        #[arg(long)]
        dry_run: bool,

        /// 输出格式
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// 预览重置计划，不连接后端
    Plan {
        #[command(flatten)]
        target: TargetArgs,

        /// 输出格式
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

/// 重置目标参数
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// 靶场配置文件 (.yaml / .yml / .toml / .json)
    #[arg(short, long)]
    pub config: PathBuf,

    /// 重置范围 (vm / team / zone / full)
    #[arg(short, long)]
    pub level: ResetScope,

    /// 重置动作 (snapshot_revert / power_cycle)
    #[arg(short, long, default_value = "snapshot_revert")]
    pub action: ResetAction,

    /// 快照名（快照恢复时必填）
    #[arg(short, long)]
    pub snapshot: Option<String>,

    /// 区域名（区域范围）
    #[arg(short, long)]
    pub zone: Option<String>,

    /// 队伍编号（队伍范围）
    #[arg(short, long)]
    pub team: Option<u32>,

    /// 虚拟机名（单机范围）
    #[arg(long)]
    pub vm: Option<String>,
}

/// 输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Yaml,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // 初始化日志
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .init();

    info!("range-reset 启动");

    let result = match cli.command {
        Commands::Reset {
            target,
            parallel,
            dry_run,
            format,
        } => commands::reset::handle(&target, parallel, dry_run, format).await,
        Commands::Plan { target, format } => commands::plan::handle(&target, format),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("执行失败: {:#}", e);
            eprintln!("{} {:#}", "错误:".red().bold(), e);
            ExitCode::from(commands::EXIT_ERROR)
        }
    }
}
