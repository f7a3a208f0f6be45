//! 重置执行

use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::process::ExitCode;

use range_hypervisor::AdapterRegistry;
use range_orchestrator::{ProgressCallback, ResetExecutor, ResetOperation};

use super::{output, EXIT_FAILED, EXIT_SUCCESS};
use crate::{OutputFormat, TargetArgs};

/// 规划、执行并把报告打印到标准输出
pub async fn handle(
    target: &TargetArgs,
    parallel: Option<usize>,
    dry_run: bool,
    format: OutputFormat,
) -> Result<ExitCode> {
    let code = run(target, parallel, dry_run, format, &mut io::stdout()).await?;
    Ok(ExitCode::from(code))
}

/// 规划、执行并写出报告，返回退出码
///
/// `out` 只接收报告；提示信息和进度条写到标准错误。
pub async fn run<W: Write>(
    target: &TargetArgs,
    parallel: Option<usize>,
    dry_run: bool,
    format: OutputFormat,
    out: &mut W,
) -> Result<u8> {
    let (config, operation) = super::load_and_plan(target)?;

    if operation.is_empty() {
        eprintln!("{}", "没有匹配的虚拟机，无需执行".yellow());
        output::write_operation(out, &operation, format)?;
        return Ok(EXIT_SUCCESS);
    }

    let backend = config.backend_config(dry_run)?;
    if dry_run {
        eprintln!("{} dry-run 模式，使用模拟后端", "ℹ".blue().bold());
    }

    let adapter = AdapterRegistry::with_defaults()
        .build(&backend)
        .context("创建后端适配器失败")?;

    let executor = ResetExecutor::new(parallel.unwrap_or(config.execution.max_concurrency));

    eprintln!(
        "\n{} {} 台虚拟机 ({}，并发 {})\n",
        "开始重置".bold(),
        operation.total_count().to_string().cyan(),
        operation.action(),
        executor.max_concurrency()
    );

    let progress = ProgressBar::new(operation.total_count() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .context("进度条模板无效")?
            .progress_chars("=>-"),
    );

    let bar = progress.clone();
    let on_progress = move |op: &ResetOperation| {
        bar.set_position(op.finished_count() as u64);
        bar.set_message(format!(
            "完成 {} 失败 {} ({:.1}%)",
            op.completed_count(),
            op.failed_count(),
            op.progress()
        ));
    };

    let operation = executor
        .run(operation, adapter, Some(&on_progress as &ProgressCallback))
        .await
        .context("重置操作中止")?;

    if operation.status().is_success() {
        progress.finish_with_message("完成".green().to_string());
    } else {
        progress.finish_with_message("存在失败任务".red().to_string());
    }
    eprintln!();

    output::write_operation(out, &operation, format)?;

    let code = if operation.status().is_success() {
        EXIT_SUCCESS
    } else {
        EXIT_FAILED
    };
    Ok(code)
}
