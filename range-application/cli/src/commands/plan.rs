//! 重置计划预览

use anyhow::Result;
use colored::Colorize;
use std::process::ExitCode;

use range_orchestrator::ResetOperation;

use super::output;
use crate::{OutputFormat, TargetArgs};

/// 只解析范围并打印任务列表
pub fn handle(target: &TargetArgs, format: OutputFormat) -> Result<ExitCode> {
    let (_, operation) = super::load_and_plan(target)?;

    match format {
        OutputFormat::Text => print_plan(&operation),
        _ => output::print_operation(&operation, format)?,
    }

    Ok(ExitCode::from(super::EXIT_SUCCESS))
}

fn print_plan(operation: &ResetOperation) {
    println!("{}", "重置计划".bold());
    println!("  操作 ID: {}", operation.operation_id().cyan());
    println!("  范围: {}", operation.level());
    println!("  动作: {}", operation.action());
    if let Some(snapshot) = operation.tasks().first().and_then(|t| t.snapshot_name()) {
        println!("  快照: {}", snapshot.cyan());
    }
    println!("  虚拟机数: {}", operation.total_count().to_string().green());

    if operation.is_empty() {
        println!("\n{}", "没有匹配的虚拟机".yellow());
        return;
    }

    println!();
    for (index, task) in operation.tasks().iter().enumerate() {
        println!("  {:>3}. {}", index + 1, task.vm_name());
    }
}
