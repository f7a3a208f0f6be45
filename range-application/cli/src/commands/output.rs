//! CLI 输出格式化
//!
//! 文本 / JSON / YAML 三种格式，文本格式额外打印彩色汇总行。
//! 标准输出只写报告本身，提示信息和进度条走标准错误。

use anyhow::{Context, Result};
use colored::Colorize;
use std::io::{self, Write};

use range_orchestrator::{ResetOperation, ResetReport};

use crate::OutputFormat;

/// 按格式把操作报告打印到标准输出
pub fn print_operation(operation: &ResetOperation, format: OutputFormat) -> Result<()> {
    let stdout = io::stdout();
    write_operation(&mut stdout.lock(), operation, format)
}

/// 按格式写出操作报告
pub fn write_operation<W: Write>(
    out: &mut W,
    operation: &ResetOperation,
    format: OutputFormat,
) -> Result<()> {
    write_report(out, &ResetReport::from_operation(operation), format)
}

/// 按格式写出报告
pub fn write_report<W: Write>(
    out: &mut W,
    report: &ResetReport,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let json = report.to_json().context("序列化 JSON 报告失败")?;
            writeln!(out, "{}", json)?;
        }
        OutputFormat::Yaml => {
            let yaml = report.to_yaml().context("序列化 YAML 报告失败")?;
            write!(out, "{}", yaml)?;
        }
        OutputFormat::Text => {
            writeln!(out, "{}", report.render_text())?;
            write_summary(out, report)?;
        }
    }
    out.flush().context("写出报告失败")?;
    Ok(())
}

fn write_summary<W: Write>(out: &mut W, report: &ResetReport) -> io::Result<()> {
    if report.total_count == 0 {
        return writeln!(out, "{} 没有匹配的虚拟机", "✓".green().bold());
    }

    if report.is_success() {
        return writeln!(
            out,
            "{} 全部 {} 台虚拟机重置完成",
            "✓".green().bold(),
            report.completed_count.to_string().green()
        );
    }

    let failed: Vec<&str> = report
        .tasks
        .iter()
        .filter(|t| t.error.is_some())
        .map(|t| t.vm_name.as_str())
        .collect();
    writeln!(
        out,
        "{} {} 台虚拟机重置失败: {}",
        "✗".red().bold(),
        report.failed_count.to_string().red(),
        failed.join(", ").red()
    )?;
    writeln!(
        out,
        "  使用 {} 仅重试失败的虚拟机",
        "--level vm --vm <名称>".bright_black()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use range_orchestrator::{PlanRequest, RangeTopology, ResetAction, ResetPlanner, ResetScope};

    fn planned() -> ResetOperation {
        let topology = RangeTopology::new()
            .with_zone("blue", vec![("dc01-t1", Some(1)), ("ws01-t1", Some(1))]);
        ResetPlanner::new(&topology)
            .plan(&PlanRequest::new(ResetScope::Full, ResetAction::PowerCycle))
            .unwrap()
    }

    fn render(operation: &ResetOperation, format: OutputFormat) -> String {
        let mut buffer = Vec::new();
        write_operation(&mut buffer, operation, format).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_json_output_is_report_only() {
        let output = render(&planned(), OutputFormat::Json);

        assert!(output.starts_with('{'));
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["total_count"], 2);
        assert_eq!(value["tasks"][0]["vm_name"], "dc01-t1");
    }

    #[test]
    fn test_yaml_output_is_report_only() {
        let output = render(&planned(), OutputFormat::Yaml);

        let value: serde_yaml::Value = serde_yaml::from_str(&output).unwrap();
        assert_eq!(value["total_count"].as_u64(), Some(2));
    }

    #[test]
    fn test_text_output_has_summary() {
        let output = render(&planned(), OutputFormat::Text);

        assert!(output.contains("靶场重置操作报告"));
        assert!(output.contains("dc01-t1"));
        assert!(output.contains("共 2"));
    }
}
