//! 重置报告
//!
//! 从操作（已完成或执行中）生成只读汇总，可输出为文本、JSON 或 YAML。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::operation::{OperationStatus, ResetAction, ResetOperation, ResetScope, TaskStatus};

const RULE_WIDTH: usize = 60;

/// 重置报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetReport {
    /// 操作 ID
    pub operation_id: String,

    /// 重置范围
    pub level: ResetScope,

    /// 重置动作
    pub action: ResetAction,

    /// 汇总状态
    pub status: OperationStatus,

    /// 进度百分比
    pub progress: f64,

    /// 开始时间
    pub start_time: Option<DateTime<Utc>>,

    /// 结束时间
    pub end_time: Option<DateTime<Utc>>,

    /// 总耗时（秒）
    pub duration_seconds: Option<f64>,

    pub total_count: usize,
    pub completed_count: usize,
    pub failed_count: usize,
    pub running_count: usize,
    pub pending_count: usize,

    /// 任务明细
    pub tasks: Vec<TaskReport>,
}

/// 任务明细
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReport {
    pub vm_name: String,
    pub action: ResetAction,
    pub snapshot_name: Option<String>,
    pub status: TaskStatus,
    pub duration_seconds: Option<f64>,
    pub error: Option<String>,
}

impl ResetReport {
    /// 读取操作当前状态生成报告
    pub fn from_operation(operation: &ResetOperation) -> Self {
        let tasks = operation
            .tasks()
            .iter()
            .map(|task| TaskReport {
                vm_name: task.vm_name().to_string(),
                action: task.action(),
                snapshot_name: task.snapshot_name().map(str::to_string),
                status: task.status(),
                duration_seconds: task.duration().map(|d| d.as_secs_f64()),
                error: task.error().map(str::to_string),
            })
            .collect();

        Self {
            operation_id: operation.operation_id().to_string(),
            level: operation.level(),
            action: operation.action(),
            status: operation.status(),
            progress: operation.progress(),
            start_time: operation.start_time(),
            end_time: operation.end_time(),
            duration_seconds: operation.duration().map(|d| d.as_secs_f64()),
            total_count: operation.total_count(),
            completed_count: operation.completed_count(),
            failed_count: operation.failed_count(),
            running_count: operation.running_count(),
            pending_count: operation.pending_count(),
            tasks,
        }
    }

    /// 调用方视为成功
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// 纯文本报告
    pub fn render_text(&self) -> String {
        let heavy = "=".repeat(RULE_WIDTH);
        let light = "-".repeat(RULE_WIDTH);
        let time = |t: Option<DateTime<Utc>>| {
            t.map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "N/A".to_string())
        };

        let mut lines = vec![
            heavy.clone(),
            "靶场重置操作报告".to_string(),
            heavy.clone(),
            format!("操作 ID: {}", self.operation_id),
            format!("范围: {}", self.level),
            format!("动作: {}", self.action),
            format!("状态: {}", self.status.as_str().to_uppercase()),
            format!("进度: {:.1}%", self.progress),
            String::new(),
            format!("开始时间: {}", time(self.start_time)),
            format!("结束时间: {}", time(self.end_time)),
            String::new(),
            light.clone(),
            "任务:".to_string(),
            light,
        ];

        for task in &self.tasks {
            let duration = task
                .duration_seconds
                .map(|s| format!("{:.1}s", s))
                .unwrap_or_else(|| "N/A".to_string());
            lines.push(format!(
                "  {} {} - {} ({})",
                status_marker(task.status),
                task.vm_name,
                task.status,
                duration
            ));
            if let Some(error) = &task.error {
                lines.push(format!("      错误: {}", error));
            }
        }

        lines.push(String::new());
        lines.push(heavy.clone());
        lines.push(format!(
            "汇总: 完成 {}, 失败 {}, 共 {}",
            self.completed_count, self.failed_count, self.total_count
        ));
        if let Some(seconds) = self.duration_seconds {
            lines.push(format!("总耗时: {:.1} 秒", seconds));
        }
        lines.push(heavy);

        lines.join("\n")
    }

    /// 导出为 JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// 导出为 YAML
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// 任务状态标记
pub fn status_marker(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Completed => "✅",
        TaskStatus::Failed => "❌",
        TaskStatus::Running => "🔄",
        TaskStatus::Pending => "⏳",
    }
}
