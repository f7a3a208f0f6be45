//! 重置操作数据模型

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// 重置范围
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetScope {
    /// 单台虚拟机
    Vm,

    /// 某个队伍的全部虚拟机
    Team,

    /// 某个区域的全部虚拟机
    Zone,

    /// 整个靶场
    Full,
}

impl ResetScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vm => "vm",
            Self::Team => "team",
            Self::Zone => "zone",
            Self::Full => "full",
        }
    }
}

impl fmt::Display for ResetScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResetScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "vm" => Ok(Self::Vm),
            "team" => Ok(Self::Team),
            "zone" => Ok(Self::Zone),
            "full" => Ok(Self::Full),
            other => Err(format!("未知的重置范围: {}", other)),
        }
    }
}

/// 重置动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetAction {
    /// 恢复到指定快照（需要快照名）
    SnapshotRevert,

    /// 电源循环
    PowerCycle,
}

impl ResetAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SnapshotRevert => "snapshot_revert",
            Self::PowerCycle => "power_cycle",
        }
    }

    /// 是否需要快照名
    pub fn requires_snapshot(&self) -> bool {
        matches!(self, Self::SnapshotRevert)
    }
}

impl fmt::Display for ResetAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResetAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "snapshot_revert" => Ok(Self::SnapshotRevert),
            "power_cycle" => Ok(Self::PowerCycle),
            other => Err(format!("未知的重置动作: {}", other)),
        }
    }
}

/// 任务状态
///
/// `Pending → Running → {Completed | Failed}`，终态不再变化。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 操作汇总状态（由任务列表推导，不存储）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Empty,
    Pending,
    Running,
    Completed,
    Failed,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// 调用方视为成功：全部完成，或者没有任何任务
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed | Self::Empty)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单台虚拟机的重置任务
///
/// 只能由计划器创建；序列化输出使用 [`crate::ResetReport`]。
#[derive(Debug, Clone, PartialEq)]
pub struct ResetTask {
    vm_name: String,
    action: ResetAction,
    snapshot_name: Option<String>,
    status: TaskStatus,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    error: Option<String>,
}

impl ResetTask {
    pub(crate) fn new(vm_name: String, action: ResetAction, snapshot_name: Option<String>) -> Self {
        Self {
            vm_name,
            action,
            snapshot_name,
            status: TaskStatus::Pending,
            start_time: None,
            end_time: None,
            error: None,
        }
    }

    pub fn vm_name(&self) -> &str {
        &self.vm_name
    }

    pub fn action(&self) -> ResetAction {
        self.action
    }

    pub fn snapshot_name(&self) -> Option<&str> {
        self.snapshot_name.as_deref()
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// 耗时（开始、结束时间都存在时）
    pub fn duration(&self) -> Option<Duration> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => (end - start).to_std().ok(),
            _ => None,
        }
    }

    /// 下发任务；只有 `Pending` 任务可以下发，返回是否下发成功
    pub(crate) fn mark_running(&mut self) -> bool {
        if self.status != TaskStatus::Pending {
            warn!("任务 {} 状态为 {}，忽略重复下发", self.vm_name, self.status);
            return false;
        }
        self.status = TaskStatus::Running;
        self.start_time = Some(Utc::now());
        true
    }

    /// 记录终态，只生效一次
    pub(crate) fn finish(&mut self, outcome: Result<(), String>) {
        if self.status.is_terminal() {
            warn!("任务 {} 已处于终态 {}，忽略结果", self.vm_name, self.status);
            return;
        }

        match outcome {
            Ok(()) => {
                self.status = TaskStatus::Completed;
                self.error = None;
            }
            Err(message) => {
                self.status = TaskStatus::Failed;
                self.error = Some(if message.is_empty() {
                    "未知错误".to_string()
                } else {
                    message
                });
            }
        }
        self.end_time = Some(Utc::now());
    }
}

/// 一次规划并执行的批量重置
#[derive(Debug, Clone, PartialEq)]
pub struct ResetOperation {
    operation_id: String,
    level: ResetScope,
    action: ResetAction,
    pub(crate) tasks: Vec<ResetTask>,
    pub(crate) start_time: Option<DateTime<Utc>>,
    pub(crate) end_time: Option<DateTime<Utc>>,
}

impl ResetOperation {
    pub(crate) fn new(
        operation_id: String,
        level: ResetScope,
        action: ResetAction,
        tasks: Vec<ResetTask>,
    ) -> Self {
        Self {
            operation_id,
            level,
            action,
            tasks,
            start_time: None,
            end_time: None,
        }
    }

    /// 生成操作 ID：时间戳 + 随机后缀，同一秒内的多次规划也能区分
    pub(crate) fn generate_id() -> String {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("{}-{}", Utc::now().format("%Y%m%d-%H%M%S"), &suffix[..8])
    }

    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    pub fn level(&self) -> ResetScope {
        self.level
    }

    pub fn action(&self) -> ResetAction {
        self.action
    }

    pub fn tasks(&self) -> &[ResetTask] {
        &self.tasks
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn duration(&self) -> Option<Duration> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => (end - start).to_std().ok(),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn total_count(&self) -> usize {
        self.tasks.len()
    }

    fn count(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }

    pub fn pending_count(&self) -> usize {
        self.count(TaskStatus::Pending)
    }

    pub fn running_count(&self) -> usize {
        self.count(TaskStatus::Running)
    }

    pub fn completed_count(&self) -> usize {
        self.count(TaskStatus::Completed)
    }

    pub fn failed_count(&self) -> usize {
        self.count(TaskStatus::Failed)
    }

    /// 已进入终态的任务数
    pub fn finished_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.status.is_terminal()).count()
    }

    /// 失败的虚拟机名称（任务顺序）
    pub fn failed_vms(&self) -> Vec<&str> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Failed)
            .map(|t| t.vm_name.as_str())
            .collect()
    }

    /// 汇总状态，每次读取时从任务列表推导
    pub fn status(&self) -> OperationStatus {
        if self.tasks.is_empty() {
            return OperationStatus::Empty;
        }
        if self.tasks.iter().any(|t| t.status == TaskStatus::Failed) {
            return OperationStatus::Failed;
        }
        if self.tasks.iter().all(|t| t.status == TaskStatus::Completed) {
            return OperationStatus::Completed;
        }
        if self.tasks.iter().any(|t| t.status == TaskStatus::Running) {
            return OperationStatus::Running;
        }
        OperationStatus::Pending
    }

    /// 进度百分比：进入终态的任务占比，没有任务时为 100
    pub fn progress(&self) -> f64 {
        if self.tasks.is_empty() {
            return 100.0;
        }
        self.finished_count() as f64 / self.tasks.len() as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn operation(statuses: &[TaskStatus]) -> ResetOperation {
        let tasks = statuses
            .iter()
            .enumerate()
            .map(|(i, status)| {
                let mut task = ResetTask::new(format!("vm-{}", i), ResetAction::PowerCycle, None);
                match status {
                    TaskStatus::Pending => {}
                    TaskStatus::Running => {
                        task.mark_running();
                    }
                    TaskStatus::Completed => {
                        task.mark_running();
                        task.finish(Ok(()));
                    }
                    TaskStatus::Failed => {
                        task.mark_running();
                        task.finish(Err("boom".to_string()));
                    }
                }
                task
            })
            .collect();
        ResetOperation::new("op".to_string(), ResetScope::Full, ResetAction::PowerCycle, tasks)
    }

    #[test]
    fn test_status_derivation() {
        use TaskStatus::*;

        assert_eq!(operation(&[]).status(), OperationStatus::Empty);
        assert_eq!(operation(&[Pending, Pending]).status(), OperationStatus::Pending);
        assert_eq!(operation(&[Pending, Running]).status(), OperationStatus::Running);
        assert_eq!(operation(&[Completed, Running]).status(), OperationStatus::Running);
        assert_eq!(operation(&[Completed, Pending]).status(), OperationStatus::Pending);
        assert_eq!(operation(&[Completed, Completed]).status(), OperationStatus::Completed);
        assert_eq!(operation(&[Completed, Failed, Running]).status(), OperationStatus::Failed);
    }

    #[test]
    fn test_progress_counts_terminal_tasks() {
        use TaskStatus::*;

        assert_eq!(operation(&[]).progress(), 100.0);
        assert_eq!(operation(&[Pending, Running]).progress(), 0.0);
        assert_eq!(operation(&[Completed, Running, Pending, Failed]).progress(), 50.0);
        assert_eq!(operation(&[Completed, Failed]).progress(), 100.0);
    }

    #[test]
    fn test_derived_reads_are_idempotent() {
        use TaskStatus::*;

        let op = operation(&[Completed, Running, Failed, Pending]);
        assert_eq!(op.status(), op.status());
        assert_eq!(op.progress(), op.progress());
    }

    #[test]
    fn test_task_lifecycle_invariants() {
        let mut task = ResetTask::new(
            "dc01".to_string(),
            ResetAction::SnapshotRevert,
            Some("pre-ex".to_string()),
        );
        assert_eq!(task.status(), TaskStatus::Pending);
        assert!(task.start_time().is_none());
        assert!(task.end_time().is_none());

        assert!(task.mark_running());
        assert_eq!(task.status(), TaskStatus::Running);
        assert!(task.start_time().is_some());
        assert!(!task.mark_running());
        assert!(task.end_time().is_none());

        task.finish(Err(String::new()));
        assert_eq!(task.status(), TaskStatus::Failed);
        assert_eq!(task.error(), Some("未知错误"));
        assert!(task.end_time().is_some());
        assert!(task.duration().is_some());

        // 终态只设置一次
        let end = task.end_time();
        task.finish(Ok(()));
        assert_eq!(task.status(), TaskStatus::Failed);
        assert_eq!(task.end_time(), end);

        // 终态任务不能再次下发
        assert!(!task.mark_running());
        assert_eq!(task.status(), TaskStatus::Failed);
    }

    #[test]
    fn test_counters_and_failed_vms() {
        use TaskStatus::*;

        let op = operation(&[Completed, Failed, Running, Pending, Failed]);
        assert_eq!(op.total_count(), 5);
        assert_eq!(op.completed_count(), 1);
        assert_eq!(op.failed_count(), 2);
        assert_eq!(op.running_count(), 1);
        assert_eq!(op.pending_count(), 1);
        assert_eq!(op.failed_vms(), vec!["vm-1", "vm-4"]);
    }

    #[test]
    fn test_enum_wire_names() {
        assert_eq!("team".parse::<ResetScope>().unwrap(), ResetScope::Team);
        assert_eq!("FULL".parse::<ResetScope>().unwrap(), ResetScope::Full);
        assert!("rack".parse::<ResetScope>().is_err());

        assert_eq!(
            "snapshot_revert".parse::<ResetAction>().unwrap(),
            ResetAction::SnapshotRevert
        );
        assert_eq!(
            serde_json::to_string(&ResetAction::PowerCycle).unwrap(),
            "\"power_cycle\""
        );
        assert_eq!(serde_json::to_string(&OperationStatus::Empty).unwrap(), "\"empty\"");
    }

    #[test]
    fn test_generated_ids_are_distinct() {
        let a = ResetOperation::generate_id();
        let b = ResetOperation::generate_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), "20250101-120000-abcdef12".len());
    }
}
