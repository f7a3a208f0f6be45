//! 重置计划
//!
//! 先校验参数，再解析范围，最后为每台目标虚拟机生成一个 `pending` 任务。
//! 计划阶段不接触任何后端。

use tracing::{debug, info};

use crate::operation::{ResetAction, ResetOperation, ResetScope, ResetTask, TaskStatus};
use crate::scope::{self, ScopeFilter};
use crate::topology::RangeTopology;
use crate::{OrchestratorError, Result};

/// 计划请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanRequest {
    pub scope: ResetScope,
    pub action: ResetAction,
    pub snapshot_name: Option<String>,
    pub filter: ScopeFilter,
}

impl PlanRequest {
    pub fn new(scope: ResetScope, action: ResetAction) -> Self {
        Self {
            scope,
            action,
            snapshot_name: None,
            filter: ScopeFilter::default(),
        }
    }

    pub fn with_snapshot(mut self, snapshot: impl Into<String>) -> Self {
        self.snapshot_name = Some(snapshot.into());
        self
    }

    pub fn with_zone(mut self, zone: impl Into<String>) -> Self {
        self.filter.zone = Some(zone.into());
        self
    }

    pub fn with_team(mut self, team: u32) -> Self {
        self.filter.team = Some(team);
        self
    }

    pub fn with_vm(mut self, vm: impl Into<String>) -> Self {
        self.filter.vm = Some(vm.into());
        self
    }

    fn validate(&self) -> Result<()> {
        fn present(value: Option<&str>) -> bool {
            value.map(|v| !v.trim().is_empty()).unwrap_or(false)
        }

        if self.action.requires_snapshot() && !present(self.snapshot_name.as_deref()) {
            return Err(OrchestratorError::InvalidPlanParameters(
                "快照恢复需要指定快照名".to_string(),
            ));
        }

        match self.scope {
            ResetScope::Team if self.filter.team.is_none() => Err(
                OrchestratorError::InvalidPlanParameters("队伍范围需要指定队伍编号".to_string()),
            ),
            ResetScope::Zone if !present(self.filter.zone.as_deref()) => Err(
                OrchestratorError::InvalidPlanParameters("区域范围需要指定区域名".to_string()),
            ),
            ResetScope::Vm if !present(self.filter.vm.as_deref()) => Err(
                OrchestratorError::InvalidPlanParameters("虚拟机范围需要指定虚拟机名".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

/// 重置计划器
pub struct ResetPlanner<'a> {
    topology: &'a RangeTopology,
}

impl<'a> ResetPlanner<'a> {
    pub fn new(topology: &'a RangeTopology) -> Self {
        Self { topology }
    }

    /// 生成重置操作
    pub fn plan(&self, request: &PlanRequest) -> Result<ResetOperation> {
        request.validate()?;

        let targets = scope::resolve(self.topology, request.scope, &request.filter)?;

        // 电源循环不携带快照名
        let snapshot = if request.action.requires_snapshot() {
            request.snapshot_name.clone()
        } else {
            None
        };

        let tasks: Vec<ResetTask> = targets
            .into_iter()
            .map(|target| ResetTask::new(target.vm_name, request.action, snapshot.clone()))
            .collect();

        let operation = ResetOperation::new(
            ResetOperation::generate_id(),
            request.scope,
            request.action,
            tasks,
        );

        info!(
            "生成重置计划 {}: 范围 {}, 动作 {}, 共 {} 台虚拟机",
            operation.operation_id(),
            operation.level(),
            operation.action(),
            operation.total_count()
        );
        for task in operation.tasks() {
            debug!("  计划任务: {}", task.vm_name());
        }

        Ok(operation)
    }

    /// 仅针对失败的虚拟机重新生成计划
    ///
    /// 原操作保持不变；新操作按虚拟机范围生成，沿用原动作和快照名，操作 ID 重新生成。
    pub fn replan_failed(&self, operation: &ResetOperation) -> ResetOperation {
        let tasks: Vec<ResetTask> = operation
            .tasks()
            .iter()
            .filter(|task| task.status() == TaskStatus::Failed)
            .map(|task| {
                ResetTask::new(
                    task.vm_name().to_string(),
                    task.action(),
                    task.snapshot_name().map(str::to_string),
                )
            })
            .collect();

        let retry = ResetOperation::new(
            ResetOperation::generate_id(),
            ResetScope::Vm,
            operation.action(),
            tasks,
        );

        info!(
            "为操作 {} 的 {} 台失败虚拟机生成重试计划 {}",
            operation.operation_id(),
            retry.total_count(),
            retry.operation_id()
        );

        retry
    }
}
