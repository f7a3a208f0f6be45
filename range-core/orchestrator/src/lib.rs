//! 靶场重置编排器
//!
//! 把声明式的重置范围（单台虚拟机 / 队伍 / 区域 / 整个靶场）解析为任务列表，
//! 在并发上限内对虚拟化后端批量执行快照恢复或电源循环，并汇总进度与状态。
//!
//! 流程：[`ResetPlanner`] 生成 [`ResetOperation`] →
//! [`ResetExecutor`] 绑定适配器执行 → [`ResetReport`] 读取最终状态。

pub mod executor;
pub mod operation;
pub mod planner;
pub mod report;
pub mod scope;
pub mod topology;

pub use executor::{ProgressCallback, ResetExecutor};
pub use operation::{
    OperationStatus, ResetAction, ResetOperation, ResetScope, ResetTask, TaskStatus,
};
pub use planner::{PlanRequest, ResetPlanner};
pub use report::{ResetReport, TaskReport};
pub use scope::{resolve, ResolvedVm, ScopeFilter};
pub use topology::{RangeTopology, VmDescriptor, ZoneDefinition};

use thiserror::Error;

/// 编排错误
///
/// 只有计划阶段和建立会话阶段会返回错误；单个任务的失败记录在任务上。
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("计划参数无效: {0}")]
    InvalidPlanParameters(String),

    #[error("缺少范围参数: {0}")]
    MissingScopeParameter(String),

    #[error("连接后端失败: {0}")]
    Connect(#[from] range_hypervisor::ConnectError),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
