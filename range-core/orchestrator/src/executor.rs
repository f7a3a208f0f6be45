//! 重置执行器

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use range_hypervisor::HypervisorAdapter;

use crate::operation::{ResetAction, ResetOperation, TaskStatus};
use crate::Result;

/// 进度回调：每个任务进入终态后调用一次，参数为操作的只读视图
pub type ProgressCallback = dyn Fn(&ResetOperation) + Send + Sync;

/// 单个任务的执行结果，按任务下标回写
struct TaskOutcome {
    index: usize,
    result: std::result::Result<(), String>,
}

/// 重置执行器
///
/// 在固定大小的并发池内按任务顺序下发任务，单个任务失败不影响其他任务。
/// 任务状态只由执行循环修改，后台任务只返回结果。
pub struct ResetExecutor {
    max_concurrency: usize,
}

impl Default for ResetExecutor {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_CONCURRENCY)
    }
}

impl ResetExecutor {
    /// 默认并发上限
    pub const DEFAULT_MAX_CONCURRENCY: usize = 5;

    /// 创建执行器；并发上限为 0 时按 1 处理
    pub fn new(max_concurrency: usize) -> Self {
        let max_concurrency = if max_concurrency == 0 {
            warn!("并发上限为 0，按 1 处理");
            1
        } else {
            max_concurrency
        };

        Self { max_concurrency }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// 建立会话、执行全部任务、断开会话
    ///
    /// 连接失败时直接返回错误，不执行任何任务。
    pub async fn run(
        &self,
        operation: ResetOperation,
        adapter: Arc<dyn HypervisorAdapter>,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<ResetOperation> {
        if operation.start_time().is_some() {
            warn!("操作 {} 已执行过，不再重复执行", operation.operation_id());
            return Ok(operation);
        }

        info!("连接 {} 后端", adapter.kind());
        if let Err(e) = adapter.connect().await {
            error!("连接 {} 后端失败: {}", adapter.kind(), e);
            return Err(e.into());
        }

        let operation = self.execute(operation, Arc::clone(&adapter), on_progress).await;

        adapter.disconnect().await;

        Ok(operation)
    }

    /// 执行操作中的全部任务，所有任务进入终态后返回同一个操作
    ///
    /// 调用方需保证适配器已建立会话。已执行过的操作原样返回，不会再次调用后端。
    pub async fn execute(
        &self,
        mut operation: ResetOperation,
        adapter: Arc<dyn HypervisorAdapter>,
        on_progress: Option<&ProgressCallback>,
    ) -> ResetOperation {
        if operation.start_time.is_some() {
            warn!("操作 {} 已执行过，不再重复下发", operation.operation_id());
            return operation;
        }

        let total = operation.tasks.len();
        operation.start_time = Some(Utc::now());

        if total == 0 {
            info!("操作 {} 没有任务，直接结束", operation.operation_id());
            operation.end_time = operation.start_time;
            return operation;
        }

        info!(
            "开始执行操作 {}: {} 个任务，并发上限 {}",
            operation.operation_id(),
            total,
            self.max_concurrency
        );

        let mut in_flight: JoinSet<TaskOutcome> = JoinSet::new();
        let mut next = 0;

        loop {
            // 按任务顺序补满空闲槽位，只下发 Pending 任务
            while in_flight.len() < self.max_concurrency && next < total {
                let index = next;
                next += 1;

                let task = &mut operation.tasks[index];
                if !task.mark_running() {
                    continue;
                }
                debug!("下发任务 {}/{}: {}", index + 1, total, task.vm_name());

                in_flight.spawn(run_task(
                    index,
                    Arc::clone(&adapter),
                    task.vm_name().to_string(),
                    task.action(),
                    task.snapshot_name().map(str::to_string),
                ));
            }

            let Some(joined) = in_flight.join_next().await else {
                break;
            };

            match joined {
                Ok(outcome) => {
                    let task = &mut operation.tasks[outcome.index];
                    match &outcome.result {
                        Ok(()) => info!("✓ {} 重置完成", task.vm_name()),
                        Err(e) => error!("✗ {} 重置失败: {}", task.vm_name(), e),
                    }
                    task.finish(outcome.result);

                    if let Some(callback) = on_progress {
                        callback(&operation);
                    }
                }
                Err(e) => {
                    // 任务在 catch_unwind 之外中止，无法定位下标，循环结束后统一收尾
                    error!("后台任务异常退出: {}", e);
                }
            }
        }

        let orphaned: Vec<usize> = operation
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, task)| task.status() == TaskStatus::Running)
            .map(|(index, _)| index)
            .collect();
        for index in orphaned {
            operation.tasks[index].finish(Err("任务意外中止".to_string()));
            if let Some(callback) = on_progress {
                callback(&operation);
            }
        }

        operation.end_time = Some(Utc::now());

        info!(
            "操作 {} 结束: 状态 {}, 完成 {}, 失败 {}",
            operation.operation_id(),
            operation.status(),
            operation.completed_count(),
            operation.failed_count()
        );

        operation
    }
}

async fn run_task(
    index: usize,
    adapter: Arc<dyn HypervisorAdapter>,
    vm_name: String,
    action: ResetAction,
    snapshot_name: Option<String>,
) -> TaskOutcome {
    let call = async {
        match action {
            ResetAction::SnapshotRevert => {
                let snapshot = snapshot_name.as_deref().unwrap_or_default();
                adapter.revert_snapshot(&vm_name, snapshot).await
            }
            ResetAction::PowerCycle => adapter.power_cycle(&vm_name).await,
        }
    };

    let result = match AssertUnwindSafe(call).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(panic) => Err(format!("任务执行异常: {}", panic_message(&*panic))),
    };

    TaskOutcome { index, result }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "未知 panic".to_string()
    }
}
