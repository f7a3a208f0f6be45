//! CLI 命令处理模块

pub mod output;
pub mod plan;
pub mod reset;

use anyhow::{Context, Result};
use range_orchestrator::{PlanRequest, RangeTopology, ResetOperation, ResetPlanner};

use crate::config::RangeConfig;
use crate::TargetArgs;

/// 全部成功（或没有匹配的虚拟机）
pub const EXIT_SUCCESS: u8 = 0;

/// 有任务失败
pub const EXIT_FAILED: u8 = 1;

/// 配置、参数或连接错误
pub const EXIT_ERROR: u8 = 2;

/// 由命令行参数构造计划请求
pub fn plan_request(target: &TargetArgs) -> PlanRequest {
    PlanRequest {
        scope: target.level,
        action: target.action,
        snapshot_name: target.snapshot.clone(),
        filter: range_orchestrator::ScopeFilter {
            zone: target.zone.clone(),
            team: target.team,
            vm: target.vm.clone(),
        },
    }
}

/// 加载配置并生成计划
pub fn load_and_plan(target: &TargetArgs) -> Result<(RangeConfig, ResetOperation)> {
    let config = RangeConfig::load(&target.config)?;
    let operation = plan(&config.zones, target)?;
    Ok((config, operation))
}

fn plan(topology: &RangeTopology, target: &TargetArgs) -> Result<ResetOperation> {
    ResetPlanner::new(topology)
        .plan(&plan_request(target))
        .context("生成重置计划失败")
}

#[cfg(test)]
mod tests {
    use super::*;
    use range_orchestrator::{ResetAction, ResetScope, TaskStatus};
    use std::io::Write;
    use std::path::PathBuf;

    fn target(config: PathBuf, level: ResetScope) -> TargetArgs {
        TargetArgs {
            config,
            level,
            action: ResetAction::SnapshotRevert,
            snapshot: Some("pre-exercise".to_string()),
            zone: None,
            team: None,
            vm: None,
        }
    }

    fn config_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(
            br#"
zones:
  red:
    vms:
      - name: kali01
  blue:
    vms:
      - name: dc01-t1
        team: 1
      - name: ws01-t1
        team: 1
      - name: dc01-t2
        team: 2
"#,
        )
        .unwrap();
        file
    }

    #[test]
    fn test_load_and_plan_team() {
        let file = config_file();
        let mut args = target(file.path().to_path_buf(), ResetScope::Team);
        args.team = Some(1);

        let (_, operation) = load_and_plan(&args).unwrap();
        let names: Vec<_> = operation.tasks().iter().map(|t| t.vm_name()).collect();
        assert_eq!(names, vec!["dc01-t1", "ws01-t1"]);
        assert!(operation
            .tasks()
            .iter()
            .all(|t| t.status() == TaskStatus::Pending));
    }

    #[test]
    fn test_load_and_plan_rejects_missing_parameter() {
        let file = config_file();
        let args = target(file.path().to_path_buf(), ResetScope::Zone);

        let err = load_and_plan(&args).unwrap_err();
        assert!(format!("{:#}", err).contains("区域"));
    }

    #[test]
    fn test_plan_request_carries_filters() {
        let mut args = target(PathBuf::from("range.yaml"), ResetScope::Vm);
        args.vm = Some("dc01-t1".to_string());

        let request = plan_request(&args);
        assert_eq!(request.scope, ResetScope::Vm);
        assert_eq!(request.filter.vm.as_deref(), Some("dc01-t1"));
        assert_eq!(request.snapshot_name.as_deref(), Some("pre-exercise"));
    }
}
