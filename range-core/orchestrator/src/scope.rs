//! 范围解析
//!
//! 声明式范围 + 静态拓扑 → 有序的目标虚拟机列表。纯函数，不访问后端。

use serde::{Deserialize, Serialize};

use crate::operation::ResetScope;
use crate::topology::RangeTopology;
use crate::{OrchestratorError, Result};

/// 范围过滤参数
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vm: Option<String>,
}

impl ScopeFilter {
    pub fn zone(zone: impl Into<String>) -> Self {
        Self {
            zone: Some(zone.into()),
            ..Self::default()
        }
    }

    pub fn team(team: u32) -> Self {
        Self {
            team: Some(team),
            ..Self::default()
        }
    }

    pub fn vm(vm: impl Into<String>) -> Self {
        Self {
            vm: Some(vm.into()),
            ..Self::default()
        }
    }
}

/// 解析出的目标虚拟机
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedVm {
    pub vm_name: String,
    pub zone: String,
    pub team: Option<u32>,
}

/// 按范围解析拓扑，结果保持拓扑的枚举顺序
///
/// `Vm` 范围最多返回一项；找不到同名虚拟机时返回空列表而不是错误。
pub fn resolve(
    topology: &RangeTopology,
    scope: ResetScope,
    filter: &ScopeFilter,
) -> Result<Vec<ResolvedVm>> {
    let to_resolved = |vm: &crate::topology::VmDescriptor| ResolvedVm {
        vm_name: vm.name.clone(),
        zone: vm.zone.clone(),
        team: vm.team,
    };

    let targets: Vec<ResolvedVm> = match scope {
        ResetScope::Full => topology.vms().map(to_resolved).collect(),
        ResetScope::Zone => {
            let zone = filter
                .zone
                .as_deref()
                .ok_or_else(|| OrchestratorError::MissingScopeParameter("zone".to_string()))?;
            topology
                .vms()
                .filter(|vm| vm.zone == zone)
                .map(to_resolved)
                .collect()
        }
        ResetScope::Team => {
            let team = filter
                .team
                .ok_or_else(|| OrchestratorError::MissingScopeParameter("team".to_string()))?;
            topology
                .vms()
                .filter(|vm| vm.team == Some(team))
                .map(to_resolved)
                .collect()
        }
        ResetScope::Vm => {
            let name = filter
                .vm
                .as_deref()
                .ok_or_else(|| OrchestratorError::MissingScopeParameter("vm".to_string()))?;
            topology
                .vms()
                .find(|vm| vm.name == name)
                .map(to_resolved)
                .into_iter()
                .collect()
        }
    };

    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topology() -> RangeTopology {
        RangeTopology::new()
            .with_zone("red", vec![("kali01", None)])
            .with_zone(
                "blue",
                vec![("dc01-t1", Some(1)), ("ws01-t1", Some(1)), ("dc01-t2", Some(2))],
            )
            .with_zone("dmz", vec![("web01-t1", Some(1))])
    }

    fn names(targets: &[ResolvedVm]) -> Vec<&str> {
        targets.iter().map(|t| t.vm_name.as_str()).collect()
    }

    #[test]
    fn test_full_scope_keeps_enumeration_order() {
        let targets = resolve(&topology(), ResetScope::Full, &ScopeFilter::default()).unwrap();
        assert_eq!(
            names(&targets),
            vec!["kali01", "dc01-t1", "ws01-t1", "dc01-t2", "web01-t1"]
        );
    }

    #[test]
    fn test_team_scope_spans_zones() {
        let targets = resolve(&topology(), ResetScope::Team, &ScopeFilter::team(1)).unwrap();
        assert_eq!(names(&targets), vec!["dc01-t1", "ws01-t1", "web01-t1"]);
        assert!(targets.iter().all(|t| t.team == Some(1)));
    }

    #[test]
    fn test_zone_scope() {
        let targets = resolve(&topology(), ResetScope::Zone, &ScopeFilter::zone("red")).unwrap();
        assert_eq!(names(&targets), vec!["kali01"]);
        assert_eq!(targets[0].zone, "red");

        let targets = resolve(&topology(), ResetScope::Zone, &ScopeFilter::zone("grey")).unwrap();
        assert!(targets.is_empty());
    }

    #[test]
    fn test_vm_scope_at_most_one() {
        let targets = resolve(&topology(), ResetScope::Vm, &ScopeFilter::vm("dc01-t2")).unwrap();
        assert_eq!(names(&targets), vec!["dc01-t2"]);

        let targets = resolve(&topology(), ResetScope::Vm, &ScopeFilter::vm("ghost")).unwrap();
        assert!(targets.is_empty());
    }

    #[test]
    fn test_missing_filter() {
        let filter = ScopeFilter::default();
        for scope in [ResetScope::Zone, ResetScope::Team, ResetScope::Vm] {
            let err = resolve(&topology(), scope, &filter).unwrap_err();
            assert!(matches!(err, OrchestratorError::MissingScopeParameter(_)));
        }
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let topology = topology();
        let a = resolve(&topology, ResetScope::Team, &ScopeFilter::team(1)).unwrap();
        let b = resolve(&topology, ResetScope::Team, &ScopeFilter::team(1)).unwrap();
        assert_eq!(a, b);
    }
}
