//! 靶场拓扑
//!
//! 区域名 → 区域定义的有序映射。配置文件中的书写顺序就是枚举顺序，
//! 任务列表的顺序由它决定，因此反序列化时必须保序。

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// 虚拟机描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmDescriptor {
    /// 虚拟机名称
    pub name: String,

    /// 所属队伍（可选）
    pub team: Option<u32>,

    /// 所属区域
    pub zone: String,
}

/// 区域定义
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneDefinition {
    /// 区域名称
    pub name: String,

    /// 区域内虚拟机（有序）
    pub vms: Vec<VmDescriptor>,
}

/// 靶场拓扑（只读输入）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeTopology {
    zones: Vec<ZoneDefinition>,
}

impl RangeTopology {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个区域；`vms` 为 `(名称, 队伍)` 列表
    pub fn with_zone<N, I, V>(mut self, name: N, vms: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = (V, Option<u32>)>,
        V: Into<String>,
    {
        let zone = name.into();
        let vms = vms
            .into_iter()
            .map(|(vm, team)| VmDescriptor {
                name: vm.into(),
                team,
                zone: zone.clone(),
            })
            .collect();
        self.zones.push(ZoneDefinition { name: zone, vms });
        self
    }

    /// 按枚举顺序返回所有区域
    pub fn zones(&self) -> &[ZoneDefinition] {
        &self.zones
    }

    /// 查找区域
    pub fn zone(&self, name: &str) -> Option<&ZoneDefinition> {
        self.zones.iter().find(|zone| zone.name == name)
    }

    /// 按枚举顺序遍历所有虚拟机
    pub fn vms(&self) -> impl Iterator<Item = &VmDescriptor> {
        self.zones.iter().flat_map(|zone| zone.vms.iter())
    }

    /// 虚拟机总数
    pub fn vm_count(&self) -> usize {
        self.zones.iter().map(|zone| zone.vms.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.vm_count() == 0
    }
}

/// 配置文件中的虚拟机条目（区域由外层键决定）
#[derive(Debug, Clone, Serialize, Deserialize)]
struct VmEntry {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    team: Option<u32>,
}

/// 配置文件中的区域条目
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ZoneEntry {
    #[serde(default)]
    vms: Vec<VmEntry>,
}

impl<'de> Deserialize<'de> for RangeTopology {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ZonesVisitor;

        impl<'de> Visitor<'de> for ZonesVisitor {
            type Value = RangeTopology;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("区域名到区域定义的映射")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut topology = RangeTopology::new();
                while let Some((name, entry)) = map.next_entry::<String, ZoneEntry>()? {
                    topology = topology.with_zone(
                        name,
                        entry.vms.into_iter().map(|vm| (vm.name, vm.team)),
                    );
                }
                Ok(topology)
            }
        }

        deserializer.deserialize_map(ZonesVisitor)
    }
}

impl Serialize for RangeTopology {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.zones.len()))?;
        for zone in &self.zones {
            let entry = ZoneEntry {
                vms: zone
                    .vms
                    .iter()
                    .map(|vm| VmEntry {
                        name: vm.name.clone(),
                        team: vm.team,
                    })
                    .collect(),
            };
            map.serialize_entry(&zone.name, &entry)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_preserves_zone_order() {
        let yaml = r#"
red:
  vms:
    - name: kali01
    - name: c2-01
blue:
  vms:
    - name: dc01-t1
      team: 1
    - name: ws01-t1
      team: 1
dmz:
  vms: []
"#;
        let topology: RangeTopology = serde_yaml::from_str(yaml).unwrap();

        let zones: Vec<_> = topology.zones().iter().map(|z| z.name.as_str()).collect();
        assert_eq!(zones, vec!["red", "blue", "dmz"]);
        assert_eq!(topology.vm_count(), 4);

        let dc = topology.vms().find(|vm| vm.name == "dc01-t1").unwrap();
        assert_eq!(dc.zone, "blue");
        assert_eq!(dc.team, Some(1));

        let kali = topology.vms().next().unwrap();
        assert_eq!(kali.name, "kali01");
        assert_eq!(kali.team, None);
    }

    #[test]
    fn test_zone_without_vms_key() {
        let topology: RangeTopology = serde_json::from_str(r#"{"lab": {}}"#).unwrap();
        assert_eq!(topology.zones().len(), 1);
        assert!(topology.is_empty());
    }

    #[test]
    fn test_serialize_round_trips_order() {
        let topology = RangeTopology::new()
            .with_zone("zeta", vec![("z1", None)])
            .with_zone("alpha", vec![("a1", Some(2))]);

        let json = serde_json::to_string(&topology).unwrap();
        assert!(json.find("zeta").unwrap() < json.find("alpha").unwrap());

        let parsed: RangeTopology = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, topology);
    }

    #[test]
    fn test_zone_lookup() {
        let topology = RangeTopology::new().with_zone("blue", vec![("dc01", Some(1))]);
        assert!(topology.zone("blue").is_some());
        assert!(topology.zone("red").is_none());
    }
}
