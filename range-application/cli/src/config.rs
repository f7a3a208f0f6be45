//! 靶场配置
//!
//! 配置文件路径由 `--config` 显式传入，按扩展名选择解析器
//! （`.yaml`/`.yml`、`.toml`、`.json`），之后用环境变量覆盖地址和凭据。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

use range_hypervisor::{BackendConfig, SimulationConfig};
use range_orchestrator::{RangeTopology, ResetExecutor};

/// 靶场配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RangeConfig {
    /// 虚拟化平台（dry-run 时不需要）
    #[serde(default)]
    pub platform: Option<BackendConfig>,

    /// 模拟后端
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// 执行参数
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// 区域 → 虚拟机（有序）
    #[serde(default)]
    pub zones: RangeTopology,
}

/// 执行参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// 最大并发数
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_max_concurrency() -> usize {
    ResetExecutor::DEFAULT_MAX_CONCURRENCY
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl RangeConfig {
    /// 加载配置文件并应用环境变量覆盖
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_vars();
        Ok(config)
    }

    /// 从指定文件加载配置
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {:?}", path))?;

        let config = match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
                .with_context(|| format!("解析 YAML 配置失败: {:?}", path))?,
            Some("toml") => toml::from_str(&content)
                .with_context(|| format!("解析 TOML 配置失败: {:?}", path))?,
            Some("json") => serde_json::from_str(&content)
                .with_context(|| format!("解析 JSON 配置失败: {:?}", path))?,
            _ => anyhow::bail!("不支持的配置文件格式: {:?}", path),
        };

        tracing::debug!("已加载配置文件: {:?}", path);

        Ok(config)
    }

    /// 从环境变量覆盖平台地址和凭据
    pub fn apply_env_vars(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some(platform) = self.platform.as_mut() else {
            return;
        };

        match platform {
            BackendConfig::Vsphere(vsphere) => {
                if let Some(host) = lookup("RANGE_PLATFORM_HOST") {
                    vsphere.host = host;
                }
                if let Some(user) = lookup("RANGE_PLATFORM_USER") {
                    vsphere.user = user;
                }
                if let Some(password) = lookup("RANGE_PLATFORM_PASSWORD") {
                    vsphere.password = password;
                }
            }
            BackendConfig::Proxmox(proxmox) => {
                if let Some(host) = lookup("RANGE_PLATFORM_HOST") {
                    proxmox.host = host;
                }
                if let Some(user) = lookup("RANGE_PLATFORM_USER") {
                    proxmox.user = user;
                }
                if let Some(password) = lookup("RANGE_PLATFORM_PASSWORD") {
                    proxmox.password = Some(password);
                }
                if let Some(name) = lookup("RANGE_PLATFORM_TOKEN_NAME") {
                    proxmox.token_name = Some(name);
                }
                if let Some(value) = lookup("RANGE_PLATFORM_TOKEN_VALUE") {
                    proxmox.token_value = Some(value);
                }
            }
            BackendConfig::Simulation(_) => {}
        }
    }

    /// 本次运行使用的后端配置；dry-run 总是使用模拟后端
    pub fn backend_config(&self, dry_run: bool) -> Result<BackendConfig> {
        if dry_run {
            return Ok(BackendConfig::Simulation(self.simulation.clone()));
        }

        self.platform
            .clone()
            .context("配置文件缺少 platform 段，真实执行需要指定虚拟化平台（或使用 --dry-run）")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use range_hypervisor::BackendKind;
    use std::collections::HashMap;
    use std::io::Write;

    const YAML: &str = r#"
platform:
  type: vmware
  host: vcenter.range.local
  user: administrator@vsphere.local
  password: from-file
simulation:
  delay_ms: 50
execution:
  max_concurrency: 8
zones:
  red:
    vms:
      - name: kali01
  blue:
    vms:
      - name: dc01-t1
        team: 1
"#;

    fn write_config(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_yaml() {
        let file = write_config(".yaml", YAML);
        let config = RangeConfig::load_from_file(file.path()).unwrap();

        assert_eq!(config.execution.max_concurrency, 8);
        assert_eq!(config.simulation.delay_ms, 50);
        assert_eq!(config.platform.as_ref().unwrap().kind(), BackendKind::Vsphere);

        let zones: Vec<_> = config.zones.zones().iter().map(|z| z.name.as_str()).collect();
        assert_eq!(zones, vec!["red", "blue"]);
    }

    #[test]
    fn test_load_toml() {
        let toml = r#"
[platform]
type = "proxmox"
host = "pve01.range.local"
user = "root@pam"
node = "pve01"

[[zones.blue.vms]]
name = "dc01-t1"
team = 1

[[zones.blue.vms]]
name = "ws01-t1"
team = 1
"#;
        let file = write_config(".toml", toml);
        let config = RangeConfig::load_from_file(file.path()).unwrap();

        assert_eq!(config.execution.max_concurrency, 5);
        assert_eq!(config.zones.vm_count(), 2);
        match config.platform.unwrap() {
            BackendConfig::Proxmox(proxmox) => {
                assert_eq!(proxmox.node.as_deref(), Some("pve01"));
                assert_eq!(proxmox.port, 8006);
            }
            other => panic!("unexpected platform: {:?}", other),
        }
    }

    #[test]
    fn test_load_json_without_platform() {
        let json = r#"{"zones": {"lab": {"vms": [{"name": "vm01"}]}}}"#;
        let file = write_config(".json", json);
        let config = RangeConfig::load_from_file(file.path()).unwrap();

        assert!(config.platform.is_none());
        assert!(config.backend_config(false).is_err());
        assert_eq!(
            config.backend_config(true).unwrap().kind(),
            BackendKind::Simulation
        );
    }

    #[test]
    fn test_unsupported_extension() {
        let file = write_config(".ini", "zones = {}");
        assert!(RangeConfig::load_from_file(file.path()).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let file = write_config(".yml", YAML);
        let mut config = RangeConfig::load_from_file(file.path()).unwrap();

        let vars: HashMap<&str, &str> = [
            ("RANGE_PLATFORM_HOST", "vcenter-b.range.local"),
            ("RANGE_PLATFORM_PASSWORD", "from-env"),
        ]
        .into_iter()
        .collect();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        match config.platform.unwrap() {
            BackendConfig::Vsphere(vsphere) => {
                assert_eq!(vsphere.host, "vcenter-b.range.local");
                assert_eq!(vsphere.password, "from-env");
                assert_eq!(vsphere.user, "administrator@vsphere.local");
            }
            other => panic!("unexpected platform: {:?}", other),
        }
    }

    #[test]
    fn test_env_overrides_proxmox_token() {
        let mut config = RangeConfig {
            platform: Some(
                serde_json::from_value(serde_json::json!({
                    "type": "proxmox",
                    "host": "pve01",
                    "user": "root@pam",
                }))
                .unwrap(),
            ),
            ..RangeConfig::default()
        };

        config.apply_overrides(|key| match key {
            "RANGE_PLATFORM_TOKEN_NAME" => Some("reset".to_string()),
            "RANGE_PLATFORM_TOKEN_VALUE" => Some("secret".to_string()),
            _ => None,
        });

        match config.platform.unwrap() {
            BackendConfig::Proxmox(proxmox) => {
                assert_eq!(proxmox.token_name.as_deref(), Some("reset"));
                assert_eq!(proxmox.token_value.as_deref(), Some("secret"));
                assert!(proxmox.password.is_none());
            }
            other => panic!("unexpected platform: {:?}", other),
        }
    }
}
