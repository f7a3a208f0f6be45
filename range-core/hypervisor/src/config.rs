//! 后端连接配置

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::HypervisorError;
use crate::traits::BackendKind;

/// 后端配置，按 `type` 字段区分
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    /// VMware vSphere (vCenter)
    #[serde(rename = "vmware")]
    Vsphere(VsphereConfig),

    /// Proxmox VE
    Proxmox(ProxmoxConfig),

    /// 模拟后端
    Simulation(SimulationConfig),
}

impl BackendConfig {
    /// 对应的后端类型
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Vsphere(_) => BackendKind::Vsphere,
            Self::Proxmox(_) => BackendKind::Proxmox,
            Self::Simulation(_) => BackendKind::Simulation,
        }
    }
}

/// vCenter 连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VsphereConfig {
    /// vCenter 地址
    pub host: String,

    /// HTTPS 端口
    #[serde(default = "default_vsphere_port")]
    pub port: u16,

    /// 用户名
    #[serde(default)]
    pub user: String,

    /// 密码
    #[serde(default)]
    pub password: String,

    /// VI/JSON API 版本
    #[serde(default = "default_vsphere_release")]
    pub api_release: String,

    /// 是否验证 SSL 证书
    #[serde(default)]
    pub verify_ssl: bool,

    /// 超时配置
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

impl VsphereConfig {
    pub fn base_url(&self) -> String {
        format!("https://{}:{}", self.host, self.port)
    }
}

/// Proxmox VE 连接配置
///
/// 优先使用 API Token；未配置 Token 时使用用户名密码换取票据。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxmoxConfig {
    /// Proxmox 地址
    pub host: String,

    /// API 端口
    #[serde(default = "default_proxmox_port")]
    pub port: u16,

    /// 用户名（含 realm，如 root@pam）
    #[serde(default)]
    pub user: String,

    /// 密码
    #[serde(default)]
    pub password: Option<String>,

    /// API Token 名称
    #[serde(default)]
    pub token_name: Option<String>,

    /// API Token 值
    #[serde(default)]
    pub token_value: Option<String>,

    /// 只在指定节点上查找虚拟机
    #[serde(default)]
    pub node: Option<String>,

    /// 是否验证 SSL 证书
    #[serde(default)]
    pub verify_ssl: bool,

    /// 超时配置
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

impl ProxmoxConfig {
    pub fn base_url(&self) -> String {
        format!("https://{}:{}/api2/json", self.host, self.port)
    }
}

/// 模拟后端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// 每次操作的模拟耗时（毫秒）
    #[serde(default = "default_simulation_delay_ms")]
    pub delay_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_simulation_delay_ms(),
        }
    }
}

impl SimulationConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// 超时配置
///
/// 编排层本身不设超时，单次调用的上限由这里决定。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// 连接超时（秒）
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// 请求超时（秒）
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    /// 远程任务轮询间隔（毫秒）
    #[serde(default = "default_task_poll_interval_ms")]
    pub task_poll_interval_ms: u64,

    /// 远程任务最长等待时间（秒）
    #[serde(default = "default_task_timeout")]
    pub task_timeout: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout(),
            task_poll_interval_ms: default_task_poll_interval_ms(),
            task_timeout: default_task_timeout(),
        }
    }
}

impl TimeoutConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn task_poll_interval(&self) -> Duration {
        Duration::from_millis(self.task_poll_interval_ms)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout)
    }

    /// 按超时配置创建 HTTP 客户端
    pub(crate) fn http_client(&self, verify_ssl: bool) -> Result<reqwest::Client, HypervisorError> {
        reqwest::Client::builder()
            .timeout(self.request_timeout())
            .connect_timeout(self.connect_timeout())
            .danger_accept_invalid_certs(!verify_ssl)
            .build()
            .map_err(|e| HypervisorError::Config(format!("创建 HTTP 客户端失败: {}", e)))
    }
}

// 默认值函数
fn default_vsphere_port() -> u16 {
    443
}

fn default_vsphere_release() -> String {
    "8.0.1.0".to_string()
}

fn default_proxmox_port() -> u16 {
    8006
}

fn default_simulation_delay_ms() -> u64 {
    500
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    30
}

fn default_task_poll_interval_ms() -> u64 {
    1000
}

fn default_task_timeout() -> u64 {
    600
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_config_tagged_by_type() {
        let config: BackendConfig = serde_json::from_value(serde_json::json!({
            "type": "vmware",
            "host": "vcenter.range.local",
            "user": "admin",
            "password": "x",
        }))
        .unwrap();

        assert_eq!(config.kind(), BackendKind::Vsphere);
        match config {
            BackendConfig::Vsphere(vs) => {
                assert_eq!(vs.port, 443);
                assert_eq!(vs.api_release, "8.0.1.0");
                assert!(!vs.verify_ssl);
                assert_eq!(vs.base_url(), "https://vcenter.range.local:443");
            }
            other => panic!("unexpected config: {:?}", other),
        }
    }

    #[test]
    fn test_proxmox_defaults() {
        let config: BackendConfig =
            serde_json::from_str(r#"{"type": "proxmox", "host": "pve01"}"#).unwrap();

        match config {
            BackendConfig::Proxmox(pve) => {
                assert_eq!(pve.port, 8006);
                assert!(pve.token_name.is_none());
                assert_eq!(pve.base_url(), "https://pve01:8006/api2/json");
                assert_eq!(pve.timeouts.task_timeout(), Duration::from_secs(600));
            }
            other => panic!("unexpected config: {:?}", other),
        }
    }

    #[test]
    fn test_simulation_delay() {
        let config = SimulationConfig { delay_ms: 250 };
        assert_eq!(config.delay(), Duration::from_millis(250));
        assert_eq!(SimulationConfig::default().delay_ms, 500);
    }
}
