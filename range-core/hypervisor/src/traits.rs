//! 虚拟化适配器抽象接口

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::BackendConfig;
use crate::error::{ConnectError, OperationError, Result};

/// 后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// VMware vSphere
    #[serde(rename = "vmware")]
    Vsphere,

    /// Proxmox VE
    Proxmox,

    /// 模拟后端（演练用，不产生副作用）
    Simulation,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vsphere => "vmware",
            Self::Proxmox => "proxmox",
            Self::Simulation => "simulation",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 虚拟化适配器 trait
///
/// 所有方法都可能阻塞数秒（远程调用）。会话句柄保存在实现内部，
/// 因此同一个适配器可以通过 `Arc` 被多个并发任务共享。
#[async_trait]
pub trait HypervisorAdapter: Send + Sync {
    /// 后端类型
    fn kind(&self) -> BackendKind;

    /// 建立会话，必须在任何变更操作之前调用一次
    async fn connect(&self) -> std::result::Result<(), ConnectError>;

    /// 断开会话
    ///
    /// 尽力而为：错误只记录日志，不返回给调用方。
    async fn disconnect(&self);

    /// 将虚拟机恢复到指定快照
    ///
    /// 快照按深度优先顺序在整个快照树中查找，第一个同名快照生效。
    async fn revert_snapshot(
        &self,
        vm_name: &str,
        snapshot_name: &str,
    ) -> std::result::Result<(), OperationError>;

    /// 电源循环：已开机则重置，否则开机
    async fn power_cycle(&self, vm_name: &str) -> std::result::Result<(), OperationError>;
}

/// 适配器构建器 trait
///
/// 注册表按 [`BackendKind`] 保存构建器，启动时解析一次。
pub trait AdapterBuilder: Send + Sync {
    /// 构建适配器实例
    fn build(&self, config: &BackendConfig) -> Result<Arc<dyn HypervisorAdapter>>;

    /// 获取后端类型
    fn kind(&self) -> BackendKind;
}
