//! 靶场虚拟化适配层
//!
//! 为重置编排器提供统一的后端抽象：建立会话、恢复快照、电源循环、断开会话。
//!
//! # 后端
//!
//! - **vSphere** (`VsphereAdapter`): vCenter Automation REST + VI/JSON
//! - **Proxmox** (`ProxmoxAdapter`): Proxmox VE `/api2/json`
//! - **模拟** (`SimulationAdapter`): 演练用，不产生任何副作用
//!
//! # 示例
//!
//! ```ignore
//! use range_hypervisor::{AdapterRegistry, BackendConfig, SimulationConfig};
//!
//! let registry = AdapterRegistry::with_defaults();
//! let adapter = registry.build(&BackendConfig::Simulation(SimulationConfig::default()))?;
//!
//! adapter.connect().await?;
//! adapter.revert_snapshot("dc01-t1", "pre-exercise").await?;
//! adapter.disconnect().await;
//! ```

pub mod config;
pub mod error;
pub mod proxmox;
pub mod registry;
pub mod simulation;
pub mod snapshot;
pub mod traits;
pub mod vsphere;

pub use config::{BackendConfig, ProxmoxConfig, SimulationConfig, TimeoutConfig, VsphereConfig};
pub use error::{ConnectError, HypervisorError, OperationError, Result};
pub use proxmox::ProxmoxAdapter;
pub use registry::AdapterRegistry;
pub use simulation::SimulationAdapter;
pub use snapshot::{find_snapshot, SnapshotNode};
pub use traits::{AdapterBuilder, BackendKind, HypervisorAdapter};
pub use vsphere::VsphereAdapter;
