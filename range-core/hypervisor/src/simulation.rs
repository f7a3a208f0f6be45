//! 模拟后端
//!
//! 不连接任何真实后端，用于演练（dry-run）。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::config::{BackendConfig, SimulationConfig};
use crate::error::{ConnectError, HypervisorError, OperationError, Result};
use crate::traits::{AdapterBuilder, BackendKind, HypervisorAdapter};

/// 模拟适配器：变更操作等待固定时长后总是成功
pub struct SimulationAdapter {
    delay: Duration,
}

impl SimulationAdapter {
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            delay: config.delay(),
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

#[async_trait]
impl HypervisorAdapter for SimulationAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Simulation
    }

    async fn connect(&self) -> std::result::Result<(), ConnectError> {
        info!("[模拟] 建立会话");
        Ok(())
    }

    async fn disconnect(&self) {
        info!("[模拟] 断开会话");
    }

    async fn revert_snapshot(
        &self,
        vm_name: &str,
        snapshot_name: &str,
    ) -> std::result::Result<(), OperationError> {
        tokio::time::sleep(self.delay).await;
        info!("[模拟] 将恢复 {} 到快照 {}", vm_name, snapshot_name);
        Ok(())
    }

    async fn power_cycle(&self, vm_name: &str) -> std::result::Result<(), OperationError> {
        tokio::time::sleep(self.delay).await;
        info!("[模拟] 将电源循环 {}", vm_name);
        Ok(())
    }
}

/// 模拟适配器构建器
pub struct SimulationBuilder;

impl AdapterBuilder for SimulationBuilder {
    fn build(&self, config: &BackendConfig) -> Result<Arc<dyn HypervisorAdapter>> {
        match config {
            BackendConfig::Simulation(sim) => Ok(Arc::new(SimulationAdapter::new(sim))),
            other => Err(HypervisorError::Config(format!(
                "模拟构建器收到了 {} 配置",
                other.kind()
            ))),
        }
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Simulation
    }
}
