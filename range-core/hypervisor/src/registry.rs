//! 适配器注册表

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::BackendConfig;
use crate::error::{HypervisorError, Result};
use crate::proxmox::ProxmoxBuilder;
use crate::simulation::SimulationBuilder;
use crate::traits::{AdapterBuilder, BackendKind, HypervisorAdapter};
use crate::vsphere::VsphereBuilder;

/// 适配器注册表
///
/// 按后端类型保存构建器。启动时根据配置解析一次，之后不再按调用分派。
pub struct AdapterRegistry {
    /// 构建器映射
    builders: HashMap<BackendKind, Box<dyn AdapterBuilder>>,
}

impl AdapterRegistry {
    /// 创建空的注册表
    pub fn new() -> Self {
        Self {
            builders: HashMap::new(),
        }
    }

    /// 创建包含全部内置后端的注册表
    pub fn with_defaults() -> Self {
        let mut builders: HashMap<BackendKind, Box<dyn AdapterBuilder>> = HashMap::new();
        builders.insert(BackendKind::Vsphere, Box::new(VsphereBuilder));
        builders.insert(BackendKind::Proxmox, Box::new(ProxmoxBuilder));
        builders.insert(BackendKind::Simulation, Box::new(SimulationBuilder));
        Self { builders }
    }

    /// 注册构建器
    pub fn register(&mut self, builder: Box<dyn AdapterBuilder>) -> Result<()> {
        let kind = builder.kind();
        info!("注册虚拟化后端: {}", kind);

        if self.builders.contains_key(&kind) {
            return Err(HypervisorError::BackendAlreadyRegistered(kind));
        }

        self.builders.insert(kind, builder);
        Ok(())
    }

    /// 根据配置构建适配器
    pub fn build(&self, config: &BackendConfig) -> Result<Arc<dyn HypervisorAdapter>> {
        let kind = config.kind();
        debug!("构建虚拟化适配器: {}", kind);

        let builder = self
            .builders
            .get(&kind)
            .ok_or(HypervisorError::BackendNotRegistered(kind))?;

        builder.build(config)
    }

    /// 列出所有已注册的后端
    pub fn list(&self) -> Vec<BackendKind> {
        self.builders.keys().copied().collect()
    }

    /// 检查后端是否已注册
    pub fn is_registered(&self, kind: BackendKind) -> bool {
        self.builders.contains_key(&kind)
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
