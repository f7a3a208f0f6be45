//! Proxmox VE 适配器
//!
//! 通过 `/api2/json` REST API 操作 QEMU 虚拟机。快照列表是带 `parent`
//! 的扁平结构，先构建为快照树再查找。回滚、重置、开机都会返回 UPID，
//! 需要轮询任务状态直到结束。

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::{BackendConfig, ProxmoxConfig, TimeoutConfig};
use crate::error::{ConnectError, HypervisorError, OperationError, Result};
use crate::snapshot::{build_tree, find_snapshot, SnapshotNode};
use crate::traits::{AdapterBuilder, BackendKind, HypervisorAdapter};

/// 快照列表里代表“当前状态”的伪条目
const CURRENT_SNAPSHOT: &str = "current";

/// Proxmox API 统一外层
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct NodeEntry {
    node: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct QemuEntry {
    vmid: u64,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SnapshotEntry {
    name: String,
    #[serde(default)]
    parent: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VmStatus {
    status: String,
}

#[derive(Debug, Deserialize)]
struct TaskStatus {
    status: String,
    #[serde(default)]
    exitstatus: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TicketData {
    ticket: String,
    #[serde(rename = "CSRFPreventionToken")]
    csrf_prevention_token: String,
}

/// 已建立的认证方式
#[derive(Debug, Clone)]
enum ProxmoxSession {
    /// API Token，直接放在 Authorization 头
    Token(String),

    /// 票据 + CSRF 令牌
    Ticket { ticket: String, csrf: String },
}

impl ProxmoxSession {
    fn apply(&self, request: RequestBuilder, method: &Method) -> RequestBuilder {
        match self {
            Self::Token(header) => request.header("Authorization", header),
            Self::Ticket { ticket, csrf } => {
                let request = request.header("Cookie", format!("PVEAuthCookie={}", ticket));
                if *method == Method::GET {
                    request
                } else {
                    request.header("CSRFPreventionToken", csrf)
                }
            }
        }
    }
}

/// 虚拟机定位结果
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct VmLocation {
    node: String,
    vmid: u64,
}

/// 在节点的虚拟机列表中按名称或 VMID 匹配
pub(crate) fn match_vm(entries: &[QemuEntry], vm_name: &str) -> Option<u64> {
    entries
        .iter()
        .find(|vm| vm.vmid.to_string() == vm_name || vm.name.as_deref() == Some(vm_name))
        .map(|vm| vm.vmid)
}

/// 由扁平快照列表构建快照森林，忽略 `current` 伪条目
pub(crate) fn snapshot_forest(entries: &[SnapshotEntry]) -> Vec<SnapshotNode<String>> {
    let flat: Vec<(String, Option<String>, String)> = entries
        .iter()
        .filter(|entry| entry.name != CURRENT_SNAPSHOT)
        .map(|entry| (entry.name.clone(), entry.parent.clone(), entry.name.clone()))
        .collect();
    build_tree(&flat)
}

/// Proxmox 适配器
pub struct ProxmoxAdapter {
    /// API 基础 URL
    base_url: String,

    /// HTTP 客户端
    http_client: Client,

    /// 认证会话
    session: Arc<RwLock<Option<ProxmoxSession>>>,

    /// 配置
    config: ProxmoxConfig,
}

impl ProxmoxAdapter {
    /// 创建新的 Proxmox 适配器（不建立连接）
    pub fn new(config: ProxmoxConfig) -> Result<Self> {
        let http_client = config.timeouts.http_client(config.verify_ssl)?;

        Ok(Self {
            base_url: config.base_url(),
            http_client,
            session: Arc::new(RwLock::new(None)),
            config,
        })
    }

    fn timeouts(&self) -> &TimeoutConfig {
        &self.config.timeouts
    }

    /// 当前认证信息；读锁在返回前释放，不会跨越网络请求
    async fn current_session(&self) -> std::result::Result<ProxmoxSession, OperationError> {
        self.session
            .read()
            .await
            .clone()
            .ok_or(OperationError::NotConnected)
    }

    /// 发送带认证的请求并解包 `data`
    async fn request<R: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
    ) -> std::result::Result<R, OperationError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Proxmox API 请求: {} {}", method, url);

        let session = self.current_session().await?;

        let request = session.apply(self.http_client.request(method.clone(), &url), &method);
        let response = request
            .send()
            .await
            .map_err(|e| OperationError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "无法读取错误响应".to_string());
            warn!("Proxmox API 请求失败: {} - {}", status, error_text);
            return Err(OperationError::Api(status.as_u16(), error_text));
        }

        let body: ApiResponse<R> = response
            .json()
            .await
            .map_err(|e| OperationError::Parse(e.to_string()))?;
        Ok(body.data)
    }

    /// 在所有（或配置指定的）节点上按名称或 VMID 查找虚拟机
    async fn find_vm(&self, vm_name: &str) -> std::result::Result<VmLocation, OperationError> {
        let nodes: Vec<NodeEntry> = self.request(Method::GET, "/nodes").await?;

        for node in nodes {
            if let Some(pinned) = &self.config.node {
                if &node.node != pinned {
                    continue;
                }
            }

            let vms: Vec<QemuEntry> = self
                .request(Method::GET, &format!("/nodes/{}/qemu", node.node))
                .await?;

            if let Some(vmid) = match_vm(&vms, vm_name) {
                return Ok(VmLocation {
                    node: node.node,
                    vmid,
                });
            }
        }

        Err(OperationError::VmNotFound(vm_name.to_string()))
    }

    /// 轮询 UPID 任务直到停止
    async fn wait_for_task(
        &self,
        node: &str,
        upid: &str,
    ) -> std::result::Result<(), OperationError> {
        let path = format!("/nodes/{}/tasks/{}/status", node, urlencoding::encode(upid));
        let started = Instant::now();

        loop {
            let task: TaskStatus = self.request(Method::GET, &path).await?;
            if task.status == "stopped" {
                return task_exit_result(upid, task.exitstatus.as_deref());
            }

            if started.elapsed() >= self.timeouts().task_timeout() {
                return Err(OperationError::BackendTaskFailed(format!(
                    "等待任务 {} 超时",
                    upid
                )));
            }
            tokio::time::sleep(self.timeouts().task_poll_interval()).await;
        }
    }

    fn vm_path(location: &VmLocation, suffix: &str) -> String {
        format!("/nodes/{}/qemu/{}{}", location.node, location.vmid, suffix)
    }
}

#[async_trait]
impl HypervisorAdapter for ProxmoxAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Proxmox
    }

    async fn connect(&self) -> std::result::Result<(), ConnectError> {
        if self.config.user.is_empty() {
            return Err(ConnectError::MissingCredentials("Proxmox 用户名为空".to_string()));
        }

        info!("连接 Proxmox: {}", self.config.host);

        let session = match (&self.config.token_name, &self.config.token_value) {
            (Some(name), Some(value)) => {
                let header = format!("PVEAPIToken={}!{}={}", self.config.user, name, value);

                // Token 无需登录，用一次轻量请求校验
                let response = self
                    .http_client
                    .get(format!("{}/version", self.base_url))
                    .header("Authorization", &header)
                    .send()
                    .await
                    .map_err(|e| ConnectError::Http(e.to_string()))?;

                if !response.status().is_success() {
                    return Err(ConnectError::AuthFailed(format!(
                        "API Token 校验失败: {}",
                        response.status()
                    )));
                }
                ProxmoxSession::Token(header)
            }
            _ => {
                let password = self.config.password.as_deref().ok_or_else(|| {
                    ConnectError::MissingCredentials("未配置 API Token 或密码".to_string())
                })?;

                let response = self
                    .http_client
                    .post(format!("{}/access/ticket", self.base_url))
                    .form(&[("username", self.config.user.as_str()), ("password", password)])
                    .send()
                    .await
                    .map_err(|e| ConnectError::Http(e.to_string()))?;

                let status = response.status();
                if !status.is_success() {
                    let error_text = response.text().await.unwrap_or_default();
                    return Err(ConnectError::AuthFailed(format!("{} - {}", status, error_text)));
                }

                let body: ApiResponse<TicketData> = response
                    .json()
                    .await
                    .map_err(|e| ConnectError::Parse(e.to_string()))?;

                ProxmoxSession::Ticket {
                    ticket: body.data.ticket,
                    csrf: body.data.csrf_prevention_token,
                }
            }
        };

        *self.session.write().await = Some(session);

        info!("已连接 Proxmox: {}", self.config.host);
        Ok(())
    }

    async fn disconnect(&self) {
        // Proxmox 票据无注销接口，丢弃本地会话即可
        if self.session.write().await.take().is_some() {
            info!("已断开 Proxmox: {}", self.config.host);
        }
    }

    async fn revert_snapshot(
        &self,
        vm_name: &str,
        snapshot_name: &str,
    ) -> std::result::Result<(), OperationError> {
        let location = self.find_vm(vm_name).await?;

        let entries: Vec<SnapshotEntry> = self
            .request(Method::GET, &Self::vm_path(&location, "/snapshot"))
            .await?;
        let forest = snapshot_forest(&entries);

        let snapshot = find_snapshot(&forest, snapshot_name).ok_or_else(|| {
            OperationError::SnapshotNotFound {
                vm: vm_name.to_string(),
                snapshot: snapshot_name.to_string(),
            }
        })?;

        let upid: String = self
            .request(
                Method::POST,
                &Self::vm_path(
                    &location,
                    &format!("/snapshot/{}/rollback", urlencoding::encode(&snapshot.reference)),
                ),
            )
            .await?;
        self.wait_for_task(&location.node, &upid).await?;

        info!("已将 {} 恢复到快照 {}", vm_name, snapshot_name);
        Ok(())
    }

    async fn power_cycle(&self, vm_name: &str) -> std::result::Result<(), OperationError> {
        let location = self.find_vm(vm_name).await?;

        let current: VmStatus = self
            .request(Method::GET, &Self::vm_path(&location, "/status/current"))
            .await?;

        let action = if current.status == "running" { "reset" } else { "start" };
        let upid: String = self
            .request(
                Method::POST,
                &Self::vm_path(&location, &format!("/status/{}", action)),
            )
            .await?;
        self.wait_for_task(&location.node, &upid).await?;

        info!("已电源循环 {} ({})", vm_name, action);
        Ok(())
    }
}

/// Proxmox 适配器构建器
pub struct ProxmoxBuilder;

impl AdapterBuilder for ProxmoxBuilder {
    fn build(&self, config: &BackendConfig) -> Result<Arc<dyn HypervisorAdapter>> {
        match config {
            BackendConfig::Proxmox(pve) => Ok(Arc::new(ProxmoxAdapter::new(pve.clone())?)),
            other => Err(HypervisorError::Config(format!(
                "Proxmox 构建器收到了 {} 配置",
                other.kind()
            ))),
        }
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Proxmox
    }
}

/// 解析已停止任务的退出状态；`WARNINGS: n` 表示任务成功但有告警
fn task_exit_result(
    upid: &str,
    exitstatus: Option<&str>,
) -> std::result::Result<(), OperationError> {
    match exitstatus {
        Some("OK") => Ok(()),
        Some(exit) if exit.starts_with("WARNINGS:") => {
            warn!("Proxmox 任务 {} 完成但有告警: {}", upid, exit);
            Ok(())
        }
        Some(exit) => Err(OperationError::BackendTaskFailed(format!("{}: {}", upid, exit))),
        None => Err(OperationError::BackendTaskFailed(format!("{}: 无退出状态", upid))),
    }
}
