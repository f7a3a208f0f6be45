//! VMware vSphere 适配器
//!
//! 会话与电源操作走 vSphere Automation REST API (`/api/...`)，
//! 快照树与快照恢复走 VI/JSON API (`/sdk/vim25/{release}/...`)，
//! 两者共用同一个 `vmware-api-session-id` 会话。

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::{BackendConfig, TimeoutConfig, VsphereConfig};
use crate::error::{ConnectError, HypervisorError, OperationError, Result};
use crate::snapshot::{find_snapshot, SnapshotNode};
use crate::traits::{AdapterBuilder, BackendKind, HypervisorAdapter};

const SESSION_HEADER: &str = "vmware-api-session-id";

/// `GET /api/vcenter/vm` 列表项
#[derive(Debug, Clone, Deserialize)]
struct VmSummary {
    vm: String,
    name: String,
}

/// `GET /api/vcenter/vm/{vm}/power`
#[derive(Debug, Clone, Deserialize)]
struct PowerInfo {
    state: String,
}

/// VI/JSON `VirtualMachineSnapshotInfo`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SnapshotInfo {
    #[serde(default)]
    root_snapshot_list: Vec<SnapshotTree>,
}

/// VI/JSON `VirtualMachineSnapshotTree`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotTree {
    name: String,
    snapshot: ManagedObjectReference,
    #[serde(default)]
    child_snapshot_list: Vec<SnapshotTree>,
}

#[derive(Debug, Clone, Deserialize)]
struct ManagedObjectReference {
    value: String,
}

/// VI/JSON `TaskInfo`
#[derive(Debug, Clone, Deserialize)]
struct TaskInfo {
    state: String,
    #[serde(default)]
    error: Option<LocalizedFault>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocalizedFault {
    #[serde(default)]
    localized_message: Option<String>,
}

impl SnapshotInfo {
    /// 转换为通用快照森林，引用为快照 moid
    pub(crate) fn into_forest(self) -> Vec<SnapshotNode<String>> {
        fn convert(tree: SnapshotTree) -> SnapshotNode<String> {
            SnapshotNode::new(tree.name, tree.snapshot.value)
                .with_children(tree.child_snapshot_list.into_iter().map(convert).collect())
        }
        self.root_snapshot_list.into_iter().map(convert).collect()
    }
}

/// vSphere 适配器
pub struct VsphereAdapter {
    /// vCenter 基础 URL
    base_url: String,

    /// HTTP 客户端
    http_client: Client,

    /// 会话令牌
    session: Arc<RwLock<Option<String>>>,

    /// 配置
    config: VsphereConfig,
}

impl VsphereAdapter {
    /// 创建新的 vSphere 适配器（不建立连接）
    pub fn new(config: VsphereConfig) -> Result<Self> {
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

    fn vim_path(&self, path: &str) -> String {
        format!("/sdk/vim25/{}{}", self.config.api_release, path)
    }

    /// 当前会话令牌；读锁在返回前释放，不会跨越网络请求
    async fn session_token(&self) -> std::result::Result<String, OperationError> {
        self.session
            .read()
            .await
            .clone()
            .ok_or(OperationError::NotConnected)
    }

    /// 发送带会话的请求，非 2xx 转为 API 错误
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> std::result::Result<Response, OperationError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("vSphere API 请求: {} {}", method, url);

        let token = self.session_token().await?;

        let mut request = self
            .http_client
            .request(method, &url)
            .header(SESSION_HEADER, token);

        if let Some(body) = body {
            request = request.json(&body);
        }

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
            warn!("vSphere API 请求失败: {} - {}", status, error_text);
            return Err(OperationError::Api(status.as_u16(), error_text));
        }

        Ok(response)
    }

    async fn request<R: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> std::result::Result<R, OperationError> {
        self.send(method, path, body)
            .await?
            .json::<R>()
            .await
            .map_err(|e| OperationError::Parse(e.to_string()))
    }

    /// 按名称查找虚拟机，返回 moid
    async fn find_vm(&self, vm_name: &str) -> std::result::Result<String, OperationError> {
        let path = format!("/api/vcenter/vm?names={}", urlencoding::encode(vm_name));
        let vms: Vec<VmSummary> = self.request(Method::GET, &path, None).await?;

        vms.into_iter()
            .find(|vm| vm.name == vm_name)
            .map(|vm| vm.vm)
            .ok_or_else(|| OperationError::VmNotFound(vm_name.to_string()))
    }

    /// 读取虚拟机快照树；没有任何快照时返回空森林
    async fn snapshot_forest(
        &self,
        vm_id: &str,
    ) -> std::result::Result<Vec<SnapshotNode<String>>, OperationError> {
        let path = self.vim_path(&format!("/VirtualMachine/{}/snapshot", vm_id));
        let text = self
            .send(Method::GET, &path, None)
            .await?
            .text()
            .await
            .map_err(|e| OperationError::Http(e.to_string()))?;

        parse_snapshot_forest(&text)
    }

    /// 轮询远程任务直到成功或失败
    async fn wait_for_task(&self, task_id: &str) -> std::result::Result<(), OperationError> {
        let path = self.vim_path(&format!("/Task/{}/info", task_id));
        let started = Instant::now();

        loop {
            let info: TaskInfo = self.request(Method::GET, &path, None).await?;
            match info.state.as_str() {
                "success" => return Ok(()),
                "error" => {
                    let message = info
                        .error
                        .and_then(|fault| fault.localized_message)
                        .unwrap_or_else(|| format!("任务 {} 失败", task_id));
                    return Err(OperationError::BackendTaskFailed(message));
                }
                state => debug!("任务 {} 状态: {}", task_id, state),
            }

            if started.elapsed() >= self.timeouts().task_timeout() {
                return Err(OperationError::BackendTaskFailed(format!(
                    "等待任务 {} 超时",
                    task_id
                )));
            }
            tokio::time::sleep(self.timeouts().task_poll_interval()).await;
        }
    }
}

/// 解析 VI/JSON 快照属性，`null` 或空响应表示没有快照
pub(crate) fn parse_snapshot_forest(
    text: &str,
) -> std::result::Result<Vec<SnapshotNode<String>>, OperationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(Vec::new());
    }

    let info: SnapshotInfo =
        serde_json::from_str(trimmed).map_err(|e| OperationError::Parse(e.to_string()))?;
    Ok(info.into_forest())
}

#[async_trait]
impl HypervisorAdapter for VsphereAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Vsphere
    }

    async fn connect(&self) -> std::result::Result<(), ConnectError> {
        if self.config.user.is_empty() {
            return Err(ConnectError::MissingCredentials("vCenter 用户名为空".to_string()));
        }

        info!("连接 vCenter: {}", self.config.host);

        let response = self
            .http_client
            .post(format!("{}/api/session", self.base_url))
            .basic_auth(&self.config.user, Some(&self.config.password))
            .send()
            .await
            .map_err(|e| ConnectError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ConnectError::AuthFailed(format!("{} - {}", status, error_text)));
        }

        let token: String = response
            .json()
            .await
            .map_err(|e| ConnectError::Parse(e.to_string()))?;

        *self.session.write().await = Some(token);

        info!("已连接 vCenter: {}", self.config.host);
        Ok(())
    }

    async fn disconnect(&self) {
        let token = self.session.write().await.take();
        let Some(token) = token else {
            return;
        };

        let result = self
            .http_client
            .delete(format!("{}/api/session", self.base_url))
            .header(SESSION_HEADER, token)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                info!("已断开 vCenter: {}", self.config.host)
            }
            Ok(response) => warn!("注销 vCenter 会话失败: {}", response.status()),
            Err(e) => warn!("注销 vCenter 会话失败: {}", e),
        }
    }

    async fn revert_snapshot(
        &self,
        vm_name: &str,
        snapshot_name: &str,
    ) -> std::result::Result<(), OperationError> {
        let vm_id = self.find_vm(vm_name).await?;
        let forest = self.snapshot_forest(&vm_id).await?;

        let snapshot = find_snapshot(&forest, snapshot_name).ok_or_else(|| {
            OperationError::SnapshotNotFound {
                vm: vm_name.to_string(),
                snapshot: snapshot_name.to_string(),
            }
        })?;

        let path = self.vim_path(&format!(
            "/VirtualMachineSnapshot/{}/RevertToSnapshot_Task",
            snapshot.reference
        ));
        let task: ManagedObjectReference = self
            .request(Method::POST, &path, Some(serde_json::json!({})))
            .await?;
        self.wait_for_task(&task.value).await?;

        info!("已将 {} 恢复到快照 {}", vm_name, snapshot_name);
        Ok(())
    }

    async fn power_cycle(&self, vm_name: &str) -> std::result::Result<(), OperationError> {
        let vm_id = self.find_vm(vm_name).await?;

        let power: PowerInfo = self
            .request(Method::GET, &format!("/api/vcenter/vm/{}/power", vm_id), None)
            .await?;

        let action = if power.state == "POWERED_ON" { "reset" } else { "start" };
        self.send(
            Method::POST,
            &format!("/api/vcenter/vm/{}/power?action={}", vm_id, action),
            None,
        )
        .await?;

        info!("已电源循环 {} ({})", vm_name, action);
        Ok(())
    }
}

/// vSphere 适配器构建器
pub struct VsphereBuilder;

impl AdapterBuilder for VsphereBuilder {
    fn build(&self, config: &BackendConfig) -> Result<Arc<dyn HypervisorAdapter>> {
        match config {
            BackendConfig::Vsphere(vs) => Ok(Arc::new(VsphereAdapter::new(vs.clone())?)),
            other => Err(HypervisorError::Config(format!(
                "vSphere 构建器收到了 {} 配置",
                other.kind()
            ))),
        }
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Vsphere
    }
}
