//! 虚拟化适配层错误定义

use thiserror::Error;

use crate::traits::BackendKind;

/// 会话建立失败
///
/// 连接失败对整个重置操作是致命的，不会下发任何任务。
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("缺少凭据: {0}")]
    MissingCredentials(String),

    #[error("HTTP 错误: {0}")]
    Http(String),

    #[error("认证失败: {0}")]
    AuthFailed(String),

    #[error("响应解析失败: {0}")]
    Parse(String),
}

/// 单台虚拟机上的操作失败
///
/// 只影响当前任务，由执行器记录到任务上。
#[derive(Error, Debug)]
pub enum OperationError {
    #[error("虚拟机不存在: {0}")]
    VmNotFound(String),

    #[error("快照 {snapshot} 在虚拟机 {vm} 上不存在")]
    SnapshotNotFound { vm: String, snapshot: String },

    #[error("后端任务失败: {0}")]
    BackendTaskFailed(String),

    #[error("HTTP 错误: {0}")]
    Http(String),

    #[error("API 错误 [{0}]: {1}")]
    Api(u16, String),

    #[error("响应解析失败: {0}")]
    Parse(String),

    #[error("会话未建立，请先调用 connect")]
    NotConnected,
}

/// 适配器注册与构建错误
#[derive(Error, Debug)]
pub enum HypervisorError {
    #[error("后端 {0} 未注册")]
    BackendNotRegistered(BackendKind),

    #[error("后端 {0} 已注册")]
    BackendAlreadyRegistered(BackendKind),

    #[error("配置错误: {0}")]
    Config(String),
}

/// 适配器构建结果类型
pub type Result<T> = std::result::Result<T, HypervisorError>;
