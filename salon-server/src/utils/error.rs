//! 统一错误处理
//!
//! 提供应用级错误类型 [`AppError`] 和结果别名 [`AppResult`]。
//!
//! # 错误分类
//!
//! | 分类 | 说明 |
//! |------|------|
//! | 业务逻辑错误 | 资源不存在、验证失败、状态机冲突 |
//! | 系统错误 | 存储错误、序列化错误、内部错误 |
//!
//! 向客户端返回时，[`AppError`] 映射为 [`shared::CommandError`] 的错误码；
//! 映射关系见 `From<AppError> for CommandError`。

use shared::{CommandError, CommandErrorCode};

use crate::appointments::storage::StorageError;
use crate::chat::storage::ChatStorageError;

/// 应用错误枚举
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // ========== 业务逻辑错误 ==========
    #[error("Appointment not found: {0}")]
    /// 预约不存在
    AppointmentNotFound(String),

    #[error("Thread not found: {0}")]
    /// 会话不存在
    ThreadNotFound(String),

    #[error("Resource not found: {0}")]
    /// 其他资源不存在
    NotFound(String),

    #[error("Validation failed: {0}")]
    /// 验证失败
    Validation(String),

    #[error("Requested slots are unavailable: {0}")]
    /// 所选时段已被占用
    SlotUnavailable(String),

    #[error("Invalid transition: {0}")]
    /// 当前状态下不允许该操作
    InvalidTransition(String),

    #[error("Already finalized: {0}")]
    /// 预约已进入终态，不可再变更
    AlreadyFinalized(String),

    #[error("Not an authorized party: {0}")]
    /// 操作者不是该预约的授权方
    NotAuthorizedParty(String),

    #[error("Sending is not allowed on this thread: {0}")]
    /// 会话当前不允许发送消息
    SendNotAllowed(String),

    // ========== 系统错误 ==========
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Chat storage error: {0}")]
    ChatStorage(#[from] ChatStorageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

// ========== Helper Constructors ==========

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Transport(e.to_string())
    }
}

impl From<AppError> for CommandError {
    fn from(err: AppError) -> Self {
        let code = match &err {
            AppError::AppointmentNotFound(_) => CommandErrorCode::AppointmentNotFound,
            AppError::ThreadNotFound(_) => CommandErrorCode::ThreadNotFound,
            AppError::NotFound(_) | AppError::Validation(_) => CommandErrorCode::ValidationError,
            AppError::SlotUnavailable(_) => CommandErrorCode::SlotUnavailable,
            AppError::InvalidTransition(_) => CommandErrorCode::InvalidTransition,
            AppError::AlreadyFinalized(_) => CommandErrorCode::AlreadyFinalized,
            AppError::NotAuthorizedParty(_) => CommandErrorCode::NotAuthorizedParty,
            AppError::SendNotAllowed(_) => CommandErrorCode::SendNotAllowed,
            AppError::Storage(_) | AppError::ChatStorage(_) => CommandErrorCode::StorageError,
            AppError::Serialization(_) | AppError::Transport(_) | AppError::Internal(_) => {
                CommandErrorCode::InternalError
            }
        };
        CommandError::new(code, err.to_string())
    }
}
