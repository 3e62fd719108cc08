use super::super::storage::StorageError;
use super::super::traits::AppointmentError;
use shared::appointment::AppointmentStatus;
use shared::{CommandError, CommandErrorCode};
use thiserror::Error;

/// Manager errors
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Appointment not found: {0}")]
    AppointmentNotFound(String),

    #[error("Appointment {0} is already finalized as {1}")]
    AlreadyFinalized(String, AppointmentStatus),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Not an authorized party: {0}")]
    NotAuthorizedParty(String),

    #[error("Slot unavailable: {0}")]
    SlotUnavailable(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// 将存储错误转换为错误码（前端负责本地化）
fn classify_storage_error(e: &StorageError) -> CommandErrorCode {
    match e {
        StorageError::AppointmentNotFound(_) => CommandErrorCode::AppointmentNotFound,
        // a missing event or an unserializable value is a server-side bug,
        // not something the client can act on
        StorageError::Serialization(_) | StorageError::EventNotFound(_, _) => {
            CommandErrorCode::InternalError
        }
        // redb Database/Transaction/Table/Storage/Commit errors are
        // retryable persistence failures
        _ => CommandErrorCode::StorageError,
    }
}

impl From<ManagerError> for CommandError {
    fn from(err: ManagerError) -> Self {
        let (code, message) = match err {
            ManagerError::Storage(e) => {
                let code = classify_storage_error(&e);
                let message = e.to_string(); // 保留技术细节用于日志/调试
                tracing::error!(error = %e, error_code = ?code, "Storage error occurred");
                (code, message)
            }
            ManagerError::AppointmentNotFound(id) => (
                CommandErrorCode::AppointmentNotFound,
                format!("Appointment not found: {}", id),
            ),
            ManagerError::AlreadyFinalized(id, status) => (
                CommandErrorCode::AlreadyFinalized,
                format!("Appointment {} is already finalized as {}", id, status),
            ),
            ManagerError::InvalidTransition(msg) => (CommandErrorCode::InvalidTransition, msg),
            ManagerError::NotAuthorizedParty(msg) => (CommandErrorCode::NotAuthorizedParty, msg),
            ManagerError::SlotUnavailable(msg) => (CommandErrorCode::SlotUnavailable, msg),
            ManagerError::Validation(msg) => (CommandErrorCode::ValidationError, msg),
            ManagerError::Internal(msg) => (CommandErrorCode::InternalError, msg),
        };
        CommandError::new(code, message)
    }
}

impl From<AppointmentError> for ManagerError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::AppointmentNotFound(id) => ManagerError::AppointmentNotFound(id),
            AppointmentError::AlreadyFinalized(id, status) => {
                ManagerError::AlreadyFinalized(id, status)
            }
            AppointmentError::InvalidTransition(msg) => ManagerError::InvalidTransition(msg),
            AppointmentError::NotAuthorizedParty(msg) => ManagerError::NotAuthorizedParty(msg),
            AppointmentError::SlotUnavailable(msg) => ManagerError::SlotUnavailable(msg),
            AppointmentError::Validation(msg) => ManagerError::Validation(msg),
            AppointmentError::Storage(msg) => ManagerError::Internal(msg),
        }
    }
}

impl From<crate::utils::AppError> for ManagerError {
    fn from(err: crate::utils::AppError) -> Self {
        ManagerError::from(AppointmentError::from(err))
    }
}

pub type ManagerResult<T> = Result<T, ManagerError>;
