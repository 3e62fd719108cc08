//! Command result types shared between server and clients
//!
//! Every mutating request is a command; the server answers with a
//! [`CommandResponse`] carrying either the affected appointment/thread id
//! or a coded [`CommandError`] the client can branch on.

use serde::{Deserialize, Serialize};

/// Command response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    /// The command ID this responds to
    pub command_id: String,
    /// Whether the command succeeded
    pub success: bool,
    /// New appointment ID (only for CreateAppointment)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appointment_id: Option<String>,
    /// Error details if failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CommandError>,
}

impl CommandResponse {
    pub fn success(command_id: String, appointment_id: Option<String>) -> Self {
        Self {
            command_id,
            success: true,
            appointment_id,
            error: None,
        }
    }

    pub fn error(command_id: String, error: CommandError) -> Self {
        Self {
            command_id,
            success: false,
            appointment_id: None,
            error: Some(error),
        }
    }

    /// Duplicate delivery of an already-processed command.
    ///
    /// Reported as success so client retries converge, but without the
    /// appointment id (the original response carried it).
    pub fn duplicate(command_id: String) -> Self {
        Self {
            command_id,
            success: true,
            appointment_id: None,
            error: None,
        }
    }
}

/// Command error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandError {
    pub code: CommandErrorCode,
    pub message: String,
}

impl CommandError {
    pub fn new(code: CommandErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

/// Command error codes
///
/// | Code                      | Meaning                                            | Retry? |
/// |---------------------------|----------------------------------------------------|--------|
/// | VALIDATION_ERROR          | Malformed input (time range, weekday data, text)   | no     |
/// | SLOT_UNAVAILABLE          | Requested slots overlap an existing booking        | no     |
/// | APPOINTMENT_NOT_FOUND     | Unknown appointment id                             | no     |
/// | THREAD_NOT_FOUND          | Unknown chat thread id                             | no     |
/// | INVALID_TRANSITION        | Operation not legal from the current status        | refetch first |
/// | ALREADY_FINALIZED         | Appointment reached a terminal status              | no     |
/// | NOT_AUTHORIZED_PARTY      | Actor is not a party allowed to perform this       | no     |
/// | SEND_NOT_ALLOWED          | Thread is closed for new messages                  | refetch first |
/// | STORAGE_ERROR             | Persistence failure                                | yes    |
/// | INTERNAL_ERROR            | Unexpected server failure                          | yes    |
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandErrorCode {
    ValidationError,
    SlotUnavailable,
    AppointmentNotFound,
    ThreadNotFound,
    InvalidTransition,
    AlreadyFinalized,
    NotAuthorizedParty,
    SendNotAllowed,
    StorageError,
    InternalError,
}

impl CommandErrorCode {
    /// Wire form of the code (matches the serde representation)
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandErrorCode::ValidationError => "VALIDATION_ERROR",
            CommandErrorCode::SlotUnavailable => "SLOT_UNAVAILABLE",
            CommandErrorCode::AppointmentNotFound => "APPOINTMENT_NOT_FOUND",
            CommandErrorCode::ThreadNotFound => "THREAD_NOT_FOUND",
            CommandErrorCode::InvalidTransition => "INVALID_TRANSITION",
            CommandErrorCode::AlreadyFinalized => "ALREADY_FINALIZED",
            CommandErrorCode::NotAuthorizedParty => "NOT_AUTHORIZED_PARTY",
            CommandErrorCode::SendNotAllowed => "SEND_NOT_ALLOWED",
            CommandErrorCode::StorageError => "STORAGE_ERROR",
            CommandErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for CommandErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
