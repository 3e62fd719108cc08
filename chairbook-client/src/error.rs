//! Client-side error types
//!
//! [`MessageError`] stays inside the transport layer; everything the
//! application sees is a [`ClientError`]. Server-side business rejections
//! arrive as [`ClientError::Command`] still carrying the wire error code,
//! so callers can branch without string matching.

use thiserror::Error;

use crate::message::MessageError;

/// Errors surfaced to application code
#[derive(Debug, Error)]
pub enum ClientError {
    /// The connection or framing layer failed
    #[error("Transport error: {0}")]
    Transport(MessageError),

    /// The server did not answer inside the request window
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Not connected, or the connection dropped mid-operation
    #[error("Connection error: {0}")]
    Connection(String),

    /// A payload could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The server rejected the request with a coded business error
    #[error("{action} rejected: [{code}] {message}")]
    Command {
        action: String,
        code: String,
        message: String,
    },

    /// The thread no longer accepts messages
    #[error("Thread {0} is closed for new messages")]
    ThreadClosed(String),
}

/// Transport timeouts surface as [`ClientError::Timeout`]; every other
/// transport failure stays wrapped.
impl From<MessageError> for ClientError {
    fn from(e: MessageError) -> Self {
        match e {
            MessageError::Timeout(message) => ClientError::Timeout(message),
            other => ClientError::Transport(other),
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
