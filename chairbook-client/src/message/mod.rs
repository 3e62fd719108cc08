//! 消息总线客户端
//!
//! Connects to the salon server's framed TCP bus (plain or TLS) and turns
//! it into two call shapes:
//!
//! | 组件 | 职责 |
//! |------|------|
//! | [`Transport`] | one framed, ordered byte stream (TCP / TLS / in-memory) |
//! | [`MessageClient`] | handshake, RPC correlation, push fan-out |
//!
//! Request/response correlation rides on the envelope: a request's
//! `request_id` comes back as the response's `correlation_id`, and the
//! response is targeted at this client's id. Everything not addressed to
//! us is dropped before it reaches any caller.

pub mod client;
pub mod transport;

pub use client::MessageClient;
pub use transport::{MemoryTransport, TcpTransport, TlsTransport, Transport};

// Wire types live in `shared` so both ends agree by construction
pub use shared::message::{
    BusMessage, EventType, HandshakePayload, NewMessagePayload, NotificationPayload,
    PROTOCOL_VERSION, RequestCommandPayload, ResponsePayload, SyncPayload, TypingPayload,
};

use thiserror::Error;

/// Errors from the transport and RPC layer
#[derive(Debug, Error)]
pub enum MessageError {
    /// Could not reach or keep the connection
    #[error("Connection error: {0}")]
    Connection(String),

    /// Socket-level failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Peer sent a frame we refuse to parse
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// No reply arrived inside the request window
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Envelope or payload could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Server refused the protocol handshake
    #[error("Handshake rejected: {0}")]
    Handshake(String),
}
