//! Chairbook Client - message-bus client for the salon server
//!
//! Connects over TCP or TLS, runs the request/response and push layers,
//! and carries the booking and chat state machines the UI drives.

pub mod booking;
pub mod chat;
pub mod config;
pub mod error;
pub mod message;

pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};

pub use booking::{SlotSelection, ToggleOutcome};
pub use chat::{ChatThreadSynchronizer, ParticipantDirectory, TypingTracker};

// Re-export shared types for convenience
pub use shared::appointment::{AppointmentSnapshot, AppointmentStatus};
pub use shared::models::{ChatMessage, ChatThread, Participant};

// Message types and clients
pub use message::{BusMessage, EventType, MessageClient, MessageError};
