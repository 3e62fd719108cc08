//! Shared types for Chairbook
//!
//! Common types used by both the salon server and clients: appointment
//! commands/events/snapshots, chat models, catalog models, and the
//! message-bus envelope.

pub mod appointment;
pub mod error;
pub mod message;
pub mod models;
pub mod util;

// Re-exports
pub use serde::{Deserialize, Serialize};

// Message bus re-exports (for convenient access)
pub use message::{BusMessage, EventType};

// Command result re-exports
pub use error::{CommandError, CommandErrorCode, CommandResponse};
