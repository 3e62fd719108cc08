//! Chat subsystem (聊天)
//!
//! Threads, messages, read marks and typing relay, kept in a database of
//! their own (`chat.redb`). Appointment-bound threads mirror the
//! appointment's status and close with it; favorite threads outlive any
//! single appointment.

pub mod service;
pub mod storage;

pub use service::{ChatEvent, ChatService};
pub use storage::ChatStorage;
