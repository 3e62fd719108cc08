//! Appointment Event Sourcing Module
//!
//! This module implements the appointment lifecycle using event sourcing:
//!
//! - **manager**: Core AppointmentsManager for command processing and event generation
//! - **storage**: redb-based persistence layer for events, snapshots, and indices
//! - **reducer**: Composite status derivation from the two party decisions
//! - **expiry**: Background sweep that lapses unanswered pending appointments
//!
//! # Architecture
//!
//! ```text
//! Command → AppointmentsManager → Event → Storage (redb)
//!                 ↓                           ↓
//!              Broadcast               Snapshot Update
//!                 ↓
//!           All Subscribers
//! ```
//!
//! # Data Flow
//!
//! 1. Client sends AppointmentCommand via MessageBus
//! 2. AppointmentsManager resolves catalog data and validates
//! 3. AppointmentEvent is generated with global sequence
//! 4. Event is persisted to redb (transactional)
//! 5. Snapshot is updated
//! 6. Event is broadcast to all subscribers
//! 7. CommandResponse is returned to client

pub mod actions;
pub mod appliers;
pub mod expiry;
pub mod manager;
pub mod reducer;
pub mod storage;
pub mod traits;

// Re-exports
pub use expiry::PendingExpirySweeper;
pub use manager::AppointmentsManager;
pub use storage::AppointmentStorage;

// Re-export shared types for convenience
pub use shared::appointment::{
    AppointmentCommand, AppointmentCommandPayload, AppointmentEvent, AppointmentEventType,
    AppointmentSnapshot, AppointmentStatus, EventPayload,
};
pub use shared::{CommandError, CommandErrorCode, CommandResponse};
