//! Appointment Event Sourcing Module
//!
//! This module provides types for the appointment event sourcing system:
//! - Commands: Requests from clients to modify appointments
//! - Events: Immutable facts recorded after command processing
//! - Snapshots: Computed appointment state from event stream

pub mod command;
pub mod event;
pub mod snapshot;
pub mod types;

// Re-exports
pub use command::{AppointmentCommand, AppointmentCommandPayload};
pub use event::{AppointmentEvent, AppointmentEventType, EventPayload};
pub use snapshot::{
    AppointmentSnapshot, AppointmentStatus, DecisionParty, PartyDecision, RequesterRole,
    Responsibility,
};
pub use types::*;
