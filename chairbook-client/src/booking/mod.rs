//! Booking helpers for composing an appointment request

pub mod selection;

pub use selection::{SlotSelection, ToggleOutcome};
