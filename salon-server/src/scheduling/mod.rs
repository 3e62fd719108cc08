//! Slot scheduling
//!
//! [`grid`] holds the pure calendar/partition functions; [`availability`]
//! combines them with working hours and existing bookings to produce the
//! per-chair slot projection clients render.

pub mod availability;
pub mod grid;

pub use availability::SlotAvailabilityResolver;
pub use grid::{SLOT_MINUTES, partition_slots, rolling_week};
