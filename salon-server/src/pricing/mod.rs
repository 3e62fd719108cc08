//! Booking price calculation
//!
//! Totals are derived from the chair's pricing mode and the finalized slot
//! selection. Recomputed from scratch on every call; nothing here is
//! incremental, so repeated recomputation cannot accumulate float error.

mod calculator;

pub use calculator::*;
