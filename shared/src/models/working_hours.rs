//! Working hours model
//!
//! One record per chair per weekday. `day_of_week` is stored exactly as the
//! upstream system supplied it: either 0-based (Sun=0..Sat=6) or ISO 1-7
//! (Mon=1..Sun=7). The server canonicalizes on lookup; see
//! `salon_server::utils::time::canonical_weekday`.

use serde::{Deserialize, Serialize};

/// Working-hour record for one chair on one weekday
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingHours {
    pub chair_id: String,
    /// Raw weekday index as supplied upstream (0-6 or 1-7)
    pub day_of_week: u8,
    /// Opening time, "HH:mm"
    pub open_time: String,
    /// Closing time, "HH:mm" (exclusive)
    pub close_time: String,
    /// Closed all day; open/close times are ignored
    #[serde(default)]
    pub is_closed: bool,
}

/// A single bookable slot within a day's working hours
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    /// Stable key: "<chair_id>:<date>:<HH:mm>"
    pub slot_id: String,
    /// Slot start, "HH:mm"
    pub start: String,
    /// Slot end, "HH:mm"
    pub end: String,
    pub is_booked: bool,
    pub is_past: bool,
}

/// One chair's slot projection for one day
///
/// Regenerated per query from working hours + bookings; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChairDay {
    pub chair_id: String,
    pub chair_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    /// "YYYY-MM-DD"
    pub date: String,
    pub slots: Vec<Slot>,
}

/// One cell of the rolling 7-day calendar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayCell {
    /// "YYYY-MM-DD"
    pub date: String,
    /// Canonical weekday, 0 = Sunday .. 6 = Saturday
    pub weekday: u8,
    /// Short weekday label for display ("Mon", "Tue", ...)
    pub label: String,
    /// Day of month (1-31)
    pub day_of_month: u32,
    pub is_today: bool,
}
