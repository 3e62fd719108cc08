//! Contiguous slot selection
//!
//! A booking covers one unbroken block of hourly slots on a single chair.
//! [`SlotSelection`] enforces that while the user toggles slots in the
//! grid: every accepted state is either empty or a run of consecutive
//! hours, so the request built from it can never be rejected for shape.

use chrono::{NaiveTime, Timelike};

/// Grid granularity in minutes
const SLOT_MINUTES: u32 = 60;

/// Result of toggling one slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// Slot joined the selection
    Added,
    /// Slot left the selection
    Removed,
    /// Accepting the toggle would break the block; selection unchanged
    NotContiguous,
    /// The candidate is not a valid "HH:mm" time
    Invalid,
}

/// An in-progress selection of hourly slots, kept sorted and contiguous
#[derive(Debug, Clone, Default)]
pub struct SlotSelection {
    /// Minutes since midnight of each selected slot start, ascending
    selected: Vec<u32>,
}

impl SlotSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle a slot given its "HH:mm" start time.
    ///
    /// An unselected candidate is added only if the grown set still forms
    /// one run of consecutive hours. A selected candidate is removed only
    /// from the ends of the run; pulling an interior slot would split the
    /// block and is refused.
    pub fn try_toggle(&mut self, candidate: &str) -> ToggleOutcome {
        let Some(minutes) = parse_hhmm(candidate) else {
            return ToggleOutcome::Invalid;
        };

        if let Some(pos) = self.selected.iter().position(|&m| m == minutes) {
            if pos == 0 || pos == self.selected.len() - 1 {
                self.selected.remove(pos);
                ToggleOutcome::Removed
            } else {
                ToggleOutcome::NotContiguous
            }
        } else {
            let insert_at = self.selected.partition_point(|&m| m < minutes);
            self.selected.insert(insert_at, minutes);
            if is_contiguous(&self.selected) {
                ToggleOutcome::Added
            } else {
                self.selected.remove(insert_at);
                ToggleOutcome::NotContiguous
            }
        }
    }

    pub fn contains(&self, time: &str) -> bool {
        parse_hhmm(time).is_some_and(|m| self.selected.contains(&m))
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }

    /// Number of selected slots
    pub fn slot_count(&self) -> u32 {
        self.selected.len() as u32
    }

    /// Start of the first selected slot, "HH:mm"
    pub fn start_time(&self) -> Option<String> {
        self.selected.first().map(|&m| format_hhmm(m))
    }

    /// Selected slot starts in grid order
    pub fn selected_times(&self) -> Vec<String> {
        self.selected.iter().map(|&m| format_hhmm(m)).collect()
    }

    /// Scheduled bounds of the whole block: first slot start to last slot
    /// end (one slot length past the last start).
    pub fn booking_bounds(&self) -> Option<(String, String)> {
        let first = *self.selected.first()?;
        let last = *self.selected.last()?;
        Some((format_hhmm(first), format_hhmm(last + SLOT_MINUTES)))
    }
}

fn is_contiguous(sorted: &[u32]) -> bool {
    sorted.windows(2).all(|w| w[1] - w[0] == SLOT_MINUTES)
}

fn parse_hhmm(time: &str) -> Option<u32> {
    let parsed = NaiveTime::parse_from_str(time, "%H:%M").ok()?;
    Some(parsed.hour() * 60 + parsed.minute())
}

fn format_hhmm(minutes: u32) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}
