//! Typing indicator state
//!
//! Two directions, two disciplines:
//!
//! * **Local (outbound)**: "started" goes out on the first keystroke after
//!   idle and is not repeated; "stopped" goes out after a quiet period,
//!   on send, or on close. Quiet timers are cancel-and-replace: each
//!   keystroke bumps a generation counter and a firing timer only counts
//!   if it still carries the newest generation.
//! * **Remote (inbound)**: last write wins per user, and entries expire on
//!   their own after a fixed window, so a lost "stopped" message cannot
//!   leave a ghost indicator.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use shared::message::TypingPayload;

/// Outcome of one keystroke
#[derive(Debug, Clone, Copy)]
pub struct InputUpdate {
    /// A "started typing" signal should be published now
    pub emit_started: bool,
    /// Generation to arm the quiet timer with
    pub generation: u64,
}

#[derive(Debug, Clone)]
struct RemoteTyping {
    display_name: String,
    seen_at: Instant,
}

/// Tracks local debounce state and remote typing indicators for one thread
#[derive(Debug)]
pub struct TypingTracker {
    /// Lifetime of a remote indicator without a refresh
    expiry: Duration,
    local_active: bool,
    generation: u64,
    remote: HashMap<String, RemoteTyping>,
}

impl TypingTracker {
    pub fn new(expiry: Duration) -> Self {
        Self {
            expiry,
            local_active: false,
            generation: 0,
            remote: HashMap::new(),
        }
    }

    /// Record one keystroke in the composer
    pub fn note_input(&mut self) -> InputUpdate {
        self.generation += 1;
        let emit_started = !self.local_active;
        self.local_active = true;
        InputUpdate {
            emit_started,
            generation: self.generation,
        }
    }

    /// A quiet timer fired. True when "stopped" should be published:
    /// only the timer carrying the newest generation counts.
    pub fn quiet_elapsed(&mut self, generation: u64) -> bool {
        if self.local_active && generation == self.generation {
            self.local_active = false;
            true
        } else {
            false
        }
    }

    /// Message sent or thread closing. True when an outstanding
    /// "started" still needs its "stopped".
    pub fn finish_local(&mut self) -> bool {
        // Invalidate any armed quiet timer
        self.generation += 1;
        std::mem::take(&mut self.local_active)
    }

    pub fn is_local_active(&self) -> bool {
        self.local_active
    }

    /// Apply a remote typing signal (already filtered to this thread)
    pub fn apply_remote(&mut self, payload: &TypingPayload, now: Instant) {
        if payload.is_typing {
            self.remote.insert(
                payload.typing_user_id.clone(),
                RemoteTyping {
                    display_name: payload.typing_user_name.clone(),
                    seen_at: now,
                },
            );
        } else {
            self.remote.remove(&payload.typing_user_id);
        }
    }

    /// Display names of users typing right now, sorted.
    ///
    /// Entries past the expiry window are dropped on the way out.
    pub fn active_remote(&mut self, now: Instant) -> Vec<String> {
        let expiry = self.expiry;
        self.remote
            .retain(|_, entry| now.duration_since(entry.seen_at) < expiry);
        let mut names: Vec<String> = self
            .remote
            .values()
            .map(|entry| entry.display_name.clone())
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typing(user_id: &str, name: &str, is_typing: bool) -> TypingPayload {
        TypingPayload {
            thread_id: "thread-1".to_string(),
            typing_user_id: user_id.to_string(),
            typing_user_name: name.to_string(),
            is_typing,
        }
    }

    #[test]
    fn test_first_keystroke_emits_started_once() {
        let mut tracker = TypingTracker::new(Duration::from_secs(5));
        assert!(tracker.note_input().emit_started);
        assert!(!tracker.note_input().emit_started);
        assert!(!tracker.note_input().emit_started);
        assert!(tracker.is_local_active());
    }

    #[test]
    fn test_stale_quiet_timer_is_ignored() {
        let mut tracker = TypingTracker::new(Duration::from_secs(5));
        let first = tracker.note_input().generation;
        let second = tracker.note_input().generation;

        assert!(!tracker.quiet_elapsed(first));
        assert!(tracker.is_local_active());
        assert!(tracker.quiet_elapsed(second));
        assert!(!tracker.is_local_active());
    }

    #[test]
    fn test_quiet_then_new_keystroke_restarts() {
        let mut tracker = TypingTracker::new(Duration::from_secs(5));
        let generation = tracker.note_input().generation;
        assert!(tracker.quiet_elapsed(generation));
        assert!(tracker.note_input().emit_started);
    }

    #[test]
    fn test_finish_local_flushes_and_invalidates_timers() {
        let mut tracker = TypingTracker::new(Duration::from_secs(5));
        let generation = tracker.note_input().generation;

        assert!(tracker.finish_local());
        assert!(!tracker.finish_local());
        // The timer armed before the send must not fire a second stop
        assert!(!tracker.quiet_elapsed(generation));
    }

    #[test]
    fn test_remote_last_write_wins() {
        let mut tracker = TypingTracker::new(Duration::from_secs(5));
        let t0 = Instant::now();

        tracker.apply_remote(&typing("prov-1", "Bruno", true), t0);
        // Refresh just before the first sighting would have expired
        tracker.apply_remote(&typing("prov-1", "Bruno", true), t0 + Duration::from_secs(4));

        let names = tracker.active_remote(t0 + Duration::from_secs(8));
        assert_eq!(names, vec!["Bruno"]);
    }

    #[test]
    fn test_remote_stop_removes_indicator() {
        let mut tracker = TypingTracker::new(Duration::from_secs(5));
        let t0 = Instant::now();

        tracker.apply_remote(&typing("prov-1", "Bruno", true), t0);
        tracker.apply_remote(&typing("prov-1", "Bruno", false), t0 + Duration::from_secs(1));
        assert!(tracker.active_remote(t0 + Duration::from_secs(1)).is_empty());
    }

    #[test]
    fn test_remote_indicator_expires_without_stop() {
        let mut tracker = TypingTracker::new(Duration::from_secs(5));
        let t0 = Instant::now();

        tracker.apply_remote(&typing("prov-1", "Bruno", true), t0);
        assert_eq!(tracker.active_remote(t0 + Duration::from_secs(4)).len(), 1);
        assert!(tracker.active_remote(t0 + Duration::from_secs(5)).is_empty());
    }

    #[test]
    fn test_active_remote_is_sorted() {
        let mut tracker = TypingTracker::new(Duration::from_secs(5));
        let t0 = Instant::now();

        tracker.apply_remote(&typing("prov-2", "Carla", true), t0);
        tracker.apply_remote(&typing("prov-1", "Bruno", true), t0);
        assert_eq!(tracker.active_remote(t0), vec!["Bruno", "Carla"]);
    }
}
