//! Participant resolution for an open thread
//!
//! Senders arrive on messages as bare user ids and are resolved against
//! the thread's participant set. Upstream ids drift in casing and padding,
//! so a miss retries through the normalized key before falling back to a
//! placeholder. The first unresolvable sender arms one roster refresh;
//! further misses while it is pending change nothing.

use std::collections::HashMap;

use shared::models::Participant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshState {
    Idle,
    Scheduled,
    InFlight,
}

/// Lookup table over the participants of one thread
#[derive(Debug)]
pub struct ParticipantDirectory {
    by_id: HashMap<String, Participant>,
    /// normalized key -> canonical user id
    by_normalized: HashMap<String, String>,
    refresh: RefreshState,
}

impl ParticipantDirectory {
    pub fn new() -> Self {
        Self {
            by_id: HashMap::new(),
            by_normalized: HashMap::new(),
            refresh: RefreshState::Idle,
        }
    }

    /// Swap in a fresh roster; completes any pending refresh
    pub fn replace(&mut self, participants: Vec<Participant>) {
        self.by_id.clear();
        self.by_normalized.clear();
        for participant in participants {
            self.by_normalized.insert(
                Participant::normalized_key(&participant.user_id),
                participant.user_id.clone(),
            );
            self.by_id.insert(participant.user_id.clone(), participant);
        }
        self.refresh = RefreshState::Idle;
    }

    /// Resolve a sender id to a participant.
    ///
    /// Exact id first, then the normalized key. An unresolvable id yields
    /// a placeholder and arms a roster refresh if none is pending.
    pub fn resolve(&mut self, user_id: &str) -> Participant {
        if let Some(participant) = self.by_id.get(user_id) {
            return participant.clone();
        }
        if let Some(canonical) = self.by_normalized.get(&Participant::normalized_key(user_id))
            && let Some(participant) = self.by_id.get(canonical)
        {
            return participant.clone();
        }

        if self.refresh == RefreshState::Idle {
            self.refresh = RefreshState::Scheduled;
            tracing::warn!(user_id, "Unknown sender; scheduling a participant refresh");
        }
        Participant::placeholder(user_id)
    }

    /// Claim the scheduled refresh. True at most once per miss window.
    pub fn take_scheduled_refresh(&mut self) -> bool {
        if self.refresh == RefreshState::Scheduled {
            self.refresh = RefreshState::InFlight;
            true
        } else {
            false
        }
    }

    /// The claimed refresh did not complete; allow a later retry
    pub fn refresh_failed(&mut self) {
        self.refresh = RefreshState::Idle;
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl Default for ParticipantDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::ParticipantRole;

    fn roster() -> Vec<Participant> {
        vec![
            Participant {
                user_id: "Cust-1".to_string(),
                display_name: "Alice".to_string(),
                image_url: None,
                role: ParticipantRole::Customer,
                provider_kind: None,
            },
            Participant {
                user_id: "prov-1".to_string(),
                display_name: "Bruno".to_string(),
                image_url: None,
                role: ParticipantRole::Provider,
                provider_kind: None,
            },
        ]
    }

    #[test]
    fn test_exact_match_wins() {
        let mut directory = ParticipantDirectory::new();
        directory.replace(roster());
        assert_eq!(directory.resolve("Cust-1").display_name, "Alice");
        assert!(!directory.take_scheduled_refresh());
    }

    #[test]
    fn test_normalized_fallback_absorbs_id_drift() {
        let mut directory = ParticipantDirectory::new();
        directory.replace(roster());
        // Same id with different casing and padding
        assert_eq!(directory.resolve(" cust-1 ").display_name, "Alice");
        assert_eq!(directory.resolve("CUST-1").display_name, "Alice");
        assert!(!directory.take_scheduled_refresh());
    }

    #[test]
    fn test_unknown_sender_gets_placeholder_and_schedules_refresh() {
        let mut directory = ParticipantDirectory::new();
        directory.replace(roster());

        let ghost = directory.resolve("ghost-12345678");
        assert_eq!(ghost.display_name, "ghost-12");
        assert_eq!(ghost.user_id, "ghost-12345678");

        assert!(directory.take_scheduled_refresh());
        // Claimed once; nothing more to take
        assert!(!directory.take_scheduled_refresh());
    }

    #[test]
    fn test_second_miss_does_not_rearm_a_pending_refresh() {
        let mut directory = ParticipantDirectory::new();
        directory.replace(roster());

        directory.resolve("ghost-1");
        directory.resolve("ghost-2");
        assert!(directory.take_scheduled_refresh());

        // Misses during the in-flight window stay quiet
        directory.resolve("ghost-3");
        assert!(!directory.take_scheduled_refresh());
    }

    #[test]
    fn test_replace_completes_refresh_and_allows_rearm() {
        let mut directory = ParticipantDirectory::new();
        directory.replace(roster());
        directory.resolve("ghost-1");
        assert!(directory.take_scheduled_refresh());

        directory.replace(roster());
        directory.resolve("ghost-1");
        assert!(directory.take_scheduled_refresh());
    }

    #[test]
    fn test_failed_refresh_allows_retry() {
        let mut directory = ParticipantDirectory::new();
        directory.replace(roster());
        directory.resolve("ghost-1");
        assert!(directory.take_scheduled_refresh());

        directory.refresh_failed();
        directory.resolve("ghost-1");
        assert!(directory.take_scheduled_refresh());
    }
}
