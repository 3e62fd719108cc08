//! Participant model
//!
//! A participant is a denormalized reference to an actor appearing in chat
//! threads. It is resolved per query, never owned by a message. Upstream
//! systems are inconsistent about id casing and padding, so lookups go
//! through [`Participant::normalized_key`].

use serde::{Deserialize, Serialize};

/// Actor role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipantRole {
    Customer,
    Store,
    Provider,
}

impl std::fmt::Display for ParticipantRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParticipantRole::Customer => write!(f, "CUSTOMER"),
            ParticipantRole::Store => write!(f, "STORE"),
            ParticipantRole::Provider => write!(f, "PROVIDER"),
        }
    }
}

/// Provider sub-type, when the participant is a provider
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderKind {
    MaleHairdresser,
    FemaleHairdresser,
    Salon,
}

/// Chat participant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Participant {
    pub user_id: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub role: ParticipantRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_kind: Option<ProviderKind>,
}

impl Participant {
    /// Lookup key tolerant of upstream casing/whitespace drift
    pub fn normalized_key(user_id: &str) -> String {
        user_id.trim().to_lowercase()
    }

    /// Placeholder for a sender missing from the participant set.
    ///
    /// Display name is the shortened id; the caller is expected to trigger
    /// a participant refresh out of band.
    pub fn placeholder(user_id: &str) -> Self {
        let short: String = user_id.chars().take(8).collect();
        Self {
            user_id: user_id.to_string(),
            display_name: short,
            image_url: None,
            role: ParticipantRole::Customer,
            provider_kind: None,
        }
    }
}
