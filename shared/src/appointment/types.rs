//! Shared types for appointment synchronization

use serde::{Deserialize, Serialize};

use super::event::AppointmentEvent;
use super::snapshot::AppointmentSnapshot;

/// Client catch-up request after (re)connect
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRequest {
    /// Last event sequence the client has applied
    pub since_sequence: u64,
}

/// Server reply to a [`SyncRequest`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResponse {
    /// Events after `since_sequence`, ordered by sequence
    pub events: Vec<AppointmentEvent>,
    /// Current snapshots of all non-terminal appointments
    pub active_appointments: Vec<AppointmentSnapshot>,
    /// Server's current global sequence
    pub server_sequence: u64,
    /// Set when the requested gap is no longer replayable; the client must
    /// drop local state and take the snapshots as truth
    pub requires_full_sync: bool,
}
