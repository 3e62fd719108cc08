//! Composite status reducer
//!
//! 预约的最终状态永远由两方决定 + 到期时间推导，绝不独立赋值。
//! The composite status is a pure function of the two party decisions,
//! the responsibility set and the pending deadline. Evaluation order:
//!
//! 1. Any responsible party rejected -> `Rejected`
//! 2. Every responsible party approved -> `Approved`
//! 3. Past the pending deadline -> `Unanswered`
//! 4. Otherwise -> `Pending`
//!
//! A rejection or full approval recorded before the deadline therefore
//! survives a later expiry sweep, and approval by the only responsible
//! party is enough when the other side is not involved.

use shared::appointment::{AppointmentSnapshot, AppointmentStatus, PartyDecision, Responsibility};

/// Derive the composite status from the decision pair
pub fn composite_status(
    store_decision: PartyDecision,
    provider_decision: PartyDecision,
    responsibility: Responsibility,
    now_millis: i64,
    pending_expires_at: i64,
) -> AppointmentStatus {
    let mut decisions = Vec::with_capacity(2);
    if responsibility.store {
        decisions.push(store_decision);
    }
    if responsibility.provider {
        decisions.push(provider_decision);
    }

    // A chair always has at least one responsible party (validated at
    // creation); an empty set stays Pending rather than auto-approving.
    if decisions.is_empty() {
        return AppointmentStatus::Pending;
    }

    if decisions.iter().any(|d| *d == PartyDecision::Rejected) {
        return AppointmentStatus::Rejected;
    }

    if decisions.iter().all(|d| *d == PartyDecision::Approved) {
        return AppointmentStatus::Approved;
    }

    if now_millis > pending_expires_at {
        return AppointmentStatus::Unanswered;
    }

    AppointmentStatus::Pending
}

/// Status of a stored snapshot as of `now_millis`
///
/// A snapshot persisted as `Pending` may already be past its deadline
/// before the expiry sweep has written the `AppointmentExpired` event;
/// readers re-derive so that expiry takes effect immediately.
pub fn effective_status(snapshot: &AppointmentSnapshot, now_millis: i64) -> AppointmentStatus {
    if snapshot.status != AppointmentStatus::Pending {
        return snapshot.status;
    }
    composite_status(
        snapshot.store_decision,
        snapshot.provider_decision,
        snapshot.responsibility,
        now_millis,
        snapshot.pending_expires_at,
    )
}

/// Whether a stored snapshot makes its slots unavailable as of `now_millis`
pub fn blocks_slots_at(snapshot: &AppointmentSnapshot, now_millis: i64) -> bool {
    matches!(
        effective_status(snapshot, now_millis),
        AppointmentStatus::Pending | AppointmentStatus::Approved | AppointmentStatus::Completed
    )
}
