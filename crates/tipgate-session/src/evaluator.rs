//! Entitlement evaluation: is the VIP subscription active *right now*?
//!
//! Both functions here are pure — they read the session and a timestamp
//! and return a bool. Correcting an expired-but-still-flagged session is
//! the expiration monitor's and the poller's job; reads never mutate.

use crate::Session;

/// Whether the session's VIP entitlement is currently active.
///
/// 1. Not flagged VIP → inactive, regardless of any other field.
/// 2. Flagged VIP with no expiry → active (permanent entitlement).
/// 3. Otherwise active iff the expiry is strictly in the future.
pub fn vip_active(session: &Session, now_ms: u64) -> bool {
    if !session.is_vip {
        return false;
    }
    match session.expires_at {
        None => true,
        Some(expires_at) => expires_at > now_ms,
    }
}

/// Whether the session is in the transient inconsistent state — flagged
/// VIP with an expiry at or behind `now_ms` — that the expiration monitor
/// must correct by dropping the flag and reconciling with the server.
pub fn needs_expiry_correction(session: &Session, now_ms: u64) -> bool {
    session.is_vip && session.expires_at.is_some_and(|exp| exp <= now_ms)
}

// =========================================================================
// Tests
// =========================================================================
