//! Entitlement events and the notifier that fans them out.
//!
//! The store has one internal emitter with two delivery surfaces:
//!
//! - **Registered callbacks** — components holding a live handle register
//!   a `(new_active, old_active)` closure and get called synchronously,
//!   inside the actor, right after the mutation commits.
//! - **Broadcast events** — a `tokio::sync::broadcast` channel of typed
//!   [`StoreEvent`]s for consumers that can't hold a callback (the
//!   analogue of a page-wide DOM event).
//!
//! Both fire from the same place, so neither can observe a half-updated
//! session.

use std::collections::HashMap;

use tokio::sync::broadcast;
use tracing::trace;

use tipgate_api::UserStatusSnapshot;
use tipgate_session::Session;

// ---------------------------------------------------------------------------
// Event payloads
// ---------------------------------------------------------------------------

/// A change in the computed entitlement status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VipTransition {
    /// The evaluator's result after the mutation.
    pub new_active: bool,
    /// The evaluator's result immediately before the mutation.
    pub old_active: bool,
    /// When the transition was committed (epoch ms).
    pub at_ms: u64,
}

/// The diff the slow status poll found between local flags and server
/// truth. `Some(v)` means the field changed to `v`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusChanges {
    pub is_vip: Option<bool>,
    pub is_admin: Option<bool>,
    pub is_authorized: Option<bool>,
    pub email_verified: Option<bool>,
}

impl StatusChanges {
    /// Compares local flags against a server snapshot.
    pub fn diff(session: &Session, snap: &UserStatusSnapshot) -> Self {
        let changed = |old: bool, new: bool| (old != new).then_some(new);
        Self {
            is_vip: changed(session.is_vip, snap.is_vip),
            is_admin: changed(session.is_admin, snap.is_admin),
            is_authorized: changed(session.is_authorized, snap.is_authorized),
            email_verified: changed(session.email_verified, snap.email_verified),
        }
    }

    /// `true` when no field differs.
    pub fn is_empty(&self) -> bool {
        self.is_vip.is_none()
            && self.is_admin.is_none()
            && self.is_authorized.is_none()
            && self.email_verified.is_none()
    }
}

/// Events on the store's broadcast channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    /// The entitlement evaluator flipped.
    VipTransition(VipTransition),
    /// The status poll reconciled one or more account flags.
    StatusUpdate(StatusChanges),
}

// ---------------------------------------------------------------------------
// Listener registry
// ---------------------------------------------------------------------------

/// Identifies a registered VIP-status callback, for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L-{}", self.0)
    }
}

/// A registered `(new_active, old_active)` callback.
pub type VipCallback = Box<dyn FnMut(bool, bool) + Send + 'static>;

/// The store's single event emitter: callback registry plus broadcast
/// sender. Owned by the actor; never shared.
pub(crate) struct Notifier {
    listeners: HashMap<ListenerId, VipCallback>,
    next_listener: u64,
    events: broadcast::Sender<StoreEvent>,
}

impl Notifier {
    pub(crate) fn new(events: broadcast::Sender<StoreEvent>) -> Self {
        Self {
            listeners: HashMap::new(),
            next_listener: 1,
            events,
        }
    }

    pub(crate) fn add_listener(&mut self, callback: VipCallback) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.insert(id, callback);
        trace!(%id, listeners = self.listeners.len(), "vip listener added");
        id
    }

    pub(crate) fn remove_listener(&mut self, id: ListenerId) -> bool {
        let removed = self.listeners.remove(&id).is_some();
        if removed {
            trace!(%id, "vip listener removed");
        }
        removed
    }

    /// Fans a committed transition out to every callback, then to the
    /// broadcast channel. A send with no broadcast subscribers is fine.
    pub(crate) fn vip_transition(
        &mut self,
        new_active: bool,
        old_active: bool,
        at_ms: u64,
    ) {
        tracing::info!(new_active, old_active, "vip entitlement transition");
        for callback in self.listeners.values_mut() {
            callback(new_active, old_active);
        }
        let _ = self.events.send(StoreEvent::VipTransition(VipTransition {
            new_active,
            old_active,
            at_ms,
        }));
    }

    /// Broadcasts a reconciliation diff from the status poll.
    pub(crate) fn status_update(&self, changes: StatusChanges) {
        let _ = self.events.send(StoreEvent::StatusUpdate(changes));
    }
}

// =========================================================================
// Tests
// =========================================================================
