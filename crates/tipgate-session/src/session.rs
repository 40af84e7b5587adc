//! Session types: the data that represents who is signed in and what
//! they are entitled to.
//!
//! A "session" is the client's record of the signed-in account. It tracks:
//! - WHO the account is (identity fields)
//! - WHAT they may see (entitlement flags and plan)
//! - HOW requests are authenticated (the token pair)
//! - WHEN the entitlement and the access token run out (timestamps)
//!
//! There is exactly one `Session` per store, owned by the store's actor
//! task. Everything else reads copies.

use serde::{Deserialize, Serialize};

use tipgate_api::{UserSnapshot, UserStatusSnapshot, VipStatusSnapshot};

// ---------------------------------------------------------------------------
// PlanKind
// ---------------------------------------------------------------------------

/// The subscription plan attached to a VIP entitlement.
///
/// The server spells plans as lowercase strings; anything it invents that
/// we don't know yet maps to `Custom` so an unknown plan never breaks
/// entitlement handling.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum PlanKind {
    /// No plan — the account has never had (or no longer has) VIP.
    #[default]
    None,
    Weekly,
    Monthly,
    Yearly,
    /// A plan string this client doesn't recognize.
    Custom,
}

impl PlanKind {
    /// Maps the server's plan string onto a kind.
    pub fn from_server(plan: &str) -> Self {
        match plan {
            "" | "none" => Self::None,
            "weekly" => Self::Weekly,
            "monthly" => Self::Monthly,
            "yearly" => Self::Yearly,
            _ => Self::Custom,
        }
    }

    /// The lowercase wire spelling of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
            Self::Custom => "custom",
        }
    }
}

impl std::fmt::Display for PlanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// The client-side account session.
///
/// Invariants:
/// - `is_authenticated == false` implies empty tokens and all entitlement
///   flags false ([`Session::anonymous`] is the only unauthenticated
///   shape).
/// - `is_vip && expires_at.is_none()` is only meaningful together with
///   `is_admin` (a permanent entitlement); rehydration sanitizes the
///   non-admin variant away.
/// - `is_initialized` is process-local bookkeeping and is never persisted.
///
/// All timestamps are epoch milliseconds. `token_expires_at` is a *local
/// estimate* of when the access token stops being valid; the refresh
/// timer fires ahead of it.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub is_authenticated: bool,

    pub user_id: String,
    pub username: String,
    pub email: String,
    pub country: String,
    pub profile_image: String,

    pub is_vip: bool,
    pub is_admin: bool,
    pub is_authorized: bool,
    pub email_verified: bool,

    pub plan: PlanKind,
    pub plan_display_name: String,
    pub plan_duration_days: u32,
    pub activated_at: Option<u64>,
    pub expires_at: Option<u64>,

    pub access_token: String,
    pub refresh_token: String,
    pub token_expires_at: u64,

    pub last_login_at: Option<u64>,

    /// Set once startup sequencing has run; guards against a second
    /// initialization pass.
    pub is_initialized: bool,
}

impl Session {
    /// The empty, signed-out session.
    pub fn anonymous() -> Self {
        Self {
            is_authenticated: false,
            user_id: String::new(),
            username: String::new(),
            email: String::new(),
            country: String::new(),
            profile_image: String::new(),
            is_vip: false,
            is_admin: false,
            is_authorized: false,
            email_verified: false,
            plan: PlanKind::None,
            plan_display_name: String::new(),
            plan_duration_days: 0,
            activated_at: None,
            expires_at: None,
            access_token: String::new(),
            refresh_token: String::new(),
            token_expires_at: 0,
            last_login_at: None,
            is_initialized: false,
        }
    }

    /// Resets to the anonymous session, keeping only the
    /// `is_initialized` marker (signing out doesn't undo startup).
    pub fn clear(&mut self) {
        let initialized = self.is_initialized;
        *self = Self::anonymous();
        self.is_initialized = initialized;
    }

    /// Overwrites identity and entitlement fields from a full account
    /// snapshot. Tokens are not touched — those only change through
    /// login/register/refresh.
    pub fn apply_user_snapshot(&mut self, user: &UserSnapshot) {
        self.user_id = user.id.clone();
        self.username = user.username.clone();
        self.email = user.email.clone();
        self.country = user.country.clone();
        self.profile_image = user.profile_image.clone();
        self.is_vip = user.is_vip;
        self.is_admin = user.is_admin;
        self.is_authorized = user.is_authorized;
        self.email_verified = user.email_verified;
        self.plan = PlanKind::from_server(&user.vip_plan);
        self.plan_display_name = user.vip_plan_display_name.clone();
        self.plan_duration_days = user.vip_duration_days;
        self.activated_at = user.activation_date;
        self.expires_at = user.expiry_date;
        if let Some(last_login) = user.last_login {
            self.last_login_at = Some(last_login);
        }
    }

    /// Overwrites the entitlement fields from a VIP-status snapshot
    /// (the server is authoritative; local values are a cache).
    pub fn apply_vip_snapshot(&mut self, snap: &VipStatusSnapshot) {
        self.is_vip = snap.is_vip;
        self.plan = PlanKind::from_server(&snap.vip_plan);
        self.plan_display_name = snap.vip_plan_display_name.clone();
        self.plan_duration_days = snap.vip_duration_days;
        self.activated_at = snap.activation_date;
        self.expires_at = snap.expiry_date;
    }

    /// `true` when a VIP-status snapshot disagrees with the local cache
    /// in any field the snapshot covers.
    pub fn vip_differs(&self, snap: &VipStatusSnapshot) -> bool {
        self.is_vip != snap.is_vip
            || self.plan != PlanKind::from_server(&snap.vip_plan)
            || self.plan_display_name != snap.vip_plan_display_name
            || self.plan_duration_days != snap.vip_duration_days
            || self.activated_at != snap.activation_date
            || self.expires_at != snap.expiry_date
    }

    /// Overwrites the account flags from a user-status snapshot.
    pub fn apply_status_snapshot(&mut self, snap: &UserStatusSnapshot) {
        self.is_vip = snap.is_vip;
        self.is_admin = snap.is_admin;
        self.is_authorized = snap.is_authorized;
        self.email_verified = snap.email_verified;
    }

    /// Whether the session holds a usable access token.
    pub fn has_access_token(&self) -> bool {
        !self.access_token.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================
