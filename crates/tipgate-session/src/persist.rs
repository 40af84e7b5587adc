//! Session persistence: what survives a restart, and where it goes.
//!
//! Persistence is an explicit allow-list. [`PersistedSession`] mirrors
//! exactly the fields that may be written out — identity, entitlement
//! flags, tokens, timestamps — and nothing else. Runtime-only state
//! (timers, listener registries, the `is_initialized` marker) can never
//! leak into storage because it has no field to land in.
//!
//! The storage itself sits behind the [`SessionVault`] trait so the store
//! doesn't care whether the blob lives in a file, a browser key-value
//! store, or a test's in-memory slot. Vault writes are best-effort: a
//! failed save is logged and life goes on.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{PlanKind, Session, SessionError};

/// Storage key the blob is filed under in namespaced vaults.
pub const VAULT_KEY: &str = "tipgate.session";

// ---------------------------------------------------------------------------
// PersistedSession
// ---------------------------------------------------------------------------

/// The durable subset of a [`Session`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
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
}

impl PersistedSession {
    /// Serializes the blob for the vault.
    pub fn to_json(&self) -> Result<String, SessionError> {
        serde_json::to_string(self).map_err(SessionError::Encode)
    }

    /// Parses a vault blob.
    pub fn from_json(blob: &str) -> Result<Self, SessionError> {
        serde_json::from_str(blob).map_err(SessionError::Decode)
    }
}

/// Copies the allow-listed fields out of a session.
pub fn to_persisted(session: &Session) -> PersistedSession {
    PersistedSession {
        is_authenticated: session.is_authenticated,
        user_id: session.user_id.clone(),
        username: session.username.clone(),
        email: session.email.clone(),
        country: session.country.clone(),
        profile_image: session.profile_image.clone(),
        is_vip: session.is_vip,
        is_admin: session.is_admin,
        is_authorized: session.is_authorized,
        email_verified: session.email_verified,
        plan: session.plan,
        plan_display_name: session.plan_display_name.clone(),
        plan_duration_days: session.plan_duration_days,
        activated_at: session.activated_at,
        expires_at: session.expires_at,
        access_token: session.access_token.clone(),
        refresh_token: session.refresh_token.clone(),
        token_expires_at: session.token_expires_at,
        last_login_at: session.last_login_at,
    }
}

/// Rebuilds a session from a persisted blob, sanitizing states that must
/// not occur:
///
/// - an unauthenticated blob rehydrates as the plain anonymous session,
///   dropping any stray tokens or flags it carried;
/// - a non-admin VIP without an expiry (undefined per the data model)
///   loses the VIP flag and lets the next poll restore server truth.
///
/// `is_initialized` always starts false — startup sequencing has to run
/// again in the new process.
pub fn from_persisted(blob: PersistedSession) -> Session {
    if !blob.is_authenticated {
        return Session::anonymous();
    }

    let mut session = Session::anonymous();
    session.is_authenticated = true;
    session.user_id = blob.user_id;
    session.username = blob.username;
    session.email = blob.email;
    session.country = blob.country;
    session.profile_image = blob.profile_image;
    session.is_vip = blob.is_vip;
    session.is_admin = blob.is_admin;
    session.is_authorized = blob.is_authorized;
    session.email_verified = blob.email_verified;
    session.plan = blob.plan;
    session.plan_display_name = blob.plan_display_name;
    session.plan_duration_days = blob.plan_duration_days;
    session.activated_at = blob.activated_at;
    session.expires_at = blob.expires_at;
    session.access_token = blob.access_token;
    session.refresh_token = blob.refresh_token;
    session.token_expires_at = blob.token_expires_at;
    session.last_login_at = blob.last_login_at;

    if session.is_vip && session.expires_at.is_none() && !session.is_admin {
        warn!("persisted session had non-admin VIP without expiry — dropping flag");
        session.is_vip = false;
    }

    session
}

// ---------------------------------------------------------------------------
// SessionVault
// ---------------------------------------------------------------------------

/// Durable key-value storage for the session blob.
///
/// Implementations must be cheap and non-blocking — the store calls
/// `save` on the mutation path and will not wait on anything slower than
/// a local write.
pub trait SessionVault: Send + Sync + 'static {
    /// Returns the stored blob, or `None` if nothing (readable) is there.
    fn load(&self) -> Option<String>;

    /// Stores the blob, replacing any previous one.
    fn save(&self, blob: &str) -> Result<(), SessionError>;

    /// Removes the stored blob. Removing a missing blob is not an error.
    fn clear(&self) -> Result<(), SessionError>;
}

/// Restores a session from a vault.
///
/// Missing or corrupt blobs produce the anonymous session — startup must
/// never fail because storage went bad.
pub fn restore(vault: &dyn SessionVault) -> Session {
    let Some(blob) = vault.load() else {
        return Session::anonymous();
    };
    match PersistedSession::from_json(&blob) {
        Ok(persisted) => from_persisted(persisted),
        Err(e) => {
            warn!(error = %e, "corrupt persisted session, starting anonymous");
            Session::anonymous()
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryVault
// ---------------------------------------------------------------------------

/// In-memory vault, used by tests and as the fallback when no durable
/// storage is configured.
#[derive(Debug, Default)]
pub struct MemoryVault {
    slot: Mutex<Option<String>>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current contents, for test assertions.
    pub fn contents(&self) -> Option<String> {
        self.slot.lock().expect("vault lock poisoned").clone()
    }
}

impl SessionVault for MemoryVault {
    fn load(&self) -> Option<String> {
        self.slot.lock().expect("vault lock poisoned").clone()
    }

    fn save(&self, blob: &str) -> Result<(), SessionError> {
        *self.slot.lock().expect("vault lock poisoned") = Some(blob.to_owned());
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        *self.slot.lock().expect("vault lock poisoned") = None;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JsonFileVault
// ---------------------------------------------------------------------------

/// File-backed vault: one JSON file at a fixed path.
///
/// This is the durable implementation for environments with a filesystem;
/// embedders with their own key-value storage implement [`SessionVault`]
/// over it instead.
#[derive(Debug)]
pub struct JsonFileVault {
    path: PathBuf,
}

impl JsonFileVault {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Vault file inside `dir`, named after the fixed storage key
    /// ([`VAULT_KEY`]) so every embedder files the blob under the same
    /// namespace.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(format!("{VAULT_KEY}.json")),
        }
    }
}

impl SessionVault for JsonFileVault {
    fn load(&self) -> Option<String> {
        std::fs::read_to_string(&self.path).ok()
    }

    fn save(&self, blob: &str) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, blob)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
