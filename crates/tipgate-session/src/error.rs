//! Error types for the session layer.

/// Errors that can occur persisting or restoring a session.
///
/// These never abort startup — a vault that fails to load produces an
/// anonymous session, and a failed save is logged and retried on the
/// next mutation.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The vault's underlying storage failed (file missing permissions,
    /// disk full, ...).
    #[error("vault io failed: {0}")]
    VaultIo(#[from] std::io::Error),

    /// Serializing the persisted subset failed.
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// The stored blob didn't parse as a persisted session.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),
}
