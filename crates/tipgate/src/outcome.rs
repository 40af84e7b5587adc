//! The uniform result object every store operation returns.

use crate::StoreError;

/// Outcome of a store operation.
///
/// Operations never surface raw errors — network, server, and shape
/// failures all land here as `success: false` plus a message callers can
/// show. `requires_verification` is the one structured extra: login and
/// register use it to route the caller to the email-verification step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpOutcome {
    pub success: bool,
    pub message: String,
    pub requires_verification: bool,
}

impl OpOutcome {
    /// A successful outcome.
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            requires_verification: false,
        }
    }

    /// A successful outcome that still needs email verification
    /// (register: tokens issued, inbox pending).
    pub fn ok_pending_verification(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            requires_verification: true,
        }
    }

    /// A failed outcome.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            requires_verification: false,
        }
    }

    /// The login gate: the account exists but its email is unverified,
    /// so no session was established.
    pub fn verification_required(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            requires_verification: true,
        }
    }
}

impl From<StoreError> for OpOutcome {
    fn from(err: StoreError) -> Self {
        Self::failure(err.to_string())
    }
}
