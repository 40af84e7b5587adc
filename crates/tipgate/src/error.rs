//! Unified error type for the Tipgate store.

use tipgate_api::ApiError;
use tipgate_session::SessionError;

/// Top-level error that wraps the crate-specific errors.
///
/// This type stays internal to the store's helpers — public operations
/// convert it into an [`OpOutcome`](crate::OpOutcome) so callers never
/// have to handle (or accidentally propagate) a raw error.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An API-level error (transport, status, response shape).
    #[error(transparent)]
    Api(#[from] ApiError),

    /// A session-level error (persistence encode/decode, vault io).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The operation needs a signed-in session and there is none.
    #[error("not authenticated")]
    NotAuthenticated,

    /// The store's actor task is gone (shut down or panicked).
    #[error("the auth store is not running")]
    Unavailable,
}
