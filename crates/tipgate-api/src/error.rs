//! Error types for the API layer.
//!
//! Each crate in Tipgate defines its own error enum. An `ApiError` always
//! means the HTTP exchange itself went wrong — transport, status, or
//! response shape — never that local session state is inconsistent.

/// Errors that can occur talking to the auth service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request never completed: DNS, connect, TLS, timeout, or a
    /// body that failed to read/decode at the transport level.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The endpoint path could not be joined onto the base URL.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// HTTP 401 — the access token is expired or revoked. The caller
    /// gets exactly one refresh attempt before this escalates to a
    /// local logout.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// HTTP 403 — authenticated but not entitled (e.g. an expired VIP
    /// hitting a VIP-only read). Does not invalidate the session.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Any other non-success status, with the server's message when it
    /// sent a parseable envelope.
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The response parsed as JSON but is missing the fields this
    /// operation requires.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl ApiError {
    /// `true` for the 401 class that should trigger a token refresh.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    /// `true` for the 403 class — surfaced to the caller, session kept.
    pub fn is_entitlement_failure(&self) -> bool {
        matches!(self, Self::Forbidden(_))
    }
}
