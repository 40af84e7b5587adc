//! Wire types and HTTP client for the Tipgate auth API.
//!
//! This crate is the bottom of the stack: it knows how to talk to the
//! remote auth service and nothing about session state or timers.
//!
//! 1. **Wire types** — the `{status, message, data}` envelope and the
//!    camelCase snapshots/requests ([`types`])
//! 2. **Client seam** — the [`AuthApi`] trait, one method per endpoint
//! 3. **HTTP implementation** — [`HttpAuthApi`] over `reqwest`
//!
//! # How it fits in the stack
//!
//! ```text
//! Store Layer (above)  ← drives operations, owns the Session
//!     ↕
//! API Layer (this crate)  ← HTTP exchanges, error classification
//!     ↕
//! Remote auth service (external)
//! ```

mod client;
mod error;
mod types;

pub use client::{AuthApi, HttpAuthApi};
pub use error::ApiError;
pub use types::{
    ApiEnvelope, AuthPayload, LoginRequest, PasswordUpdateRequest,
    PaymentRequest, ProfileImageRequest, ProfileUpdateRequest,
    RefreshPayload, RefreshRequest, RegisterRequest, ResetPasswordRequest,
    TokenPair, UserPayload, UserSnapshot, UserStatusSnapshot,
    VerifyEmailRequest, VipStatusSnapshot,
};
