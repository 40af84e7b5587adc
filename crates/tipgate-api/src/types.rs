//! Wire types for the Tipgate auth API.
//!
//! This module defines every shape that travels between the store and the
//! remote auth service: the response envelope, the account/entitlement
//! snapshots the pollers consume, and the request bodies for each
//! operation.
//!
//! The server speaks camelCase JSON, so every struct here carries
//! `#[serde(rename_all = "camelCase")]`. Fields the server may omit are
//! `#[serde(default)]` — a missing flag is treated as `false`/empty rather
//! than a decode failure, because a partial snapshot is still usable.

use serde::{Deserialize, Serialize};

use crate::ApiError;

// ---------------------------------------------------------------------------
// Response envelope
// ---------------------------------------------------------------------------

/// The uniform response wrapper the auth service puts around every payload:
///
/// ```text
/// { "status": "success", "message": "...", "data": { ... } }
/// ```
///
/// `data` is absent on pure-acknowledgement responses (logout, password
/// reset requests) and on errors.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ApiEnvelope<T> {
    /// `"success"` or `"error"`.
    #[serde(default)]
    pub status: String,

    /// Human-readable outcome description.
    #[serde(default)]
    pub message: Option<String>,

    /// The operation payload, when the endpoint returns one.
    #[serde(default)]
    pub data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    /// Unwraps the payload, converting an absent `data` into
    /// [`ApiError::MalformedResponse`].
    pub fn into_data(self) -> Result<T, ApiError> {
        self.data.ok_or_else(|| {
            ApiError::MalformedResponse("response envelope has no data".into())
        })
    }

    /// The envelope message, or an empty string when the server sent none.
    pub fn message_or_default(&self) -> String {
        self.message.clone().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Account and entitlement snapshots
// ---------------------------------------------------------------------------

/// The server's full view of an account, returned by register/login,
/// `GET /auth/validate`, and the profile-update endpoints.
///
/// All timestamps are epoch milliseconds. `expiry_date = None` together
/// with `is_admin = true` means a permanent (never-expiring) entitlement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSnapshot {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub profile_image: String,

    #[serde(default)]
    pub is_vip: bool,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_authorized: bool,
    #[serde(default)]
    pub email_verified: bool,

    /// Plan identifier as the server spells it (`"weekly"`, `"monthly"`, ...).
    #[serde(default)]
    pub vip_plan: String,
    #[serde(default)]
    pub vip_plan_display_name: String,
    #[serde(default)]
    pub vip_duration_days: u32,
    #[serde(default)]
    pub activation_date: Option<u64>,
    #[serde(default)]
    pub expiry_date: Option<u64>,
    #[serde(default)]
    pub last_login: Option<u64>,
}

/// Access/refresh token pair issued on register, login, and refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Payload of `POST /auth/register` and `POST /auth/login`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
    pub user: UserSnapshot,
    pub tokens: TokenPair,
}

/// Payload of `POST /auth/refresh-token`. The server may piggyback a fresh
/// user snapshot on the rotation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshPayload {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub user: Option<UserSnapshot>,
}

/// Payload of endpoints that return just a user snapshot
/// (`GET /auth/validate`, the `PATCH /auth/update-*` family).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPayload {
    pub user: UserSnapshot,
}

/// Entitlement snapshot from `GET /auth/vip-status`, consumed by the
/// fast (15 s) poll. This is the authoritative view — local state is a
/// cache of it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VipStatusSnapshot {
    #[serde(default)]
    pub is_vip: bool,
    #[serde(default)]
    pub vip_plan: String,
    #[serde(default)]
    pub vip_plan_display_name: String,
    #[serde(default)]
    pub vip_duration_days: u32,
    #[serde(default)]
    pub activation_date: Option<u64>,
    #[serde(default)]
    pub expiry_date: Option<u64>,
}

/// Broader account flags from `GET /auth/user-status`, consumed by the
/// slow (30 s) poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatusSnapshot {
    #[serde(default)]
    pub is_vip: bool,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_authorized: bool,
    #[serde(default)]
    pub email_verified: bool,
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

/// Body of `POST /auth/register`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub country: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referred_by: Option<String>,
}

/// Body of `POST /auth/login`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Body of `POST /auth/verify-email`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyEmailRequest {
    pub email: String,
    pub verification_code: String,
}

/// Body of `POST /auth/refresh-token`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Body of `POST /auth/process-payment`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    /// Plan identifier (`"weekly"`, `"monthly"`, `"yearly"`, `"custom"`).
    pub plan: String,
    /// Plan length in days.
    pub duration: u32,
    pub amount: f64,
    pub currency: String,
    /// Epoch ms the entitlement starts counting from.
    pub activation_date: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_reference: Option<String>,
}

/// Body of `PATCH /auth/update-profile`. Only the provided fields change.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

/// Body of `PATCH /auth/update-password`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordUpdateRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Body of `PATCH /auth/update-profile-image`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileImageRequest {
    pub profile_image: String,
}

/// Body of `POST /auth/reset-password`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

// =========================================================================
// Tests
// =========================================================================
