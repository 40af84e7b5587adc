//! The [`AuthApi`] trait and its HTTP implementation.
//!
//! The store never talks to `reqwest` directly — it talks to `AuthApi`,
//! one method per logical endpoint. This is the seam that lets tests
//! substitute a scripted in-memory server for the real one, the same way
//! a mock authenticator stands in for a production JWT validator.

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::ApiError;
use crate::types::{
    ApiEnvelope, AuthPayload, LoginRequest, PasswordUpdateRequest,
    PaymentRequest, ProfileImageRequest, ProfileUpdateRequest,
    RefreshPayload, RefreshRequest, RegisterRequest, ResetPasswordRequest,
    UserPayload, UserSnapshot, UserStatusSnapshot, VerifyEmailRequest,
    VipStatusSnapshot,
};

// ---------------------------------------------------------------------------
// AuthApi trait
// ---------------------------------------------------------------------------

/// One method per auth endpoint the store consumes.
///
/// # Trait bounds
///
/// - `Send + Sync` → the API handle is shared across async tasks (the
///   store actor plus fire-and-forget logout tasks).
/// - `'static` → it owns everything it needs; it lives as long as the
///   store.
///
/// Methods taking an `access` argument hit Bearer-protected endpoints;
/// the rest are anonymous.
pub trait AuthApi: Send + Sync + 'static {
    /// `POST /auth/register`
    fn register(
        &self,
        req: &RegisterRequest,
    ) -> impl Future<Output = Result<AuthPayload, ApiError>> + Send;

    /// `POST /auth/login`
    fn login(
        &self,
        req: &LoginRequest,
    ) -> impl Future<Output = Result<AuthPayload, ApiError>> + Send;

    /// `POST /auth/verify-email`
    fn verify_email(
        &self,
        req: &VerifyEmailRequest,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// `POST /auth/resend-verification`
    fn resend_verification(
        &self,
        email: &str,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// `POST /auth/refresh-token`
    fn refresh_token(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<RefreshPayload, ApiError>> + Send;

    /// `GET /auth/validate` (Bearer)
    fn validate(
        &self,
        access: &str,
    ) -> impl Future<Output = Result<UserSnapshot, ApiError>> + Send;

    /// `GET /auth/vip-status` (Bearer)
    fn vip_status(
        &self,
        access: &str,
    ) -> impl Future<Output = Result<VipStatusSnapshot, ApiError>> + Send;

    /// `GET /auth/user-status` (Bearer)
    fn user_status(
        &self,
        access: &str,
    ) -> impl Future<Output = Result<UserStatusSnapshot, ApiError>> + Send;

    /// `POST /auth/process-payment` (Bearer)
    fn process_payment(
        &self,
        access: &str,
        req: &PaymentRequest,
    ) -> impl Future<Output = Result<VipStatusSnapshot, ApiError>> + Send;

    /// `PATCH /auth/update-profile` (Bearer)
    fn update_profile(
        &self,
        access: &str,
        req: &ProfileUpdateRequest,
    ) -> impl Future<Output = Result<UserSnapshot, ApiError>> + Send;

    /// `PATCH /auth/update-password` (Bearer)
    fn update_password(
        &self,
        access: &str,
        req: &PasswordUpdateRequest,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// `PATCH /auth/update-profile-image` (Bearer)
    fn update_profile_image(
        &self,
        access: &str,
        req: &ProfileImageRequest,
    ) -> impl Future<Output = Result<UserSnapshot, ApiError>> + Send;

    /// `POST /auth/reset-password-request`
    fn request_password_reset(
        &self,
        email: &str,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// `POST /auth/reset-password`
    fn reset_password(
        &self,
        req: &ResetPasswordRequest,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// `DELETE /auth/delete-account` (Bearer)
    fn delete_account(
        &self,
        access: &str,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// `POST /auth/logout` (Bearer, best-effort)
    fn logout(
        &self,
        access: &str,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;
}

// ---------------------------------------------------------------------------
// HttpAuthApi
// ---------------------------------------------------------------------------

/// Shape of an error body when the server sends a parseable envelope.
#[derive(Debug, serde::Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// The production [`AuthApi`]: a thin `reqwest` client speaking the
/// `{status, message, data}` envelope against a base URL.
///
/// Cheap to clone — the inner `reqwest::Client` is an `Arc` internally.
#[derive(Debug, Clone)]
pub struct HttpAuthApi {
    client: Client,
    base_url: Url,
}

impl HttpAuthApi {
    /// Creates a client for the given API base URL
    /// (e.g. `https://api.tipgate.example`).
    pub fn new(base_url: Url) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("tipgate/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, base_url })
    }

    /// Generic request helper: joins the path, attaches the Bearer token
    /// and JSON body when present, and maps the response status onto the
    /// [`ApiError`] taxonomy.
    async fn request<T, R>(
        &self,
        method: Method,
        path: &str,
        bearer: Option<&str>,
        body: Option<&T>,
    ) -> Result<R, ApiError>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.base_url.join(path)?;

        let mut req = self.client.request(method.clone(), url);
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let response = req.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response.json::<R>().await?);
        }

        // Non-2xx: pull the server's message out of the error envelope
        // when there is one, then classify by status.
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .ok()
            .and_then(|b| b.message)
            .unwrap_or(text);

        tracing::debug!(%method, path, status = status.as_u16(), "request rejected");

        Err(match status {
            StatusCode::UNAUTHORIZED => ApiError::Unauthorized(message),
            StatusCode::FORBIDDEN => ApiError::Forbidden(message),
            _ => ApiError::Rejected {
                status: status.as_u16(),
                message,
            },
        })
    }

    /// Request that unwraps the envelope's `data` payload.
    async fn request_data<T, R>(
        &self,
        method: Method,
        path: &str,
        bearer: Option<&str>,
        body: Option<&T>,
    ) -> Result<R, ApiError>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let env: ApiEnvelope<R> =
            self.request(method, path, bearer, body).await?;
        env.into_data()
    }

    /// Request where only the acknowledgement matters — the envelope's
    /// `data` (if any) is discarded.
    async fn request_ack<T>(
        &self,
        method: Method,
        path: &str,
        bearer: Option<&str>,
        body: Option<&T>,
    ) -> Result<(), ApiError>
    where
        T: Serialize + ?Sized,
    {
        let _env: ApiEnvelope<serde_json::Value> =
            self.request(method, path, bearer, body).await?;
        Ok(())
    }
}

impl AuthApi for HttpAuthApi {
    async fn register(
        &self,
        req: &RegisterRequest,
    ) -> Result<AuthPayload, ApiError> {
        self.request_data(Method::POST, "/auth/register", None, Some(req))
            .await
    }

    async fn login(&self, req: &LoginRequest) -> Result<AuthPayload, ApiError> {
        self.request_data(Method::POST, "/auth/login", None, Some(req))
            .await
    }

    async fn verify_email(
        &self,
        req: &VerifyEmailRequest,
    ) -> Result<(), ApiError> {
        self.request_ack(Method::POST, "/auth/verify-email", None, Some(req))
            .await
    }

    async fn resend_verification(&self, email: &str) -> Result<(), ApiError> {
        let body = serde_json::json!({ "email": email });
        self.request_ack(
            Method::POST,
            "/auth/resend-verification",
            None,
            Some(&body),
        )
        .await
    }

    async fn refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<RefreshPayload, ApiError> {
        let body = RefreshRequest {
            refresh_token: refresh_token.to_owned(),
        };
        self.request_data(Method::POST, "/auth/refresh-token", None, Some(&body))
            .await
    }

    async fn validate(&self, access: &str) -> Result<UserSnapshot, ApiError> {
        let payload: UserPayload = self
            .request_data(
                Method::GET,
                "/auth/validate",
                Some(access),
                None::<&()>,
            )
            .await?;
        Ok(payload.user)
    }

    async fn vip_status(
        &self,
        access: &str,
    ) -> Result<VipStatusSnapshot, ApiError> {
        self.request_data(
            Method::GET,
            "/auth/vip-status",
            Some(access),
            None::<&()>,
        )
        .await
    }

    async fn user_status(
        &self,
        access: &str,
    ) -> Result<UserStatusSnapshot, ApiError> {
        self.request_data(
            Method::GET,
            "/auth/user-status",
            Some(access),
            None::<&()>,
        )
        .await
    }

    async fn process_payment(
        &self,
        access: &str,
        req: &PaymentRequest,
    ) -> Result<VipStatusSnapshot, ApiError> {
        self.request_data(
            Method::POST,
            "/auth/process-payment",
            Some(access),
            Some(req),
        )
        .await
    }

    async fn update_profile(
        &self,
        access: &str,
        req: &ProfileUpdateRequest,
    ) -> Result<UserSnapshot, ApiError> {
        let payload: UserPayload = self
            .request_data(
                Method::PATCH,
                "/auth/update-profile",
                Some(access),
                Some(req),
            )
            .await?;
        Ok(payload.user)
    }

    async fn update_password(
        &self,
        access: &str,
        req: &PasswordUpdateRequest,
    ) -> Result<(), ApiError> {
        self.request_ack(
            Method::PATCH,
            "/auth/update-password",
            Some(access),
            Some(req),
        )
        .await
    }

    async fn update_profile_image(
        &self,
        access: &str,
        req: &ProfileImageRequest,
    ) -> Result<UserSnapshot, ApiError> {
        let payload: UserPayload = self
            .request_data(
                Method::PATCH,
                "/auth/update-profile-image",
                Some(access),
                Some(req),
            )
            .await?;
        Ok(payload.user)
    }

    async fn request_password_reset(&self, email: &str) -> Result<(), ApiError> {
        let body = serde_json::json!({ "email": email });
        self.request_ack(
            Method::POST,
            "/auth/reset-password-request",
            None,
            Some(&body),
        )
        .await
    }

    async fn reset_password(
        &self,
        req: &ResetPasswordRequest,
    ) -> Result<(), ApiError> {
        self.request_ack(Method::POST, "/auth/reset-password", None, Some(req))
            .await
    }

    async fn delete_account(&self, access: &str) -> Result<(), ApiError> {
        self.request_ack(
            Method::DELETE,
            "/auth/delete-account",
            Some(access),
            None::<&()>,
        )
        .await
    }

    async fn logout(&self, access: &str) -> Result<(), ApiError> {
        self.request_ack(
            Method::POST,
            "/auth/logout",
            Some(access),
            None::<&()>,
        )
        .await
    }
}
