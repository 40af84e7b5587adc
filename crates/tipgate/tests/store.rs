//! Integration tests for the auth store.
//!
//! A scripted [`MockApi`] stands in for the remote auth service: it keeps
//! one in-memory account record, hands out sequential token pairs, and
//! records every call so tests can assert on timer-driven traffic. Time
//! is fully simulated (`start_paused`), so "advance 49 minutes" costs
//! nothing and timer behavior is deterministic.
//!
//! Timestamps: every test anchors the store clock at `BASE` via
//! `Clock::starting_at`, so expiry arithmetic is exact.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tipgate::{AuthStore, StoreConfig, StoreEvent, VipTransition};
use tipgate_api::{
    ApiError, AuthApi, AuthPayload, LoginRequest, PasswordUpdateRequest,
    PaymentRequest, ProfileImageRequest, ProfileUpdateRequest,
    RefreshPayload, RegisterRequest, ResetPasswordRequest, TokenPair,
    UserSnapshot, UserStatusSnapshot, VerifyEmailRequest, VipStatusSnapshot,
};
use tipgate_sched::Clock;
use tipgate_session::{MemoryVault, PlanKind, Session, SessionVault, to_persisted};

/// Fixed wall-clock anchor for every test.
const BASE: u64 = 1_700_000_000_000;

const DAY_MS: u64 = 24 * 3600 * 1000;

// =========================================================================
// MockApi
// =========================================================================

/// A tiny in-memory auth service.
///
/// `record` is the server-side account; mutating it between sleeps is how
/// tests simulate changes happening "on the server" (a payment from
/// another device, an admin flipping a flag, an entitlement expiring).
struct MockApi {
    /// Every endpoint hit, in order.
    calls: Mutex<Vec<&'static str>>,
    /// The server's account record.
    record: Mutex<UserSnapshot>,
    /// When set, refresh-token exchanges are rejected.
    fail_refresh: AtomicBool,
    /// When set, the vip-status endpoint returns a 500.
    fail_vip_poll: AtomicBool,
    /// When set, the validate endpoint returns a 503.
    fail_validate: AtomicBool,
    /// One-shot: the next vip-status call returns a 401, then the flag
    /// clears itself.
    vip_unauthorized_once: AtomicBool,
    token_counter: AtomicU64,
}

impl MockApi {
    fn new(record: UserSnapshot) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            record: Mutex::new(record),
            fail_refresh: AtomicBool::new(false),
            fail_vip_poll: AtomicBool::new(false),
            fail_validate: AtomicBool::new(false),
            vip_unauthorized_once: AtomicBool::new(false),
            token_counter: AtomicU64::new(0),
        })
    }

    fn note(&self, endpoint: &'static str) {
        self.calls.lock().unwrap().push(endpoint);
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn count_of(&self, endpoint: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| **c == endpoint)
            .count()
    }

    fn user(&self) -> UserSnapshot {
        self.record.lock().unwrap().clone()
    }

    fn set_user(&self, update: impl FnOnce(&mut UserSnapshot)) {
        update(&mut self.record.lock().unwrap());
    }

    fn fresh_tokens(&self) -> TokenPair {
        let n = self.token_counter.fetch_add(1, Ordering::Relaxed) + 1;
        TokenPair {
            access_token: format!("at-{n}"),
            refresh_token: format!("rt-{n}"),
        }
    }
}

impl AuthApi for MockApi {
    async fn register(
        &self,
        _req: &RegisterRequest,
    ) -> Result<AuthPayload, ApiError> {
        self.note("register");
        Ok(AuthPayload {
            user: self.user(),
            tokens: self.fresh_tokens(),
        })
    }

    async fn login(&self, _req: &LoginRequest) -> Result<AuthPayload, ApiError> {
        self.note("login");
        Ok(AuthPayload {
            user: self.user(),
            tokens: self.fresh_tokens(),
        })
    }

    async fn verify_email(
        &self,
        _req: &VerifyEmailRequest,
    ) -> Result<(), ApiError> {
        self.note("verify_email");
        self.set_user(|u| u.email_verified = true);
        Ok(())
    }

    async fn resend_verification(&self, _email: &str) -> Result<(), ApiError> {
        self.note("resend_verification");
        Ok(())
    }

    async fn refresh_token(
        &self,
        _refresh_token: &str,
    ) -> Result<RefreshPayload, ApiError> {
        self.note("refresh");
        if self.fail_refresh.load(Ordering::Relaxed) {
            return Err(ApiError::Unauthorized("refresh token revoked".into()));
        }
        let tokens = self.fresh_tokens();
        Ok(RefreshPayload {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            user: None,
        })
    }

    async fn validate(&self, _access: &str) -> Result<UserSnapshot, ApiError> {
        self.note("validate");
        if self.fail_validate.load(Ordering::Relaxed) {
            return Err(ApiError::Rejected {
                status: 503,
                message: "upstream unavailable".into(),
            });
        }
        Ok(self.user())
    }

    async fn vip_status(
        &self,
        _access: &str,
    ) -> Result<VipStatusSnapshot, ApiError> {
        self.note("vip_status");
        if self.vip_unauthorized_once.swap(false, Ordering::Relaxed) {
            return Err(ApiError::Unauthorized("token expired".into()));
        }
        if self.fail_vip_poll.load(Ordering::Relaxed) {
            return Err(ApiError::Rejected {
                status: 500,
                message: "upstream unavailable".into(),
            });
        }
        let u = self.user();
        Ok(VipStatusSnapshot {
            is_vip: u.is_vip,
            vip_plan: u.vip_plan,
            vip_plan_display_name: u.vip_plan_display_name,
            vip_duration_days: u.vip_duration_days,
            activation_date: u.activation_date,
            expiry_date: u.expiry_date,
        })
    }

    async fn user_status(
        &self,
        _access: &str,
    ) -> Result<UserStatusSnapshot, ApiError> {
        self.note("user_status");
        let u = self.user();
        Ok(UserStatusSnapshot {
            is_vip: u.is_vip,
            is_admin: u.is_admin,
            is_authorized: u.is_authorized,
            email_verified: u.email_verified,
        })
    }

    async fn process_payment(
        &self,
        _access: &str,
        req: &PaymentRequest,
    ) -> Result<VipStatusSnapshot, ApiError> {
        self.note("process_payment");
        let expiry = req.activation_date + u64::from(req.duration) * DAY_MS;
        self.set_user(|u| {
            u.is_vip = true;
            u.vip_plan = req.plan.clone();
            u.vip_plan_display_name = format!("{} VIP", req.plan);
            u.vip_duration_days = req.duration;
            u.activation_date = Some(req.activation_date);
            u.expiry_date = Some(expiry);
        });
        let u = self.user();
        Ok(VipStatusSnapshot {
            is_vip: true,
            vip_plan: u.vip_plan,
            vip_plan_display_name: u.vip_plan_display_name,
            vip_duration_days: u.vip_duration_days,
            activation_date: u.activation_date,
            expiry_date: u.expiry_date,
        })
    }

    async fn update_profile(
        &self,
        _access: &str,
        req: &ProfileUpdateRequest,
    ) -> Result<UserSnapshot, ApiError> {
        self.note("update_profile");
        self.set_user(|u| {
            if let Some(username) = &req.username {
                u.username = username.clone();
            }
            if let Some(country) = &req.country {
                u.country = country.clone();
            }
        });
        Ok(self.user())
    }

    async fn update_password(
        &self,
        _access: &str,
        _req: &PasswordUpdateRequest,
    ) -> Result<(), ApiError> {
        self.note("update_password");
        Ok(())
    }

    async fn update_profile_image(
        &self,
        _access: &str,
        req: &ProfileImageRequest,
    ) -> Result<UserSnapshot, ApiError> {
        self.note("update_profile_image");
        self.set_user(|u| u.profile_image = req.profile_image.clone());
        Ok(self.user())
    }

    async fn request_password_reset(&self, _email: &str) -> Result<(), ApiError> {
        self.note("request_password_reset");
        Ok(())
    }

    async fn reset_password(
        &self,
        _req: &ResetPasswordRequest,
    ) -> Result<(), ApiError> {
        self.note("reset_password");
        Ok(())
    }

    async fn delete_account(&self, _access: &str) -> Result<(), ApiError> {
        self.note("delete_account");
        Ok(())
    }

    async fn logout(&self, _access: &str) -> Result<(), ApiError> {
        self.note("logout");
        Ok(())
    }
}

// =========================================================================
// Helpers
// =========================================================================

/// A verified free-tier account record.
fn free_user() -> UserSnapshot {
    UserSnapshot {
        id: "u-1".into(),
        username: "ade".into(),
        email: "ade@example.com".into(),
        country: "NG".into(),
        email_verified: true,
        is_authorized: true,
        ..UserSnapshot::default()
    }
}

/// Store config with deterministic (jitter-free) poll starts.
fn test_config() -> StoreConfig {
    StoreConfig {
        poll_start_jitter: Duration::ZERO,
        ..StoreConfig::default()
    }
}

/// Spawns a store against the given mock, anchored at `BASE`.
fn spawn_store(api: &Arc<MockApi>) -> (AuthStore, Arc<MemoryVault>) {
    let vault = Arc::new(MemoryVault::new());
    let store = AuthStore::spawn_with_clock(
        Arc::clone(api),
        vault.clone(),
        test_config(),
        Clock::starting_at(BASE),
    );
    (store, vault)
}

/// Registers a transition-recording listener on the store.
async fn record_transitions(store: &AuthStore) -> Arc<Mutex<Vec<(bool, bool)>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    store
        .add_vip_status_listener(move |new, old| {
            sink.lock().unwrap().push((new, old));
        })
        .await
        .expect("store should be running");
    seen
}

/// Seeds the vault with a stored authenticated session.
fn seed_vault(vault: &MemoryVault, session: &Session) {
    let blob = to_persisted(session).to_json().unwrap();
    vault.save(&blob).unwrap();
}

/// A stored session whose access token is still comfortably fresh.
fn stored_session(user: &UserSnapshot) -> Session {
    let mut s = Session::anonymous();
    s.is_authenticated = true;
    s.apply_user_snapshot(user);
    s.access_token = "stored-at".into();
    s.refresh_token = "stored-rt".into();
    s.token_expires_at = BASE + 10 * 60 * 1000;
    s
}

async fn sleep_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

// =========================================================================
// Initialization
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_initialize_empty_vault_starts_anonymous() {
    let api = MockApi::new(free_user());
    let (store, _vault) = spawn_store(&api);

    let outcome = store.initialize().await;

    assert!(outcome.success);
    let session = store.snapshot().await;
    assert!(!session.is_authenticated);
    assert!(session.is_initialized);
    assert!(!store.is_vip_active().await);
    assert_eq!(api.call_count(), 0, "anonymous startup makes no requests");
}

#[tokio::test(start_paused = true)]
async fn test_initialize_second_call_is_a_noop() {
    let api = MockApi::new(free_user());
    let (store, vault) = spawn_store(&api);
    seed_vault(&vault, &stored_session(&free_user()));

    store.initialize().await;
    let validations = api.count_of("validate");

    store.initialize().await;

    assert_eq!(
        api.count_of("validate"),
        validations,
        "a second initialize must not re-run startup"
    );
}

#[tokio::test(start_paused = true)]
async fn test_initialize_restores_and_validates_stored_session() {
    let api = MockApi::new(free_user());
    let (store, vault) = spawn_store(&api);
    seed_vault(&vault, &stored_session(&free_user()));

    let outcome = store.initialize().await;

    assert!(outcome.success);
    assert_eq!(api.count_of("validate"), 1);
    let session = store.snapshot().await;
    assert!(session.is_authenticated);
    assert_eq!(session.user_id, "u-1");
    assert_eq!(session.access_token, "stored-at");
}

#[tokio::test(start_paused = true)]
async fn test_initialize_refreshes_stale_token() {
    let api = MockApi::new(free_user());
    let (store, vault) = spawn_store(&api);
    let mut stored = stored_session(&free_user());
    stored.token_expires_at = BASE; // already dead
    seed_vault(&vault, &stored);

    let outcome = store.initialize().await;

    assert!(outcome.success);
    assert_eq!(api.count_of("refresh"), 1);
    let session = store.snapshot().await;
    assert!(session.is_authenticated);
    assert_eq!(session.access_token, "at-1", "token pair was rotated");
}

#[tokio::test(start_paused = true)]
async fn test_initialize_refresh_failure_clears_stored_session() {
    let api = MockApi::new(free_user());
    api.fail_refresh.store(true, Ordering::Relaxed);
    let (store, vault) = spawn_store(&api);
    let mut stored = stored_session(&free_user());
    stored.token_expires_at = BASE;
    seed_vault(&vault, &stored);

    let outcome = store.initialize().await;

    assert!(!outcome.success);
    let session = store.snapshot().await;
    assert!(!session.is_authenticated);
    assert!(session.access_token.is_empty());
    assert!(vault.contents().is_none(), "vault cleared with the session");
}

#[tokio::test(start_paused = true)]
async fn test_initialize_tolerates_validate_outage() {
    // Offline start: validate fails with a non-auth error; the local
    // session is kept and polls take over once the network is back.
    let api = MockApi::new(free_user());
    api.fail_validate.store(true, Ordering::Relaxed);
    let (store, vault) = spawn_store(&api);
    seed_vault(&vault, &stored_session(&free_user()));

    let outcome = store.initialize().await;

    assert!(outcome.success);
    assert_eq!(api.count_of("validate"), 1);
    assert!(store.snapshot().await.is_authenticated);
}

// =========================================================================
// Login gate and registration (Scenario A)
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_login_establishes_session() {
    let api = MockApi::new(free_user());
    let (store, vault) = spawn_store(&api);
    store.initialize().await;

    let outcome = store.login("ade@example.com", "secret").await;

    assert!(outcome.success);
    let session = store.snapshot().await;
    assert!(session.is_authenticated);
    assert_eq!(session.username, "ade");
    assert_eq!(session.access_token, "at-1");
    assert_eq!(session.token_expires_at, BASE + 50 * 60 * 1000);
    assert_eq!(session.last_login_at, Some(BASE));
    assert!(vault.contents().is_some(), "session persisted on login");
}

#[tokio::test(start_paused = true)]
async fn test_login_unverified_email_is_rejected_without_session() {
    let mut record = free_user();
    record.email_verified = false;
    let api = MockApi::new(record);
    let (store, vault) = spawn_store(&api);
    store.initialize().await;

    let outcome = store.login("ade@example.com", "secret").await;

    assert!(!outcome.success);
    assert!(outcome.requires_verification);
    let session = store.snapshot().await;
    assert!(!session.is_authenticated, "no session before verification");
    assert!(session.access_token.is_empty(), "no tokens stored");
    assert!(vault.contents().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_register_issues_tokens_before_verification() {
    let mut record = free_user();
    record.email_verified = false;
    let api = MockApi::new(record);
    let (store, _vault) = spawn_store(&api);
    store.initialize().await;

    let outcome = store
        .register(RegisterRequest {
            username: "ade".into(),
            email: "ade@example.com".into(),
            password: "secret".into(),
            country: "NG".into(),
            referred_by: None,
        })
        .await;

    assert!(outcome.success);
    assert!(outcome.requires_verification);
    let session = store.snapshot().await;
    assert!(session.is_authenticated, "register signs the user in");
    assert!(!session.email_verified);
    assert!(session.has_access_token());
}

#[tokio::test(start_paused = true)]
async fn test_verify_email_flips_the_session_flag() {
    let mut record = free_user();
    record.email_verified = false;
    let api = MockApi::new(record);
    let (store, _vault) = spawn_store(&api);
    store.initialize().await;
    store
        .register(RegisterRequest {
            username: "ade".into(),
            email: "ade@example.com".into(),
            password: "secret".into(),
            country: "NG".into(),
            referred_by: None,
        })
        .await;

    let outcome = store.verify_email("ade@example.com", "123456").await;

    assert!(outcome.success);
    assert!(store.snapshot().await.email_verified);
}

// =========================================================================
// Token lifecycle
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_refresh_fires_once_ahead_of_expiry() {
    let api = MockApi::new(free_user());
    let (store, _vault) = spawn_store(&api);
    store.initialize().await;
    store.login("ade@example.com", "secret").await;

    // Refresh is due at ttl - lead = 49 minutes.
    sleep_ms(49 * 60 * 1000 + 500).await;

    assert_eq!(api.count_of("refresh"), 1);
    let session = store.snapshot().await;
    assert!(session.is_authenticated);
    assert_eq!(session.access_token, "at-2", "token pair rotated");
}

#[tokio::test(start_paused = true)]
async fn test_double_login_leaves_one_refresh_timer() {
    // Re-arming the refresh schedule must replace the old timer, not
    // stack a second one.
    let api = MockApi::new(free_user());
    let (store, _vault) = spawn_store(&api);
    store.initialize().await;
    store.login("ade@example.com", "secret").await;
    store.login("ade@example.com", "secret").await;

    sleep_ms(49 * 60 * 1000 + 500).await;

    assert_eq!(api.count_of("refresh"), 1, "exactly one refresh fired");
}

#[tokio::test(start_paused = true)]
async fn test_refresh_reschedules_itself() {
    let api = MockApi::new(free_user());
    let (store, _vault) = spawn_store(&api);
    store.initialize().await;
    store.login("ade@example.com", "secret").await;

    // Two full refresh windows.
    sleep_ms(49 * 60 * 1000 + 500).await;
    sleep_ms(49 * 60 * 1000 + 500).await;

    assert_eq!(api.count_of("refresh"), 2);
    assert!(store.snapshot().await.is_authenticated);
}

#[tokio::test(start_paused = true)]
async fn test_refresh_failure_signs_the_session_out() {
    let api = MockApi::new(free_user());
    let (store, vault) = spawn_store(&api);
    store.initialize().await;
    store.login("ade@example.com", "secret").await;

    api.fail_refresh.store(true, Ordering::Relaxed);
    sleep_ms(49 * 60 * 1000 + 500).await;

    let session = store.snapshot().await;
    assert!(!session.is_authenticated);
    assert!(session.access_token.is_empty());
    assert!(session.refresh_token.is_empty());
    assert!(vault.contents().is_none());

    // Terminal: no retry loop.
    let refreshes = api.count_of("refresh");
    sleep_ms(2 * 60 * 60 * 1000).await;
    assert_eq!(api.count_of("refresh"), refreshes);
}

// =========================================================================
// Logout (timer cancellation)
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_logout_clears_session_and_vault() {
    let api = MockApi::new(free_user());
    let (store, vault) = spawn_store(&api);
    store.initialize().await;
    store.login("ade@example.com", "secret").await;

    let outcome = store.logout().await;

    assert!(outcome.success);
    assert!(!store.snapshot().await.is_authenticated);
    assert!(vault.contents().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_logout_stops_all_timer_traffic() {
    let api = MockApi::new(free_user());
    let (store, _vault) = spawn_store(&api);
    store.initialize().await;
    store.login("ade@example.com", "secret").await;
    sleep_ms(31_000).await; // let a few polls run first

    store.logout().await;
    sleep_ms(10).await; // allow the fire-and-forget server notify to land
    assert_eq!(api.count_of("logout"), 1);
    let after_logout = api.call_count();

    // Hours of simulated time: nothing scoped to the old session fires.
    sleep_ms(6 * 60 * 60 * 1000).await;
    assert_eq!(
        api.call_count(),
        after_logout,
        "no timer traffic after logout"
    );
}

#[tokio::test(start_paused = true)]
async fn test_logout_when_anonymous_is_ok() {
    let api = MockApi::new(free_user());
    let (store, _vault) = spawn_store(&api);
    store.initialize().await;

    let outcome = store.logout().await;

    assert!(outcome.success);
    assert_eq!(api.count_of("logout"), 0, "no server call without a session");
}

// =========================================================================
// Entitlement polling
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_vip_poll_applies_server_truth() {
    let api = MockApi::new(free_user());
    let (store, _vault) = spawn_store(&api);
    store.initialize().await;
    store.login("ade@example.com", "secret").await;
    let transitions = record_transitions(&store).await;

    // A payment lands on another device: the server record goes VIP.
    api.set_user(|u| {
        u.is_vip = true;
        u.vip_plan = "monthly".into();
        u.vip_plan_display_name = "Monthly VIP".into();
        u.vip_duration_days = 30;
        u.activation_date = Some(BASE);
        u.expiry_date = Some(BASE + 30 * DAY_MS);
    });
    sleep_ms(15_100).await; // one vip-poll period

    let session = store.snapshot().await;
    assert!(session.is_vip);
    assert_eq!(session.plan, PlanKind::Monthly);
    assert_eq!(session.expires_at, Some(BASE + 30 * DAY_MS));
    assert!(store.is_vip_active().await);
    assert_eq!(*transitions.lock().unwrap(), vec![(true, false)]);
}

#[tokio::test(start_paused = true)]
async fn test_vip_poll_failure_keeps_the_schedule() {
    let api = MockApi::new(free_user());
    let (store, _vault) = spawn_store(&api);
    store.initialize().await;
    store.login("ade@example.com", "secret").await;

    // Two failing polls must not kill the cadence.
    api.fail_vip_poll.store(true, Ordering::Relaxed);
    sleep_ms(31_000).await;
    assert!(api.count_of("vip_status") >= 2);

    api.fail_vip_poll.store(false, Ordering::Relaxed);
    api.set_user(|u| {
        u.is_vip = true;
        u.vip_plan = "weekly".into();
        u.vip_duration_days = 7;
        u.activation_date = Some(BASE);
        u.expiry_date = Some(BASE + 7 * DAY_MS);
    });
    sleep_ms(15_100).await;

    assert!(
        store.snapshot().await.is_vip,
        "poll recovered and reconciled after the outage"
    );
}

#[tokio::test(start_paused = true)]
async fn test_polls_are_noops_when_anonymous() {
    let api = MockApi::new(free_user());
    let (store, _vault) = spawn_store(&api);
    store.initialize().await;

    sleep_ms(5 * 60 * 1000).await;

    assert_eq!(api.count_of("vip_status"), 0);
    assert_eq!(api.count_of("user_status"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_poll_401_refreshes_token_and_recovers() {
    // A 401 from a poll gets exactly one refresh attempt; on success the
    // session keeps running on the rotated pair.
    let api = MockApi::new(free_user());
    let (store, _vault) = spawn_store(&api);
    store.initialize().await;
    store.login("ade@example.com", "secret").await;

    api.vip_unauthorized_once.store(true, Ordering::Relaxed);
    sleep_ms(15_100).await; // the poll that hits the 401

    assert_eq!(api.count_of("refresh"), 1);
    let session = store.snapshot().await;
    assert!(session.is_authenticated, "one refresh rescues the session");
    assert_eq!(session.access_token, "at-2");
}

#[tokio::test(start_paused = true)]
async fn test_reconcile_runs_both_checks_immediately() {
    let api = MockApi::new(free_user());
    let (store, _vault) = spawn_store(&api);
    store.initialize().await;
    store.login("ade@example.com", "secret").await;

    api.set_user(|u| {
        u.is_vip = true;
        u.vip_plan = "yearly".into();
        u.vip_duration_days = 365;
        u.activation_date = Some(BASE);
        u.expiry_date = Some(BASE + 365 * DAY_MS);
    });
    let outcome = store.reconcile().await;

    assert!(outcome.success);
    assert_eq!(api.count_of("vip_status"), 1);
    assert_eq!(api.count_of("user_status"), 1);
    assert!(store.snapshot().await.is_vip, "no poll tick was needed");
}

#[tokio::test(start_paused = true)]
async fn test_user_status_poll_broadcasts_the_diff() {
    let api = MockApi::new(free_user());
    let (store, _vault) = spawn_store(&api);
    store.initialize().await;
    store.login("ade@example.com", "secret").await;
    let mut events = store.subscribe();

    api.set_user(|u| u.is_authorized = false);
    sleep_ms(30_100).await; // one user-poll period
    store.snapshot().await; // sync with the actor

    let mut status_updates = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let StoreEvent::StatusUpdate(changes) = event {
            status_updates.push(changes);
        }
    }
    assert_eq!(status_updates.len(), 1);
    assert_eq!(status_updates[0].is_authorized, Some(false));
    assert_eq!(status_updates[0].is_admin, None);
    assert!(!store.snapshot().await.is_authorized);
}

// =========================================================================
// Expiration monitor (Scenario C / self-healing)
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_expiry_self_heals_with_one_transition() {
    // The user's VIP runs out two seconds from now and the server agrees
    // it is over. The monitor flips the flag locally, reconciles, and
    // exactly one (false, true) transition reaches listeners.
    let mut record = free_user();
    record.is_vip = true;
    record.vip_plan = "monthly".into();
    record.vip_duration_days = 30;
    record.activation_date = Some(BASE - 30 * DAY_MS);
    record.expiry_date = Some(BASE + 2_000);
    let api = MockApi::new(record);
    let (store, _vault) = spawn_store(&api);
    store.initialize().await;
    store.login("ade@example.com", "secret").await;
    assert!(store.is_vip_active().await);

    let transitions = record_transitions(&store).await;
    api.set_user(|u| u.is_vip = false); // the server notices the expiry too

    // Inside the final minute the monitor rechecks every 5 seconds.
    sleep_ms(5_100).await;

    assert!(!store.is_vip_active().await);
    let session = store.snapshot().await;
    assert!(!session.is_vip);
    assert_eq!(
        *transitions.lock().unwrap(),
        vec![(false, true)],
        "exactly one transition for the expiry"
    );
    assert!(
        api.count_of("vip_status") >= 1,
        "expiry forces a server reconciliation"
    );
    assert!(api.count_of("user_status") >= 1);
}

#[tokio::test(start_paused = true)]
async fn test_expiry_monitor_uses_coarse_cadence_far_out() {
    // With 10 minutes left, nothing should flip within the first checks.
    let mut record = free_user();
    record.is_vip = true;
    record.vip_plan = "monthly".into();
    record.expiry_date = Some(BASE + 10 * 60 * 1000);
    record.activation_date = Some(BASE);
    let api = MockApi::new(record);
    let (store, _vault) = spawn_store(&api);
    store.initialize().await;
    store.login("ade@example.com", "secret").await;

    sleep_ms(60_000).await;
    assert!(store.is_vip_active().await, "entitlement intact mid-plan");

    // Walk past the expiry; the monitor (now on the fine cadence)
    // catches it.
    sleep_ms(10 * 60 * 1000).await;
    assert!(!store.is_vip_active().await);
}

#[tokio::test(start_paused = true)]
async fn test_permanent_admin_entitlement_never_expires() {
    let mut record = free_user();
    record.is_vip = true;
    record.is_admin = true;
    record.expiry_date = None;
    let api = MockApi::new(record);
    let (store, _vault) = spawn_store(&api);
    store.initialize().await;
    store.login("ade@example.com", "secret").await;
    let transitions = record_transitions(&store).await;

    sleep_ms(3 * 60 * 60 * 1000).await;

    assert!(store.is_vip_active().await);
    assert!(store.snapshot().await.is_vip);
    assert!(
        transitions.lock().unwrap().is_empty(),
        "no correction may fire for a permanent session"
    );
}

// =========================================================================
// Payment (Scenario B)
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_process_payment_unlocks_monthly_vip() {
    let api = MockApi::new(free_user());
    let (store, _vault) = spawn_store(&api);
    store.initialize().await;
    store.login("ade@example.com", "secret").await;
    let transitions = record_transitions(&store).await;

    let outcome = store
        .process_payment(PaymentRequest {
            plan: "monthly".into(),
            duration: 30,
            amount: 24.99,
            currency: "USD".into(),
            activation_date: BASE,
            payment_reference: Some("psk_123".into()),
        })
        .await;

    assert!(outcome.success);
    let session = store.snapshot().await;
    assert!(session.is_vip);
    assert_eq!(session.plan, PlanKind::Monthly);
    assert_eq!(session.plan_duration_days, 30);
    assert_eq!(session.expires_at, Some(BASE + 30 * DAY_MS));
    assert!(store.is_vip_active().await);
    assert_eq!(
        *transitions.lock().unwrap(),
        vec![(true, false)],
        "one activation transition, none from the reconciliation pass"
    );
    assert_eq!(api.count_of("vip_status"), 1, "reconciliation ran");
    assert_eq!(api.count_of("user_status"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_process_payment_requires_a_session() {
    let api = MockApi::new(free_user());
    let (store, _vault) = spawn_store(&api);
    store.initialize().await;

    let outcome = store
        .process_payment(PaymentRequest {
            plan: "monthly".into(),
            duration: 30,
            amount: 24.99,
            currency: "USD".into(),
            activation_date: BASE,
            payment_reference: None,
        })
        .await;

    assert!(!outcome.success);
    assert_eq!(api.count_of("process_payment"), 0);
}

// =========================================================================
// Profile operations
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_update_profile_applies_server_snapshot() {
    let api = MockApi::new(free_user());
    let (store, _vault) = spawn_store(&api);
    store.initialize().await;
    store.login("ade@example.com", "secret").await;

    let outcome = store
        .update_profile(ProfileUpdateRequest {
            username: Some("ade-the-great".into()),
            country: None,
        })
        .await;

    assert!(outcome.success);
    assert_eq!(store.snapshot().await.username, "ade-the-great");
}

#[tokio::test(start_paused = true)]
async fn test_update_profile_image_applies_server_snapshot() {
    let api = MockApi::new(free_user());
    let (store, _vault) = spawn_store(&api);
    store.initialize().await;
    store.login("ade@example.com", "secret").await;

    let outcome = store.update_profile_image("https://cdn/new.png").await;

    assert!(outcome.success);
    assert_eq!(store.snapshot().await.profile_image, "https://cdn/new.png");
}

#[tokio::test(start_paused = true)]
async fn test_delete_account_clears_everything() {
    let api = MockApi::new(free_user());
    let (store, vault) = spawn_store(&api);
    store.initialize().await;
    store.login("ade@example.com", "secret").await;

    let outcome = store.delete_account().await;

    assert!(outcome.success);
    assert!(!store.snapshot().await.is_authenticated);
    assert!(vault.contents().is_none());

    let calls = api.call_count();
    sleep_ms(60 * 60 * 1000).await;
    assert_eq!(api.call_count(), calls, "all timers dead after deletion");
}

#[tokio::test(start_paused = true)]
async fn test_update_password_round_trips() {
    let api = MockApi::new(free_user());
    let (store, _vault) = spawn_store(&api);
    store.initialize().await;
    store.login("ade@example.com", "secret").await;

    let outcome = store.update_password("secret", "better-secret").await;

    assert!(outcome.success);
    assert_eq!(api.count_of("update_password"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_password_reset_flow_needs_no_session() {
    let api = MockApi::new(free_user());
    let (store, _vault) = spawn_store(&api);
    store.initialize().await;

    assert!(store.request_password_reset("ade@example.com").await.success);
    assert!(store.reset_password("reset-token", "new-secret").await.success);
}

#[tokio::test(start_paused = true)]
async fn test_resend_verification_needs_no_session() {
    let api = MockApi::new(free_user());
    let (store, _vault) = spawn_store(&api);
    store.initialize().await;

    assert!(store.resend_verification("ade@example.com").await.success);
    assert_eq!(api.count_of("resend_verification"), 1);
}

// =========================================================================
// Listeners and events
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_removed_listener_sees_nothing() {
    let api = MockApi::new(free_user());
    let (store, _vault) = spawn_store(&api);
    store.initialize().await;
    store.login("ade@example.com", "secret").await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let id = store
        .add_vip_status_listener(move |new, old| {
            sink.lock().unwrap().push((new, old));
        })
        .await
        .unwrap();
    store.remove_vip_status_listener(id).await;

    store
        .process_payment(PaymentRequest {
            plan: "monthly".into(),
            duration: 30,
            amount: 24.99,
            currency: "USD".into(),
            activation_date: BASE,
            payment_reference: None,
        })
        .await;

    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_broadcast_carries_the_transition_timestamp() {
    let api = MockApi::new(free_user());
    let (store, _vault) = spawn_store(&api);
    store.initialize().await;
    store.login("ade@example.com", "secret").await;
    let mut events = store.subscribe();

    store
        .process_payment(PaymentRequest {
            plan: "weekly".into(),
            duration: 7,
            amount: 7.99,
            currency: "USD".into(),
            activation_date: BASE,
            payment_reference: None,
        })
        .await;

    let mut transition = None;
    while let Ok(event) = events.try_recv() {
        if let StoreEvent::VipTransition(t) = event {
            transition = Some(t);
        }
    }
    assert_eq!(
        transition,
        Some(VipTransition {
            new_active: true,
            old_active: false,
            at_ms: BASE,
        })
    );
}
