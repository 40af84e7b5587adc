//! The auth store: an actor that owns the session and every timer.
//!
//! One Tokio task owns the [`Session`] plus four schedules (token
//! refresh, two entitlement polls, the expiration monitor) and processes
//! operations sent through a channel. The cloneable [`AuthStore`] handle
//! is what the rest of the application holds.
//!
//! ## Why an actor
//!
//! The session has exactly one writer: this task. Every read→mutate→
//! notify sequence runs to completion before the next command or timer
//! callback is looked at, so no observer can ever see a half-updated
//! session. Timers are plain data owned by the actor, which makes the
//! "cancel before the session is cleared or replaced" rule structural —
//! a stale timer from a previous session cannot exist, because arming a
//! timer overwrites the only deadline of its kind.
//!
//! ```text
//! AuthStore (handle) ──mpsc──→ ┌────────────── actor ──────────────┐
//!                              │ Session            Countdown(refresh)
//!   snapshot()  ←──oneshot──── │ Notifier           Cadence(vip poll)
//!   subscribe() ←─broadcast──  │ SessionVault       Cadence(user poll)
//!                              │ AuthApi            Countdown(expiry)
//!                              └───────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use tipgate_api::{
    ApiError, AuthApi, AuthPayload, LoginRequest, PasswordUpdateRequest,
    PaymentRequest, ProfileImageRequest, ProfileUpdateRequest,
    RegisterRequest, ResetPasswordRequest, VerifyEmailRequest,
};
use tipgate_sched::{Cadence, Clock, Countdown};
use tipgate_session::{
    Session, SessionVault, needs_expiry_correction, restore, to_persisted,
    vip_active,
};

use crate::StoreError;
use crate::config::StoreConfig;
use crate::events::{ListenerId, Notifier, StatusChanges, StoreEvent, VipCallback};
use crate::outcome::OpOutcome;

/// Command channel depth. Senders wait when it fills (bounded channel).
const COMMAND_CHANNEL_SIZE: usize = 64;

/// Broadcast buffer for [`StoreEvent`]s. Slow subscribers that fall more
/// than this far behind see a `Lagged` error, not stale state.
const EVENT_CHANNEL_SIZE: usize = 32;

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

type Reply = oneshot::Sender<OpOutcome>;

/// Operations sent to the store actor through its channel.
enum Command {
    Initialize { reply: Reply },
    Register { req: RegisterRequest, reply: Reply },
    Login { email: String, password: String, reply: Reply },
    VerifyEmail { email: String, code: String, reply: Reply },
    ResendVerification { email: String, reply: Reply },
    Logout { reply: Reply },
    ProcessPayment { req: PaymentRequest, reply: Reply },
    UpdateProfile { req: ProfileUpdateRequest, reply: Reply },
    UpdatePassword { current: String, new: String, reply: Reply },
    UpdateProfileImage { image_url: String, reply: Reply },
    RequestPasswordReset { email: String, reply: Reply },
    ResetPassword { token: String, new_password: String, reply: Reply },
    DeleteAccount { reply: Reply },
    Reconcile { reply: Reply },
    Snapshot { reply: oneshot::Sender<Session> },
    IsVipActive { reply: oneshot::Sender<bool> },
    AddVipListener {
        callback: VipCallback,
        reply: oneshot::Sender<ListenerId>,
    },
    RemoveVipListener { id: ListenerId },
    Shutdown,
}

// ---------------------------------------------------------------------------
// AuthStore handle
// ---------------------------------------------------------------------------

/// Handle to a running store actor. Cheap to clone.
///
/// Every operation returns an [`OpOutcome`]; none of them panic or
/// surface raw errors. If the actor is gone, operations come back as
/// failures and reads come back anonymous/inactive.
#[derive(Clone)]
pub struct AuthStore {
    sender: mpsc::Sender<Command>,
    events: broadcast::Sender<StoreEvent>,
}

impl AuthStore {
    /// Spawns a store actor and returns its handle.
    ///
    /// The session starts empty; call [`AuthStore::initialize`] to
    /// rehydrate from the vault and start the timers.
    pub fn spawn<A: AuthApi>(
        api: Arc<A>,
        vault: Arc<dyn SessionVault>,
        config: StoreConfig,
    ) -> Self {
        Self::spawn_with_clock(api, vault, config, Clock::new())
    }

    /// Like [`AuthStore::spawn`], with an explicit wall-clock anchor.
    /// Tests use this to make timestamps predictable.
    pub fn spawn_with_clock<A: AuthApi>(
        api: Arc<A>,
        vault: Arc<dyn SessionVault>,
        config: StoreConfig,
        clock: Clock,
    ) -> Self {
        let config = config.validated();
        let (sender, receiver) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);

        let actor = StoreActor {
            session: Session::anonymous(),
            was_active: false,
            api,
            vault,
            config,
            clock,
            notifier: Notifier::new(events.clone()),
            refresh: Countdown::new("token-refresh"),
            vip_poll: Cadence::new("vip-status-poll"),
            user_poll: Cadence::new("user-status-poll"),
            expiry: Countdown::new("vip-expiration"),
            receiver,
        };
        tokio::spawn(actor.run());

        Self { sender, events }
    }

    async fn op(&self, build: impl FnOnce(Reply) -> Command) -> OpOutcome {
        let (reply, response) = oneshot::channel();
        if self.sender.send(build(reply)).await.is_err() {
            return OpOutcome::from(StoreError::Unavailable);
        }
        response
            .await
            .unwrap_or_else(|_| OpOutcome::from(StoreError::Unavailable))
    }

    /// Runs startup sequencing: rehydrate from the vault, validate or
    /// refresh the stored token, start timers. Guarded — a second call
    /// is a no-op.
    pub async fn initialize(&self) -> OpOutcome {
        self.op(|reply| Command::Initialize { reply }).await
    }

    /// Creates an account. On success a session is established even
    /// before the email is verified (`requires_verification` says
    /// whether the inbox step is still pending).
    pub async fn register(&self, req: RegisterRequest) -> OpOutcome {
        self.op(|reply| Command::Register { req, reply }).await
    }

    /// Signs in. An unverified email is rejected with
    /// `requires_verification: true` and no session is established.
    pub async fn login(
        &self,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> OpOutcome {
        let (email, password) = (email.into(), password.into());
        self.op(|reply| Command::Login { email, password, reply })
            .await
    }

    /// Confirms an email address with the emailed code.
    pub async fn verify_email(
        &self,
        email: impl Into<String>,
        code: impl Into<String>,
    ) -> OpOutcome {
        let (email, code) = (email.into(), code.into());
        self.op(|reply| Command::VerifyEmail { email, code, reply })
            .await
    }

    /// Asks the server to send a fresh verification code.
    pub async fn resend_verification(
        &self,
        email: impl Into<String>,
    ) -> OpOutcome {
        let email = email.into();
        self.op(|reply| Command::ResendVerification { email, reply })
            .await
    }

    /// Signs out. Local state and timers are cleared first; the server
    /// is notified best-effort afterwards.
    pub async fn logout(&self) -> OpOutcome {
        self.op(|reply| Command::Logout { reply }).await
    }

    /// Records a completed payment and unlocks the purchased plan.
    pub async fn process_payment(&self, req: PaymentRequest) -> OpOutcome {
        self.op(|reply| Command::ProcessPayment { req, reply }).await
    }

    /// Updates profile fields (username/country).
    pub async fn update_profile(
        &self,
        req: ProfileUpdateRequest,
    ) -> OpOutcome {
        self.op(|reply| Command::UpdateProfile { req, reply }).await
    }

    /// Changes the account password.
    pub async fn update_password(
        &self,
        current: impl Into<String>,
        new: impl Into<String>,
    ) -> OpOutcome {
        let (current, new) = (current.into(), new.into());
        self.op(|reply| Command::UpdatePassword { current, new, reply })
            .await
    }

    /// Replaces the profile image.
    pub async fn update_profile_image(
        &self,
        image_url: impl Into<String>,
    ) -> OpOutcome {
        let image_url = image_url.into();
        self.op(|reply| Command::UpdateProfileImage { image_url, reply })
            .await
    }

    /// Starts the password-reset flow for an email address.
    pub async fn request_password_reset(
        &self,
        email: impl Into<String>,
    ) -> OpOutcome {
        let email = email.into();
        self.op(|reply| Command::RequestPasswordReset { email, reply })
            .await
    }

    /// Completes the password-reset flow with the emailed token.
    pub async fn reset_password(
        &self,
        token: impl Into<String>,
        new_password: impl Into<String>,
    ) -> OpOutcome {
        let (token, new_password) = (token.into(), new_password.into());
        self.op(|reply| Command::ResetPassword { token, new_password, reply })
            .await
    }

    /// Deletes the account and clears the local session. Irrecoverable.
    pub async fn delete_account(&self) -> OpOutcome {
        self.op(|reply| Command::DeleteAccount { reply }).await
    }

    /// Forces both server checks right now (entitlement + account
    /// status), outside their normal cadence.
    pub async fn reconcile(&self) -> OpOutcome {
        self.op(|reply| Command::Reconcile { reply }).await
    }

    /// A copy of the current session (anonymous if the actor is gone).
    pub async fn snapshot(&self) -> Session {
        let (reply, response) = oneshot::channel();
        if self.sender.send(Command::Snapshot { reply }).await.is_err() {
            return Session::anonymous();
        }
        response.await.unwrap_or_else(|_| Session::anonymous())
    }

    /// Whether the VIP entitlement is active right now. Pure read — no
    /// correction is triggered from here.
    pub async fn is_vip_active(&self) -> bool {
        let (reply, response) = oneshot::channel();
        if self
            .sender
            .send(Command::IsVipActive { reply })
            .await
            .is_err()
        {
            return false;
        }
        response.await.unwrap_or(false)
    }

    /// Registers a `(new_active, old_active)` callback, invoked on every
    /// entitlement transition after the causing mutation has committed.
    /// Returns `None` if the actor is gone.
    pub async fn add_vip_status_listener(
        &self,
        callback: impl FnMut(bool, bool) + Send + 'static,
    ) -> Option<ListenerId> {
        let (reply, response) = oneshot::channel();
        let cmd = Command::AddVipListener {
            callback: Box::new(callback),
            reply,
        };
        if self.sender.send(cmd).await.is_err() {
            return None;
        }
        response.await.ok()
    }

    /// Unregisters a callback added with
    /// [`AuthStore::add_vip_status_listener`].
    pub async fn remove_vip_status_listener(&self, id: ListenerId) {
        let _ = self.sender.send(Command::RemoveVipListener { id }).await;
    }

    /// Subscribes to the broadcast event channel — for consumers that
    /// can't hold a live callback.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Stops the actor. Pending timers die with it.
    pub async fn shutdown(&self) {
        let _ = self.sender.send(Command::Shutdown).await;
    }
}

// ---------------------------------------------------------------------------
// StoreActor
// ---------------------------------------------------------------------------

/// The actor's internal state. Runs inside a Tokio task.
struct StoreActor<A: AuthApi> {
    session: Session,
    /// The evaluator's result as of the last commit. Transitions are
    /// detected against this, so a lapse that happened purely by time
    /// passing still notifies `(false, true)` at the next evaluation
    /// point (monitor/poll) instead of disappearing.
    was_active: bool,
    api: Arc<A>,
    vault: Arc<dyn SessionVault>,
    config: StoreConfig,
    clock: Clock,
    notifier: Notifier,
    /// One-shot: fires `refresh_lead` before the access token dies.
    refresh: Countdown,
    /// Every 15 s: reconcile VIP entitlement with the server.
    vip_poll: Cadence,
    /// Every 30 s: reconcile the broader account flags.
    user_poll: Cadence,
    /// Self-rescheduling local expiry check (15 s / 5 s near the end).
    expiry: Countdown,
    receiver: mpsc::Receiver<Command>,
}

impl<A: AuthApi> StoreActor<A> {
    /// The actor loop: commands and timers interleave here, one at a
    /// time. All four timer futures are cancel-safe, so losing a
    /// `select!` round never loses a schedule.
    async fn run(mut self) {
        debug!("auth store started");

        loop {
            tokio::select! {
                maybe_cmd = self.receiver.recv() => {
                    match maybe_cmd {
                        None | Some(Command::Shutdown) => break,
                        Some(cmd) => self.handle_command(cmd).await,
                    }
                }
                _ = self.refresh.fired() => {
                    self.refresh_access_token().await;
                }
                _ = self.vip_poll.tick() => {
                    self.check_vip_status().await;
                }
                _ = self.user_poll.tick() => {
                    self.check_user_status().await;
                }
                _ = self.expiry.fired() => {
                    self.check_vip_expiration().await;
                }
            }
        }

        debug!("auth store stopped");
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Initialize { reply } => {
                let _ = reply.send(self.initialize().await);
            }
            Command::Register { req, reply } => {
                let _ = reply.send(self.register(req).await);
            }
            Command::Login { email, password, reply } => {
                let _ = reply.send(self.login(email, password).await);
            }
            Command::VerifyEmail { email, code, reply } => {
                let _ = reply.send(self.verify_email(email, code).await);
            }
            Command::ResendVerification { email, reply } => {
                let _ = reply.send(self.resend_verification(email).await);
            }
            Command::Logout { reply } => {
                let _ = reply.send(self.logout().await);
            }
            Command::ProcessPayment { req, reply } => {
                let _ = reply.send(self.process_payment(req).await);
            }
            Command::UpdateProfile { req, reply } => {
                let _ = reply.send(self.update_profile(req).await);
            }
            Command::UpdatePassword { current, new, reply } => {
                let _ = reply.send(self.update_password(current, new).await);
            }
            Command::UpdateProfileImage { image_url, reply } => {
                let _ =
                    reply.send(self.update_profile_image(image_url).await);
            }
            Command::RequestPasswordReset { email, reply } => {
                let _ = reply.send(self.request_password_reset(email).await);
            }
            Command::ResetPassword { token, new_password, reply } => {
                let _ =
                    reply.send(self.reset_password(token, new_password).await);
            }
            Command::DeleteAccount { reply } => {
                let _ = reply.send(self.delete_account().await);
            }
            Command::Reconcile { reply } => {
                let _ = reply.send(self.reconcile().await);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.session.clone());
            }
            Command::IsVipActive { reply } => {
                let now = self.clock.now_millis();
                let _ = reply.send(vip_active(&self.session, now));
            }
            Command::AddVipListener { callback, reply } => {
                let _ = reply.send(self.notifier.add_listener(callback));
            }
            Command::RemoveVipListener { id } => {
                self.notifier.remove_listener(id);
            }
            Command::Shutdown => unreachable!("handled in the run loop"),
        }
    }

    // -- Mutation discipline ------------------------------------------------

    /// Applies a session mutation, persists the result, and notifies if
    /// the entitlement evaluator flipped relative to the last commit.
    /// Every mutation in this actor goes through here, so listeners
    /// always observe fully committed state.
    fn commit(&mut self, mutate: impl FnOnce(&mut Session)) {
        let now = self.clock.now_millis();

        mutate(&mut self.session);
        self.persist();

        let is_active = vip_active(&self.session, now);
        if is_active != self.was_active {
            let old_active = self.was_active;
            self.was_active = is_active;
            self.notifier.vip_transition(is_active, old_active, now);
        }
    }

    /// Best-effort write-through to the vault. A failure is logged and
    /// retried implicitly on the next mutation.
    fn persist(&self) {
        let result = if self.session.is_authenticated {
            to_persisted(&self.session)
                .to_json()
                .and_then(|blob| self.vault.save(&blob))
        } else {
            self.vault.clear()
        };
        if let Err(e) = result {
            warn!(error = %e, "session persist failed");
        }
    }

    // -- Timer management ---------------------------------------------------

    /// (Re)arms the one-shot refresh timer to fire `refresh_lead` before
    /// the access token's local expiry estimate, clamped to ≥ 0.
    /// Re-arming replaces any pending deadline.
    fn schedule_refresh(&mut self) {
        let now = self.clock.now_millis();
        let lead = self.config.refresh_lead.as_millis() as u64;
        let fire_at = self.session.token_expires_at.saturating_sub(lead);
        let delay = Duration::from_millis(fire_at.saturating_sub(now));
        self.refresh.arm(delay);
        debug!(delay_ms = delay.as_millis() as u64, "token refresh scheduled");
    }

    /// Starts (or re-starts) the expiration monitor for the current
    /// session: armed only while the entitlement is active *and* has an
    /// expiry. Coarse cadence far out, fine cadence inside the last
    /// minute. A permanent (admin, no expiry) session never monitors.
    fn start_vip_expiration_monitor(&mut self) {
        let now = self.clock.now_millis();
        if vip_active(&self.session, now) {
            if let Some(expires_at) = self.session.expires_at {
                let remaining =
                    Duration::from_millis(expires_at.saturating_sub(now));
                let period = if remaining > self.config.expiry_fine_window {
                    self.config.expiry_coarse_period
                } else {
                    self.config.expiry_fine_period
                };
                self.expiry.arm(period);
                return;
            }
        }
        self.expiry.cancel();
    }

    /// Starts every schedule for a signed-in session.
    fn start_session_timers(&mut self) {
        self.schedule_refresh();
        self.vip_poll.start_with_jitter(
            self.config.vip_poll_period,
            self.config.poll_start_jitter,
        );
        self.user_poll.start_with_jitter(
            self.config.user_poll_period,
            self.config.poll_start_jitter,
        );
        self.start_vip_expiration_monitor();
    }

    /// Cancels every schedule. Must run before the session is cleared or
    /// replaced.
    fn cancel_session_timers(&mut self) {
        self.refresh.cancel();
        self.vip_poll.stop();
        self.user_poll.stop();
        self.expiry.cancel();
    }

    // -- Token lifecycle ----------------------------------------------------

    /// Exchanges the refresh token for a fresh pair. On success the
    /// session keeps running (timers re-armed, entitlement re-checked);
    /// on failure the session is over — no retry loop, the user signs in
    /// again.
    async fn refresh_access_token(&mut self) -> bool {
        if self.session.refresh_token.is_empty() {
            return false;
        }
        let refresh_token = self.session.refresh_token.clone();

        match self.api.refresh_token(&refresh_token).await {
            Ok(payload) => {
                let now = self.clock.now_millis();
                let ttl = self.config.token_ttl.as_millis() as u64;
                self.commit(move |s| {
                    if let Some(user) = &payload.user {
                        s.apply_user_snapshot(user);
                    }
                    s.access_token = payload.access_token;
                    s.refresh_token = payload.refresh_token;
                    s.token_expires_at = now + ttl;
                });
                debug!("access token refreshed");
                self.schedule_refresh();
                self.check_vip_status().await;
                true
            }
            Err(e) => {
                warn!(error = %e, "token refresh failed — signing out locally");
                self.force_sign_out();
                false
            }
        }
    }

    /// Refresh failure or account deletion: timers first, then the clear.
    fn force_sign_out(&mut self) {
        self.cancel_session_timers();
        self.commit(|s| s.clear());
    }

    // -- Entitlement polling ------------------------------------------------

    /// The fast poll: server entitlement is authoritative; local fields
    /// are overwritten whenever they differ. A failed request keeps the
    /// cadence.
    async fn check_vip_status(&mut self) {
        if !self.session.is_authenticated || !self.session.has_access_token() {
            return;
        }
        let access = self.session.access_token.clone();

        match self.api.vip_status(&access).await {
            Ok(snap) => {
                if self.session.vip_differs(&snap) {
                    debug!("vip status drifted — applying server truth");
                    self.commit(|s| s.apply_vip_snapshot(&snap));
                    self.start_vip_expiration_monitor();
                }
            }
            Err(e) if e.is_auth_failure() => {
                warn!(error = %e, "vip poll unauthorized — refreshing token");
                Box::pin(self.refresh_access_token()).await;
            }
            Err(e) => {
                warn!(error = %e, "vip status poll failed");
            }
        }
    }

    /// The slow poll: reconciles the broader account flags and
    /// broadcasts the diff when anything changed.
    async fn check_user_status(&mut self) {
        if !self.session.is_authenticated || !self.session.has_access_token() {
            return;
        }
        let access = self.session.access_token.clone();

        match self.api.user_status(&access).await {
            Ok(snap) => {
                let changes = StatusChanges::diff(&self.session, &snap);
                if !changes.is_empty() {
                    debug!(?changes, "account status drifted — applying server truth");
                    self.commit(|s| s.apply_status_snapshot(&snap));
                    self.notifier.status_update(changes);
                    self.start_vip_expiration_monitor();
                }
            }
            Err(e) if e.is_auth_failure() => {
                warn!(error = %e, "status poll unauthorized — refreshing token");
                Box::pin(self.refresh_access_token()).await;
            }
            Err(e) => {
                warn!(error = %e, "user status poll failed");
            }
        }
    }

    /// Expiration-monitor firing: if the entitlement just lapsed, drop
    /// the flag locally (one transition) and pull server truth
    /// immediately; otherwise re-arm for the next check.
    async fn check_vip_expiration(&mut self) {
        let now = self.clock.now_millis();
        if needs_expiry_correction(&self.session, now) {
            info!("vip entitlement expired — reconciling with server");
            self.commit(|s| s.is_vip = false);
            self.check_vip_status().await;
            self.check_user_status().await;
        }
        self.start_vip_expiration_monitor();
    }

    // -- Auth operations ----------------------------------------------------

    async fn initialize(&mut self) -> OpOutcome {
        if self.session.is_initialized {
            return OpOutcome::ok("already initialized");
        }

        let restored = restore(self.vault.as_ref());
        self.commit(move |s| {
            *s = restored;
            s.is_initialized = true;
        });

        if !self.session.is_authenticated {
            info!("initialized with no stored session");
            return OpOutcome::ok("no stored session");
        }
        info!(user_id = %self.session.user_id, "restored session — validating");

        let now = self.clock.now_millis();
        let lead = self.config.refresh_lead.as_millis() as u64;
        if self.session.token_expires_at <= now + lead {
            // The stored token is stale (or about to be); the refresh
            // decides whether this session survives.
            if !self.refresh_access_token().await {
                return OpOutcome::failure(
                    "stored session expired, sign in again",
                );
            }
        } else {
            let access = self.session.access_token.clone();
            match self.api.validate(&access).await {
                Ok(user) => self.commit(|s| s.apply_user_snapshot(&user)),
                Err(e) if e.is_auth_failure() => {
                    if !self.refresh_access_token().await {
                        return OpOutcome::failure(
                            "stored session rejected, sign in again",
                        );
                    }
                }
                Err(e) => {
                    // Offline start: keep the local session and let the
                    // polls reconcile once the network is back.
                    warn!(error = %e, "validate failed — keeping local session");
                }
            }
        }

        if self.session.is_authenticated {
            self.start_session_timers();
        }
        OpOutcome::ok("session restored")
    }

    async fn register(&mut self, req: RegisterRequest) -> OpOutcome {
        match self.api.register(&req).await {
            Ok(payload) => {
                let verified = payload.user.email_verified;
                self.establish_session(payload);
                info!(user_id = %self.session.user_id, "account registered");
                if verified {
                    OpOutcome::ok("account created")
                } else {
                    OpOutcome::ok_pending_verification(
                        "account created, verification code sent",
                    )
                }
            }
            Err(e) => outcome_from_api_error(e),
        }
    }

    async fn login(&mut self, email: String, password: String) -> OpOutcome {
        let req = LoginRequest { email, password };
        match self.api.login(&req).await {
            Ok(payload) => {
                if !payload.user.email_verified {
                    // Gate: no session, no tokens, until the inbox step.
                    info!(email = %req.email, "login blocked pending verification");
                    return OpOutcome::verification_required(
                        "email not verified, check your inbox",
                    );
                }
                self.establish_session(payload);
                info!(user_id = %self.session.user_id, "signed in");
                OpOutcome::ok("signed in")
            }
            Err(e) => outcome_from_api_error(e),
        }
    }

    /// Replaces the session with a freshly issued one and starts every
    /// timer. Timers are cancelled first so nothing armed for the old
    /// session can fire into the new one.
    fn establish_session(&mut self, payload: AuthPayload) {
        self.cancel_session_timers();
        let now = self.clock.now_millis();
        let ttl = self.config.token_ttl.as_millis() as u64;
        self.commit(move |s| {
            s.clear();
            s.is_authenticated = true;
            s.apply_user_snapshot(&payload.user);
            s.access_token = payload.tokens.access_token;
            s.refresh_token = payload.tokens.refresh_token;
            s.token_expires_at = now + ttl;
            s.last_login_at = Some(now);
        });
        self.start_session_timers();
    }

    async fn verify_email(&mut self, email: String, code: String) -> OpOutcome {
        let req = VerifyEmailRequest {
            email: email.clone(),
            verification_code: code,
        };
        match self.api.verify_email(&req).await {
            Ok(()) => {
                if self.session.is_authenticated && self.session.email == email
                {
                    self.commit(|s| s.email_verified = true);
                }
                info!(%email, "email verified");
                OpOutcome::ok("email verified")
            }
            Err(e) => outcome_from_api_error(e),
        }
    }

    async fn resend_verification(&mut self, email: String) -> OpOutcome {
        match self.api.resend_verification(&email).await {
            Ok(()) => OpOutcome::ok("verification code sent"),
            Err(e) => outcome_from_api_error(e),
        }
    }

    async fn logout(&mut self) -> OpOutcome {
        if !self.session.is_authenticated {
            return OpOutcome::ok("already signed out");
        }

        // Local safety over server bookkeeping: timers die and state
        // clears before the server hears anything.
        self.cancel_session_timers();
        let access = self.session.access_token.clone();
        self.commit(|s| s.clear());
        info!("signed out");

        let api = Arc::clone(&self.api);
        tokio::spawn(async move {
            if let Err(e) = api.logout(&access).await {
                debug!(error = %e, "server logout notification failed");
            }
        });

        OpOutcome::ok("signed out")
    }

    async fn process_payment(&mut self, req: PaymentRequest) -> OpOutcome {
        if !self.session.is_authenticated {
            return OpOutcome::from(StoreError::NotAuthenticated);
        }
        let access = self.session.access_token.clone();

        let result = match self.api.process_payment(&access, &req).await {
            Err(e) if e.is_auth_failure() => {
                if self.refresh_access_token().await {
                    let access = self.session.access_token.clone();
                    self.api.process_payment(&access, &req).await
                } else {
                    return OpOutcome::failure(
                        "session expired, sign in again",
                    );
                }
            }
            other => other,
        };

        match result {
            Ok(snap) => {
                info!(plan = %snap.vip_plan, "payment processed — entitlement updated");
                self.commit(|s| s.apply_vip_snapshot(&snap));
                self.start_vip_expiration_monitor();
                // Full reconciliation pass so the UI reflects server
                // truth, not just the payment response.
                self.check_vip_status().await;
                self.check_user_status().await;
                OpOutcome::ok("payment processed")
            }
            Err(e) => outcome_from_api_error(e),
        }
    }

    async fn update_profile(
        &mut self,
        req: ProfileUpdateRequest,
    ) -> OpOutcome {
        if !self.session.is_authenticated {
            return OpOutcome::from(StoreError::NotAuthenticated);
        }
        let access = self.session.access_token.clone();

        let result = match self.api.update_profile(&access, &req).await {
            Err(e) if e.is_auth_failure() => {
                if self.refresh_access_token().await {
                    let access = self.session.access_token.clone();
                    self.api.update_profile(&access, &req).await
                } else {
                    return OpOutcome::failure(
                        "session expired, sign in again",
                    );
                }
            }
            other => other,
        };

        match result {
            Ok(user) => {
                self.commit(|s| s.apply_user_snapshot(&user));
                OpOutcome::ok("profile updated")
            }
            Err(e) => outcome_from_api_error(e),
        }
    }

    async fn update_password(
        &mut self,
        current: String,
        new: String,
    ) -> OpOutcome {
        if !self.session.is_authenticated {
            return OpOutcome::from(StoreError::NotAuthenticated);
        }
        let access = self.session.access_token.clone();
        let req = PasswordUpdateRequest {
            current_password: current,
            new_password: new,
        };

        let result = match self.api.update_password(&access, &req).await {
            Err(e) if e.is_auth_failure() => {
                if self.refresh_access_token().await {
                    let access = self.session.access_token.clone();
                    self.api.update_password(&access, &req).await
                } else {
                    return OpOutcome::failure(
                        "session expired, sign in again",
                    );
                }
            }
            other => other,
        };

        match result {
            Ok(()) => OpOutcome::ok("password updated"),
            Err(e) => outcome_from_api_error(e),
        }
    }

    async fn update_profile_image(&mut self, image_url: String) -> OpOutcome {
        if !self.session.is_authenticated {
            return OpOutcome::from(StoreError::NotAuthenticated);
        }
        let access = self.session.access_token.clone();
        let req = ProfileImageRequest {
            profile_image: image_url,
        };

        let result = match self.api.update_profile_image(&access, &req).await {
            Err(e) if e.is_auth_failure() => {
                if self.refresh_access_token().await {
                    let access = self.session.access_token.clone();
                    self.api.update_profile_image(&access, &req).await
                } else {
                    return OpOutcome::failure(
                        "session expired, sign in again",
                    );
                }
            }
            other => other,
        };

        match result {
            Ok(user) => {
                self.commit(|s| s.apply_user_snapshot(&user));
                OpOutcome::ok("profile image updated")
            }
            Err(e) => outcome_from_api_error(e),
        }
    }

    async fn request_password_reset(&mut self, email: String) -> OpOutcome {
        match self.api.request_password_reset(&email).await {
            Ok(()) => OpOutcome::ok("password reset email sent"),
            Err(e) => outcome_from_api_error(e),
        }
    }

    async fn reset_password(
        &mut self,
        token: String,
        new_password: String,
    ) -> OpOutcome {
        let req = ResetPasswordRequest {
            token,
            new_password,
        };
        match self.api.reset_password(&req).await {
            Ok(()) => OpOutcome::ok("password reset"),
            Err(e) => outcome_from_api_error(e),
        }
    }

    async fn delete_account(&mut self) -> OpOutcome {
        if !self.session.is_authenticated {
            return OpOutcome::from(StoreError::NotAuthenticated);
        }
        let access = self.session.access_token.clone();

        let result = match self.api.delete_account(&access).await {
            Err(e) if e.is_auth_failure() => {
                if self.refresh_access_token().await {
                    let access = self.session.access_token.clone();
                    self.api.delete_account(&access).await
                } else {
                    return OpOutcome::failure(
                        "session expired, sign in again",
                    );
                }
            }
            other => other,
        };

        match result {
            Ok(()) => {
                info!("account deleted");
                self.force_sign_out();
                OpOutcome::ok("account deleted")
            }
            Err(e) => outcome_from_api_error(e),
        }
    }

    async fn reconcile(&mut self) -> OpOutcome {
        if !self.session.is_authenticated {
            return OpOutcome::from(StoreError::NotAuthenticated);
        }
        self.check_vip_status().await;
        self.check_user_status().await;
        OpOutcome::ok("reconciled")
    }
}

/// Maps an API error onto a caller-facing outcome, preferring the
/// server's own message when it sent one.
fn outcome_from_api_error(e: ApiError) -> OpOutcome {
    match e {
        ApiError::Rejected { ref message, .. } if !message.is_empty() => {
            OpOutcome::failure(message.clone())
        }
        ApiError::Unauthorized(ref m) | ApiError::Forbidden(ref m)
            if !m.is_empty() =>
        {
            OpOutcome::failure(m.clone())
        }
        other => OpOutcome::failure(other.to_string()),
    }
}
