//! Cancellable timers for the Tipgate store.
//!
//! The store juggles four independent schedules: a one-shot token
//! refresh, two periodic entitlement polls, and a self-rescheduling
//! expiration check. Each is represented here as a small state object —
//! a deadline (or cadence) *as data* — rather than a spawned task holding
//! a raw timer handle. Arming a timer overwrites its single deadline, so
//! "cancel any previous timer of the same kind before arming a new one"
//! holds by construction, and a cancelled timer simply pends forever.
//!
//! # Integration
//!
//! The timers are designed to sit inside the store actor's
//! `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* handle commands */ }
//!         _ = refresh.fired() => { /* refresh the access token */ }
//!         _ = vip_poll.tick() => { /* poll VIP status */ }
//!     }
//! }
//! ```
//!
//! Both futures are cancel-safe: dropping them mid-sleep (because another
//! branch won the select) leaves the schedule untouched.

use std::time::Duration;

use rand::Rng;
use tokio::time::{self, Instant};
use tracing::trace;

// ---------------------------------------------------------------------------
// Countdown — one-shot timer
// ---------------------------------------------------------------------------

/// A one-shot, re-armable timer.
///
/// State machine:
///
/// ```text
///   Idle ──(arm)──→ Armed ──(fired)──→ Idle
///     ↑               │ (arm replaces the deadline)
///     └──(cancel)─────┘
/// ```
///
/// While idle, [`Countdown::fired`] pends forever — inside a `select!`
/// the branch simply never wins.
#[derive(Debug)]
pub struct Countdown {
    label: &'static str,
    deadline: Option<Instant>,
}

impl Countdown {
    /// Creates an idle countdown. The label shows up in trace logs.
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            deadline: None,
        }
    }

    /// Arms the countdown to fire after `delay`, replacing any existing
    /// deadline. `Duration::ZERO` fires on the next poll.
    pub fn arm(&mut self, delay: Duration) {
        self.deadline = Some(Instant::now() + delay);
        trace!(label = self.label, delay_ms = delay.as_millis() as u64, "countdown armed");
    }

    /// Clears the deadline. Idempotent.
    pub fn cancel(&mut self) {
        if self.deadline.take().is_some() {
            trace!(label = self.label, "countdown cancelled");
        }
    }

    /// Whether a deadline is currently pending.
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Resolves when the deadline is reached, disarming the countdown.
    /// Pends forever while idle. Cancel-safe: dropping this future before
    /// it resolves keeps the deadline.
    pub async fn fired(&mut self) {
        let Some(deadline) = self.deadline else {
            // Idle: never resolves — select! handles other branches.
            std::future::pending::<()>().await;
            unreachable!()
        };

        time::sleep_until(deadline).await;
        self.deadline = None;
        trace!(label = self.label, "countdown fired");
    }
}

// ---------------------------------------------------------------------------
// Cadence — periodic timer
// ---------------------------------------------------------------------------

/// A periodic timer with `start`/`stop`/`is_running`.
///
/// Each tick reschedules the next one from *now* (not from the missed
/// deadline), so a slow callback shifts the schedule instead of causing a
/// burst of catch-up ticks.
#[derive(Debug)]
pub struct Cadence {
    label: &'static str,
    period: Option<Duration>,
    next: Option<Instant>,
}

impl Cadence {
    /// Creates a stopped cadence.
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            period: None,
            next: None,
        }
    }

    /// Starts ticking every `period`, first tick one period from now.
    /// Restarting replaces the previous schedule outright.
    pub fn start(&mut self, period: Duration) {
        self.start_with_jitter(period, Duration::ZERO);
    }

    /// Like [`Cadence::start`], with up to `jitter` added to the *first*
    /// tick to desynchronize clients that come online at the same instant
    /// (thundering-herd mitigation).
    pub fn start_with_jitter(&mut self, period: Duration, jitter: Duration) {
        let jitter = if jitter > Duration::ZERO {
            Duration::from_millis(
                rand::rng().random_range(0..jitter.as_millis().max(1) as u64),
            )
        } else {
            Duration::ZERO
        };
        self.period = Some(period);
        self.next = Some(Instant::now() + period + jitter);
        trace!(label = self.label, period_ms = period.as_millis() as u64, "cadence started");
    }

    /// Stops ticking. Idempotent.
    pub fn stop(&mut self) {
        if self.period.take().is_some() {
            self.next = None;
            trace!(label = self.label, "cadence stopped");
        }
    }

    /// Whether the cadence is currently ticking.
    pub fn is_running(&self) -> bool {
        self.period.is_some()
    }

    /// Resolves on the next tick and schedules the one after. Pends
    /// forever while stopped. Cancel-safe.
    pub async fn tick(&mut self) {
        let (Some(next), Some(period)) = (self.next, self.period) else {
            std::future::pending::<()>().await;
            unreachable!()
        };

        time::sleep_until(next).await;
        self.next = Some(Instant::now() + period);
        trace!(label = self.label, "cadence tick");
    }
}

// ---------------------------------------------------------------------------
// Clock — wall-clock reads that follow tokio time
// ---------------------------------------------------------------------------

/// Epoch-millisecond clock anchored to `tokio::time::Instant`.
///
/// The anchor is captured once at construction; reads add the elapsed
/// tokio time. Under `#[tokio::test(start_paused = true)]`,
/// `tokio::time::advance` therefore moves wall-clock reads and timers in
/// lockstep — an expiry set two simulated seconds ahead really is reached
/// when the timers say so.
#[derive(Debug, Clone)]
pub struct Clock {
    base_ms: u64,
    origin: Instant,
}

impl Clock {
    /// Anchors the clock at the current system time.
    ///
    /// Must be called from within a tokio runtime (the store constructs
    /// its clock when it is spawned).
    pub fn new() -> Self {
        let base_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            base_ms,
            origin: Instant::now(),
        }
    }

    /// Anchors the clock at an arbitrary epoch-ms value. Used by tests to
    /// make timestamps predictable.
    pub fn starting_at(base_ms: u64) -> Self {
        Self {
            base_ms,
            origin: Instant::now(),
        }
    }

    /// Current time in epoch milliseconds.
    pub fn now_millis(&self) -> u64 {
        self.base_ms + self.origin.elapsed().as_millis() as u64
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

// =========================================================================
// Tests
// =========================================================================
