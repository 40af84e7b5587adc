//! Store configuration: token lifetimes and timer cadences.

use std::time::Duration;

use tracing::warn;

/// Timing knobs for the store's four schedules.
///
/// Sensible defaults are provided; embedders override just the fields
/// they care about:
///
/// ```rust
/// use std::time::Duration;
/// use tipgate::StoreConfig;
///
/// let config = StoreConfig {
///     vip_poll_period: Duration::from_secs(5),
///     ..StoreConfig::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Local estimate of how long a freshly issued access token stays
    /// valid. Default: 50 minutes.
    pub token_ttl: Duration,

    /// How far ahead of `token_expires_at` the refresh fires.
    /// Default: 60 seconds.
    pub refresh_lead: Duration,

    /// VIP entitlement poll period. Kept short because paid access has
    /// to unlock (and lock) promptly. Default: 15 seconds.
    pub vip_poll_period: Duration,

    /// Broader account-status poll period. Default: 30 seconds.
    pub user_poll_period: Duration,

    /// Expiration-monitor recheck period while the expiry is still far
    /// out. Default: 15 seconds (shared cadence with the VIP poll).
    pub expiry_coarse_period: Duration,

    /// How close to the expiry the monitor switches to the fine period.
    /// Default: 60 seconds.
    pub expiry_fine_window: Duration,

    /// Recheck period inside the fine window. Default: 5 seconds.
    pub expiry_fine_period: Duration,

    /// Random jitter (0–max) added to the first poll tick so clients
    /// that come online together don't hit the server together.
    /// Default: 250 ms. Tests set this to zero.
    pub poll_start_jitter: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            token_ttl: Duration::from_secs(50 * 60),
            refresh_lead: Duration::from_secs(60),
            vip_poll_period: Duration::from_secs(15),
            user_poll_period: Duration::from_secs(30),
            expiry_coarse_period: Duration::from_secs(15),
            expiry_fine_window: Duration::from_secs(60),
            expiry_fine_period: Duration::from_secs(5),
            poll_start_jitter: Duration::from_millis(250),
        }
    }
}

impl StoreConfig {
    /// Smallest allowed poll/recheck period. Anything shorter would turn
    /// a cadence into a busy loop against the server.
    pub const MIN_PERIOD: Duration = Duration::from_secs(1);

    /// Clamp and fix any out-of-range values so the config is safe to use.
    ///
    /// Called automatically when the store is spawned. Rules:
    /// - every period is at least [`Self::MIN_PERIOD`];
    /// - `refresh_lead` is capped at `token_ttl` (a lead longer than the
    ///   token's life would clamp the refresh delay to zero anyway);
    /// - `expiry_fine_period` never exceeds `expiry_coarse_period`, and
    ///   the fine window covers at least one fine period.
    pub fn validated(mut self) -> Self {
        for (label, period) in [
            ("vip_poll_period", &mut self.vip_poll_period),
            ("user_poll_period", &mut self.user_poll_period),
            ("expiry_coarse_period", &mut self.expiry_coarse_period),
            ("expiry_fine_period", &mut self.expiry_fine_period),
        ] {
            if *period < Self::MIN_PERIOD {
                warn!(label, "period below minimum — clamping to 1s");
                *period = Self::MIN_PERIOD;
            }
        }
        if self.refresh_lead > self.token_ttl {
            warn!("refresh_lead exceeds token_ttl — clamping");
            self.refresh_lead = self.token_ttl;
        }
        if self.expiry_fine_period > self.expiry_coarse_period {
            warn!("expiry_fine_period exceeds coarse period — clamping");
            self.expiry_fine_period = self.expiry_coarse_period;
        }
        if self.expiry_fine_window < self.expiry_fine_period {
            self.expiry_fine_window = self.expiry_fine_period;
        }
        self
    }
}
