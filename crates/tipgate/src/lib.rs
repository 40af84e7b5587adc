//! # Tipgate
//!
//! Client-side session and VIP-entitlement store for the Tipgate sports
//! predictions service.
//!
//! The store owns the signed-in session: it holds the token pair,
//! refreshes the access token ahead of expiry, polls the server for
//! entitlement changes, computes whether the paid subscription is active
//! right now, and notifies the rest of the application whenever that
//! answer flips.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tipgate::prelude::*;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let api = Arc::new(HttpAuthApi::new("https://api.tipgate.example".parse()?)?);
//! let vault = Arc::new(JsonFileVault::new("session.json"));
//! let store = AuthStore::spawn(api, vault, StoreConfig::default());
//!
//! store.initialize().await;
//! let outcome = store.login("ade@example.com", "secret").await;
//! if outcome.requires_verification {
//!     // route to the email-verification screen
//! }
//! if store.is_vip_active().await {
//!     // unlock VIP predictions
//! }
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod events;
mod outcome;
mod store;

pub use config::StoreConfig;
pub use error::StoreError;
pub use events::{
    ListenerId, StatusChanges, StoreEvent, VipCallback, VipTransition,
};
pub use outcome::OpOutcome;
pub use store::AuthStore;

/// Common imports for embedders.
pub mod prelude {
    pub use crate::{
        AuthStore, OpOutcome, StoreConfig, StoreEvent, VipTransition,
    };
    pub use tipgate_api::{
        AuthApi, HttpAuthApi, PaymentRequest, ProfileUpdateRequest,
        RegisterRequest,
    };
    pub use tipgate_session::{
        JsonFileVault, MemoryVault, Session, SessionVault,
    };
}

/// Installs a `tracing` subscriber reading `RUST_LOG`, defaulting to
/// `info`. Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
