//! Session state for Tipgate.
//!
//! This crate owns the data side of the store:
//!
//! 1. **The model** — [`Session`] and [`PlanKind`]: who is signed in,
//!    what they're entitled to, which tokens authenticate them
//! 2. **Evaluation** — [`vip_active`]/[`needs_expiry_correction`]: pure
//!    predicates over the model and a timestamp
//! 3. **Persistence** — the allow-listed [`PersistedSession`] subset and
//!    the [`SessionVault`] storage seam
//!
//! # How it fits in the stack
//!
//! ```text
//! Store Layer (above)  ← mutates the session, schedules timers
//!     ↕
//! Session Layer (this crate)  ← data, evaluation, persistence
//!     ↕
//! API Layer (below)  ← provides the server snapshots applied here
//! ```

mod error;
mod evaluator;
mod persist;
mod session;

pub use error::SessionError;
pub use evaluator::{needs_expiry_correction, vip_active};
pub use persist::{
    JsonFileVault, MemoryVault, PersistedSession, SessionVault, VAULT_KEY,
    from_persisted, restore, to_persisted,
};
pub use session::{PlanKind, Session};
