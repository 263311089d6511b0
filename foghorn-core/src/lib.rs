//! Core library for Foghorn: the weighted scoring kernel (C1), the unified
//! state manager (C2), the balancer (C3), the trigger processor (C4), the
//! artifact lifecycle background jobs (C6), virtual-viewer bookkeeping (C7),
//! and the reconnect supervisor (C8). The control-plane RPC server (C5) and
//! the admin HTTP surface live in the `foghorn-server` binary crate, which
//! depends on this one.

pub mod balancer;
pub mod cache;
pub mod error;
pub mod jobs;
pub mod persistence;
pub mod scoring;
pub mod state;
pub mod supervisor;
pub mod trigger;

pub mod prelude {
    pub use crate::balancer::{Balancer, NodeScore};
    pub use crate::cache::{CacheConfig, Lookup, SwrCache};
    pub use crate::error::{FoghornError, RejectionCode, Result};
    pub use crate::scoring::{score, ScoringContext};
    pub use crate::state::{BalancerSnapshot, ReconcileOutcome, StateManager, StateManagerConfig};
}
