//! Trait surfaces for everything outside the control plane itself: the
//! stream registry ("Commodore"), billing ("Purser"), analytics
//! ("Decklog"), cold storage, cross-instance state sync, and GeoIP. Nothing
//! in `foghorn-core` talks to a concrete client for these; it takes an
//! `Arc<dyn Trait>` and the binary in `foghorn-server` wires up the real
//! implementation.

pub mod analytics;
pub mod billing;
pub mod dispatch;
pub mod error;
pub mod geoip;
pub mod registry;
pub mod state_store;
pub mod storage;

pub mod prelude {
    pub use crate::analytics::{AnalyticsSink, EnrichedTrigger, NullAnalyticsSink};
    pub use crate::billing::{BillingChecker, BillingStatus};
    pub use crate::dispatch::{Command, CommandDispatcher, Reply, DEFAULT_DISPATCH_TIMEOUT};
    pub use crate::error::{ContractError, Result};
    pub use crate::geoip::GeoIpResolver;
    pub use crate::registry::{
        BillingModel, RegistryResolver, ResolveKind, ResolvedTarget, StreamKeyValidation,
    };
    pub use crate::state_store::{NoopStateStore, StateDelta, StateStore};
    pub use crate::storage::ColdStorage;
}
