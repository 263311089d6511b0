//! The trigger processor (C4, §4.4): Commodore's synchronous webhook calls,
//! decoded into a sealed payload per trigger type, handled against the
//! state manager and the registry/billing/analytics/geoip collaborators,
//! with a short-lived billing cache in front of the billing RPC.

pub mod billing_cache;
pub mod commodore_cache;
pub mod geoip_cache;
pub mod processor;
pub mod types;

pub use billing_cache::{BillingCache, BillingCacheEntry};
pub use commodore_cache::ResolveCache;
pub use geoip_cache::GeoIpCache;
pub use processor::TriggerProcessor;
pub use types::{EmbeddedStreamStats, Trigger, TriggerPayload, TriggerReply, TriggerType};
