//! Shared application state handed to every axum handler (control-stream
//! and admin alike): one `Clone`-cheap struct, built once in `main`,
//! threaded through `Router::with_state`.

use std::sync::Arc;

use foghorn_contracts::analytics::AnalyticsSink;
use foghorn_contracts::billing::BillingChecker;
use foghorn_contracts::registry::RegistryResolver;
use foghorn_core::balancer::Balancer;
use foghorn_core::state::StateManager;
use foghorn_core::supervisor::{ClientStatusGauge, Switchable};
use foghorn_core::trigger::TriggerProcessor;

use crate::config::Settings;
use crate::control::registry::ConnectionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub state_manager: Arc<StateManager>,
    pub balancer: Arc<Balancer>,
    pub processor: Arc<TriggerProcessor>,
    pub control_registry: ConnectionRegistry,
    pub registry_client: Arc<Switchable<dyn RegistryResolver>>,
    pub billing_client: Arc<Switchable<dyn BillingChecker>>,
    pub analytics: Arc<dyn AnalyticsSink>,
    pub registry_status: Arc<ClientStatusGauge>,
    pub billing_status: Arc<ClientStatusGauge>,
}
