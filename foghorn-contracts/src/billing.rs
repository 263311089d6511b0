//! The billing service ("Purser"), consumed only through this trait.

use async_trait::async_trait;
use foghorn_model::ids::TenantId;

use crate::error::Result;
use crate::registry::BillingModel;

#[derive(Debug, Clone, Copy)]
pub struct BillingStatus {
    pub billing_model: BillingModel,
    pub is_suspended: bool,
    pub is_balance_negative: bool,
}

#[async_trait]
pub trait BillingChecker: Send + Sync {
    /// §4.4 play-rewrite: look up the owning tenant's current billing
    /// status. Callers fail-open on lookup errors for viewer playback and
    /// fail-closed for new ingest validation (§7).
    async fn check_owner_billing(&self, tenant_id: &TenantId) -> Result<BillingStatus>;
}
