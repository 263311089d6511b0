//! HTTP client for the billing service ("Purser", §1). Implements
//! `BillingChecker`; every call is bounded by the quick-check deadline
//! (§5: "billing quick checks 500ms").

use std::time::Duration;

use async_trait::async_trait;
use foghorn_contracts::billing::{BillingChecker, BillingStatus};
use foghorn_contracts::error::{ContractError, Result};
use foghorn_contracts::registry::BillingModel;
use foghorn_model::ids::TenantId;
use reqwest::Client;
use serde::Deserialize;

const BILLING_RPC_TIMEOUT: Duration = Duration::from_millis(500);

pub struct PurserClient {
    client: Client,
    base_url: String,
    service_token: Option<String>,
}

impl PurserClient {
    pub fn new(base_url: String, service_token: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(BILLING_RPC_TIMEOUT)
            .build()
            .expect("reqwest client config is valid");
        Self {
            client,
            base_url,
            service_token,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BillingResponse {
    billing_model: BillingModel,
    is_suspended: bool,
    is_balance_negative: bool,
}

#[async_trait]
impl BillingChecker for PurserClient {
    async fn check_owner_billing(&self, tenant_id: &TenantId) -> Result<BillingStatus> {
        let mut req = self.client.get(format!("{}/v1/tenants/{}/billing", self.base_url, tenant_id));
        if let Some(token) = &self.service_token {
            req = req.bearer_auth(token);
        }

        let response = req.send().await.map_err(|err| ContractError::Unavailable(err.to_string()))?;
        if !response.status().is_success() {
            return Err(ContractError::Unavailable(format!("purser returned {}", response.status())));
        }

        let body: BillingResponse = response.json().await.map_err(|err| ContractError::Internal(err.to_string()))?;
        Ok(BillingStatus {
            billing_model: body.billing_model,
            is_suspended: body.is_suspended,
            is_balance_negative: body.is_balance_negative,
        })
    }
}
