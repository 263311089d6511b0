//! HTTP client for the tenant/stream-key registry service ("Commodore",
//! §1: "consumed via a defined RPC contract"). Implements
//! `RegistryResolver` against a small JSON API; every call is bounded by
//! the registry RPC deadline (§5: "registry calls 2s").

use std::time::Duration;

use async_trait::async_trait;
use foghorn_contracts::error::{ContractError, Result};
use foghorn_contracts::registry::{BillingModel, RegistryResolver, ResolveKind, ResolvedTarget, StreamKeyValidation};
use foghorn_model::ids::{ArtifactHash, InternalName, StreamRegistryId, TenantId, UserId};
use reqwest::Client;
use serde::Deserialize;

const REGISTRY_RPC_TIMEOUT: Duration = Duration::from_secs(2);

pub struct CommodoreClient {
    client: Client,
    base_url: String,
    service_token: Option<String>,
}

impl CommodoreClient {
    pub fn new(base_url: String, service_token: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(REGISTRY_RPC_TIMEOUT)
            .build()
            .expect("reqwest client config is valid");
        Self {
            client,
            base_url,
            service_token,
        }
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.get(format!("{}{}", self.base_url, path));
        if let Some(token) = &self.service_token {
            req = req.bearer_auth(token);
        }
        req
    }
}

#[derive(Debug, Deserialize)]
struct StreamKeyResponse {
    valid: bool,
    tenant_id: TenantId,
    user_id: UserId,
    internal_name: String,
    stream_id: StreamRegistryId,
    billing_model: BillingModel,
    is_suspended: bool,
    is_balance_negative: bool,
    is_recording_enabled: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ResolveResponse {
    Live { internal_name: String, tenant_id: TenantId },
    Artifact { artifact_hash: String, tenant_id: TenantId },
}

#[async_trait]
impl RegistryResolver for CommodoreClient {
    async fn validate_stream_key(&self, stream_key: &str) -> Result<StreamKeyValidation> {
        let response = self
            .request(&format!("/v1/stream-keys/{stream_key}"))
            .send()
            .await
            .map_err(|err| ContractError::Unavailable(err.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ContractError::Invalid("unknown stream key".into()));
        }
        if !response.status().is_success() {
            return Err(ContractError::Unavailable(format!("commodore returned {}", response.status())));
        }

        let body: StreamKeyResponse = response
            .json()
            .await
            .map_err(|err| ContractError::Internal(err.to_string()))?;

        if !body.valid {
            return Err(ContractError::Invalid("stream key is not valid".into()));
        }

        Ok(StreamKeyValidation {
            tenant_id: body.tenant_id,
            user_id: body.user_id,
            internal_name: InternalName::from(body.internal_name),
            stream_id: body.stream_id,
            billing_model: body.billing_model,
            is_suspended: body.is_suspended,
            is_balance_negative: body.is_balance_negative,
            is_recording_enabled: body.is_recording_enabled,
        })
    }

    async fn resolve(&self, kind: ResolveKind, id: &str) -> Result<ResolvedTarget> {
        let kind_str = match kind {
            ResolveKind::InternalName => "internal_name",
            ResolveKind::PlaybackId => "playback_id",
            ResolveKind::ClipHash => "clip_hash",
            ResolveKind::DvrHash => "dvr_hash",
            ResolveKind::VodHash => "vod_hash",
        };

        let response = self
            .request(&format!("/v1/resolve/{kind_str}/{id}"))
            .send()
            .await
            .map_err(|err| ContractError::Unavailable(err.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ContractError::NotFound(format!("{kind_str}:{id}")));
        }
        if !response.status().is_success() {
            return Err(ContractError::Unavailable(format!("commodore returned {}", response.status())));
        }

        let body: ResolveResponse = response
            .json()
            .await
            .map_err(|err| ContractError::Internal(err.to_string()))?;

        Ok(match body {
            ResolveResponse::Live { internal_name, tenant_id } => ResolvedTarget::Live {
                internal_name: InternalName::from(internal_name),
                tenant_id,
            },
            ResolveResponse::Artifact { artifact_hash, tenant_id } => ResolvedTarget::Artifact {
                artifact_hash: ArtifactHash::from(artifact_hash),
                tenant_id,
            },
        })
    }
}
