//! S3-backed `ColdStorage` (§6.5 `STORAGE_S3_*`), used only by the purge
//! job (§4.6) to remove an artifact's object (or, for a DVR's segmented
//! layout, everything under its prefix) once no node still holds a
//! non-orphaned copy.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use foghorn_contracts::error::{ContractError, Result};
use foghorn_contracts::storage::ColdStorage;

use crate::config::S3Config;

pub struct S3ColdStorage {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3ColdStorage {
    pub async fn new(config: &S3Config) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest()).region(aws_sdk_s3::config::Region::new(config.region.clone()));
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint.clone());
        }
        if let (Some(key), Some(secret)) = (&config.access_key, &config.secret_key) {
            loader = loader.credentials_provider(aws_sdk_s3::config::Credentials::new(
                key.clone(),
                secret.clone(),
                None,
                None,
                "foghorn-config",
            ));
        }
        let sdk_config = loader.load().await;
        Self {
            client: Client::new(&sdk_config),
            bucket: config.bucket.clone(),
            prefix: config.prefix.clone(),
        }
    }

    fn qualify(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", self.prefix.trim_end_matches('/'), key.trim_start_matches('/'))
        }
    }
}

#[async_trait]
impl ColdStorage for S3ColdStorage {
    async fn delete_object(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(self.qualify(key))
            .send()
            .await
            .map_err(|err| ContractError::Internal(err.to_string()))?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        let full_prefix = self.qualify(prefix);
        let mut continuation_token = None;
        loop {
            let mut request = self.client.list_objects_v2().bucket(&self.bucket).prefix(&full_prefix);
            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }
            let listing = request.send().await.map_err(|err| ContractError::Internal(err.to_string()))?;

            let keys: Vec<_> = listing.contents().iter().filter_map(|obj| obj.key()).collect();
            for key in keys {
                self.client
                    .delete_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .send()
                    .await
                    .map_err(|err| ContractError::Internal(err.to_string()))?;
            }

            if listing.is_truncated().unwrap_or(false) {
                continuation_token = listing.next_continuation_token().map(str::to_string);
            } else {
                break;
            }
        }
        Ok(())
    }
}

/// Wired in when `STORAGE_S3_*` is absent: the purge job (§4.6) still runs
/// on its ticker, but every delete is a no-op, so artifacts are dereferenced
/// from the in-memory/DB inventory without ever touching an object store.
#[derive(Default)]
pub struct NoopColdStorage;

#[async_trait]
impl ColdStorage for NoopColdStorage {
    async fn delete_object(&self, _key: &str) -> Result<()> {
        Ok(())
    }

    async fn delete_prefix(&self, _prefix: &str) -> Result<()> {
        Ok(())
    }
}
