//! Cold storage (S3), consumed only through this trait by the purge job
//! (§4.6). Bucket/prefix/region/endpoint/credential configuration is an
//! external concern (§1 Non-goals); this crate only names the operation
//! shape.

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait ColdStorage: Send + Sync {
    async fn delete_object(&self, key: &str) -> Result<()>;
    async fn delete_prefix(&self, prefix: &str) -> Result<()>;
}
