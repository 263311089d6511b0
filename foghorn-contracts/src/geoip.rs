//! GeoIP resolution for the scoring kernel's geo term (§4.1) and for
//! bucketing client locations before they reach analytics (§6.4).

use async_trait::async_trait;
use foghorn_model::geo::GeoPoint;

use crate::error::Result;

#[async_trait]
pub trait GeoIpResolver: Send + Sync {
    /// Resolves a host or literal IP to an approximate location. `Ok(None)`
    /// means the lookup succeeded but the address isn't in the database
    /// (private ranges, reserved space); callers treat that the same as a
    /// lookup error for scoring purposes (§4.1: missing geo term drops out
    /// of the weighted sum rather than penalizing the node).
    async fn lookup(&self, host_or_ip: &str) -> Result<Option<GeoPoint>>;
}
