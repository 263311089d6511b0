//! `GEOIP_MMDB_PATH`-backed `GeoIpResolver` (§6.5), used both for the
//! scoring kernel's geo term (§4.1) and to locate publishers/viewers before
//! bucketing (§6.4). A hostname is resolved to an address via the standard
//! resolver before the mmdb lookup; a literal IP skips that step.

use std::net::{IpAddr, ToSocketAddrs};

use async_trait::async_trait;
use foghorn_contracts::error::{ContractError, Result};
use foghorn_contracts::geoip::GeoIpResolver;
use foghorn_model::geo::GeoPoint;
use maxminddb::{geoip2, Reader};

pub struct MaxmindGeoIp {
    reader: Reader<Vec<u8>>,
}

impl MaxmindGeoIp {
    pub fn open(mmdb_path: &str) -> anyhow::Result<Self> {
        let reader = Reader::open_readfile(mmdb_path)?;
        Ok(Self { reader })
    }
}

fn resolve_ip(host_or_ip: &str) -> Option<IpAddr> {
    if let Ok(ip) = host_or_ip.parse::<IpAddr>() {
        return Some(ip);
    }
    (host_or_ip, 0u16).to_socket_addrs().ok()?.next().map(|addr| addr.ip())
}

#[async_trait]
impl GeoIpResolver for MaxmindGeoIp {
    async fn lookup(&self, host_or_ip: &str) -> Result<Option<GeoPoint>> {
        let Some(ip) = resolve_ip(host_or_ip) else {
            return Ok(None);
        };

        let city: geoip2::City = match self.reader.lookup(ip) {
            Ok(Some(city)) => city,
            Ok(None) => return Ok(None),
            Err(maxminddb::MaxMindDbError::AddressNotFoundError(_)) => return Ok(None),
            Err(err) => return Err(ContractError::Internal(err.to_string())),
        };

        let Some(location) = city.location else { return Ok(None) };
        let (Some(lat), Some(lon)) = (location.latitude, location.longitude) else {
            return Ok(None);
        };

        Ok(GeoPoint::new(lat, lon).ok())
    }
}
