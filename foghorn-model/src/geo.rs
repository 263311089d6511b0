//! Geographic point validation, great-circle distance, and H3-resolution-5
//! bucketing (§6.4 privacy: analytics never see a raw lat/lon, only the
//! centroid of the ~252 km² hexagon it falls in).

use h3o::{CellIndex, LatLng, Resolution};

use crate::error::{ModelError, Result};

/// Average earth radius in km, used for the great-circle distance and to
/// normalize the geo sub-score in the scoring kernel (C1).
pub const EARTH_RADIUS_KM: f64 = 6371.0;
pub const MAX_EARTH_DISTANCE_KM: f64 = std::f64::consts::PI * EARTH_RADIUS_KM;

/// A validated geographic point. Constructing one rejects exactly the
/// boundary cases §8 calls out: `NaN`, `±Inf`, `|lat|>90`, `|lon|>180`, and
/// the sentinel `(0, 0)` that most upstream geo-IP lookups use to mean "no
/// location available" rather than the actual Gulf of Guinea.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GeoPoint {
    lat: f64,
    lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Result<Self> {
        if !Self::is_valid(lat, lon) {
            return Err(ModelError::InvalidGeoPoint { lat, lon });
        }
        Ok(Self { lat, lon })
    }

    /// Boundary predicate used both by the constructor and by callers that
    /// want to check validity without allocating an error (e.g. the scoring
    /// kernel, which silently omits the geo sub-score rather than failing).
    pub fn is_valid(lat: f64, lon: f64) -> bool {
        if lat.is_nan() || lon.is_nan() || lat.is_infinite() || lon.is_infinite() {
            return false;
        }
        if lat.abs() > 90.0 || lon.abs() > 180.0 {
            return false;
        }
        if lat == 0.0 && lon == 0.0 {
            return false;
        }
        true
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lon(&self) -> f64 {
        self.lon
    }

    /// Great-circle distance via the spherical law of cosines, with the
    /// cosine argument clamped to `[-1, 1]` so floating-point error near
    /// antipodal points never produces a `NaN`.
    pub fn great_circle_km(&self, other: &GeoPoint) -> f64 {
        let (lat1, lon1) = (self.lat.to_radians(), self.lon.to_radians());
        let (lat2, lon2) = (other.lat.to_radians(), other.lon.to_radians());

        let cos_angle =
            lat1.sin() * lat2.sin() + lat1.cos() * lat2.cos() * (lon1 - lon2).cos();
        let clamped = cos_angle.clamp(-1.0, 1.0);

        clamped.acos() * EARTH_RADIUS_KM
    }

    /// Snap to the centroid of the H3 resolution-5 cell this point falls in.
    /// Used to bucket viewer/publisher coordinates before they reach
    /// analytics (§6.4). Returns `None` only if H3 itself rejects the point,
    /// which cannot happen for an already-validated `GeoPoint`.
    pub fn bucket(&self) -> Option<GeoBucket> {
        let ll = LatLng::new(self.lat, self.lon).ok()?;
        let cell = ll.to_cell(Resolution::Five);
        Some(GeoBucket(cell))
    }
}

/// A point snapped to an H3 resolution-5 hexagon. Round-trips: bucketing the
/// centroid of a bucket returns the same bucket (§8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GeoBucket(#[cfg_attr(feature = "serde", serde(with = "cell_index_as_u64"))] CellIndex);

impl GeoBucket {
    /// Centroid of this hexagon, as a validated `GeoPoint`.
    pub fn centroid(&self) -> GeoPoint {
        let ll = LatLng::from(self.0);
        // The centroid of any H3 cell is itself a valid, non-(0,0) point,
        // so this conversion cannot fail in practice; fall back to (0,0)
        // defensively rather than panicking on a library invariant we don't
        // control.
        GeoPoint::new(ll.lat(), ll.lng()).unwrap_or(GeoPoint { lat: 0.0, lon: 0.0 })
    }

    pub fn cell_index(&self) -> u64 {
        u64::from(self.0)
    }
}

#[cfg(feature = "serde")]
mod cell_index_as_u64 {
    use h3o::CellIndex;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(cell: &CellIndex, s: S) -> Result<S::Ok, S::Error> {
        u64::from(*cell).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<CellIndex, D::Error> {
        let raw = u64::deserialize(d)?;
        CellIndex::try_from(raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_nan_inf_out_of_range_and_origin() {
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
        assert!(GeoPoint::new(0.0, f64::INFINITY).is_err());
        assert!(GeoPoint::new(91.0, 0.0).is_err());
        assert!(GeoPoint::new(0.0, 181.0).is_err());
        assert!(GeoPoint::new(0.0, 0.0).is_err());
    }

    #[test]
    fn accepts_ordinary_points() {
        assert!(GeoPoint::new(52.37, 4.90).is_ok());
        assert!(GeoPoint::new(-90.0, 180.0).is_ok());
    }

    #[test]
    fn great_circle_distance_matches_known_cities() {
        let amsterdam = GeoPoint::new(52.37, 4.90).unwrap();
        let nyc = GeoPoint::new(40.71, -74.01).unwrap();
        let km = amsterdam.great_circle_km(&nyc);
        // ~5850 km in reality; allow generous tolerance for the spherical
        // (not ellipsoidal) approximation.
        assert!((5500.0..6200.0).contains(&km), "got {km}");
    }

    #[test]
    fn bucket_round_trips_through_centroid() {
        let p = GeoPoint::new(52.37, 4.90).unwrap();
        let bucket = p.bucket().unwrap();
        let centroid = bucket.centroid();
        let rebucketed = centroid.bucket().unwrap();
        assert_eq!(bucket, rebucketed);
    }
}
