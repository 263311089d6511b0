use thiserror::Error;

use crate::weights::Weights;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("invalid geo coordinate: lat={lat}, lon={lon}")]
    InvalidGeoPoint { lat: f64, lon: f64 },

    #[error("invalid node id: {0}")]
    InvalidNodeId(String),

    #[error("invalid artifact hash: {0}")]
    InvalidArtifactHash(String),

    #[error("weights must all be positive, got {0:?}")]
    InvalidWeights(Weights),
}

pub type Result<T> = std::result::Result<T, ModelError>;
