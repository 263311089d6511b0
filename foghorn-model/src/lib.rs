//! Shared data models for the Foghorn load balancer and control plane.
//!
//! This crate has no I/O and no async dependencies: it is the vocabulary
//! every other crate in the workspace shares, not a service.

pub mod artifact;
pub mod error;
pub mod geo;
pub mod ids;
pub mod node;
pub mod stream;
pub mod viewer;
pub mod weights;

pub mod prelude {
    pub use crate::artifact::{Artifact, ArtifactNode, ArtifactStatus, ArtifactType, StorageLocation};
    pub use crate::error::{ModelError, Result};
    pub use crate::geo::{GeoBucket, GeoPoint, EARTH_RADIUS_KM, MAX_EARTH_DISTANCE_KM};
    pub use crate::ids::{
        ArtifactHash, CorrelationId, InternalName, NodeId, StreamRegistryId, TenantId, UserId,
    };
    pub use crate::node::{Node, NodeArtifactEntry, NodeCapabilities, NodeCapacity, NodeMetrics, NodeMode};
    pub use crate::stream::{BufferState, Stream, StreamInstance, StreamStatus, TrackInfo};
    pub use crate::viewer::{VirtualViewer, VirtualViewerKey, VirtualViewerState};
    pub use crate::weights::Weights;
}
