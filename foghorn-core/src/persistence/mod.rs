//! Write-through/rehydrate persistence layer (§4.2, §6.6).

pub mod ports;

#[cfg(feature = "database")]
pub mod sqlx_repo;

pub use ports::{ArtifactNodeRepository, ArtifactRepository, NodeRepository};

#[cfg(feature = "database")]
pub use sqlx_repo::{PostgresArtifactNodeRepository, PostgresArtifactRepository, PostgresNodeRepository};
