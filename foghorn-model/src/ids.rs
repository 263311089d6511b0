//! Strongly typed identifiers, following the newtype-per-entity convention
//! used throughout the rest of this codebase: cheap to `Clone`, `Display`
//! for logging, and never interchangeable across entity kinds even though
//! several of them wrap a bare `String` or `Uuid`.

use std::fmt;

use uuid::Uuid;

macro_rules! string_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[cfg_attr(feature = "serde", serde(transparent))]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

macro_rules! uuid_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[cfg_attr(feature = "serde", serde(transparent))]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// Stable identity of a media node reachable in this cluster. Not a UUID in
// the source system — operators assign human-readable node ids.
string_id!(NodeId, "Stable identifier for a media node.");

// The canonical identifier for a live stream, independent of stream keys or
// playback ids. Often (but not required to be) a UUID, so this stays a
// `String` rather than a `Uuid` newtype.
string_id!(InternalName, "Canonical identifier for a live stream.");

uuid_id!(TenantId, "Identity of a billing tenant.");
uuid_id!(UserId, "Identity of a publisher/viewer account.");
uuid_id!(StreamRegistryId, "Commodore's own stream row identity.");
uuid_id!(CorrelationId, "Virtual-viewer routing correlation id (`fwcid`).");

// Content-addressed hash identifying an artifact (clip/DVR/VOD asset).
string_id!(ArtifactHash, "Content-addressed hash identifying an artifact.");
