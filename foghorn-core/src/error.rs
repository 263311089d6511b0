use thiserror::Error;

/// Stable codes forwarded to the edge node (and from there, in some cases,
/// to the publisher) on ingest/playback rejection. Renaming a variant
/// changes the wire contract, not just an internal message.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionCode {
    #[error("INVALID_STREAM_KEY")]
    InvalidStreamKey,
    #[error("ACCOUNT_SUSPENDED")]
    AccountSuspended,
    #[error("PAYMENT_REQUIRED")]
    PaymentRequired,
}

#[derive(Error, Debug)]
pub enum FoghornError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("ingest rejected: {0}")]
    IngestRejected(RejectionCode),

    #[error("no eligible node")]
    NoCapacity,

    #[error("downstream unavailable: {0}")]
    DownstreamUnavailable(String),

    #[error("trigger payload did not match its declared type: expected {expected}, got {actual}")]
    PayloadTypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("analytics event refused: tenant_id missing")]
    TenantMissing,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[cfg(feature = "database")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<foghorn_model::error::ModelError> for FoghornError {
    fn from(err: foghorn_model::error::ModelError) -> Self {
        FoghornError::InvalidArgument(err.to_string())
    }
}

impl From<foghorn_contracts::error::ContractError> for FoghornError {
    fn from(err: foghorn_contracts::error::ContractError) -> Self {
        use foghorn_contracts::error::ContractError;
        match err {
            ContractError::Unavailable(msg) => FoghornError::DownstreamUnavailable(msg),
            ContractError::NotFound(msg) => FoghornError::NotFound(msg),
            ContractError::Invalid(msg) => FoghornError::InvalidArgument(msg),
            ContractError::Internal(msg) => FoghornError::Internal(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, FoghornError>;
