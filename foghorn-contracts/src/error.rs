use thiserror::Error;

/// Error surface shared by every external-collaborator trait in this crate.
/// Deliberately coarse: callers (the reconnect supervisor, the trigger
/// processor) only ever need to distinguish "unreachable, try later" from
/// "the call completed and said no" from "programmer error".
#[derive(Error, Debug, Clone)]
pub enum ContractError {
    #[error("downstream unavailable: {0}")]
    Unavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ContractError>;
