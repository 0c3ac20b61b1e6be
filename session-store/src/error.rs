use thiserror::Error;

/// Errors returned by session store operations.
///
/// Every variant is recoverable: the request layer maps them to a
/// client-visible status and the store keeps serving other callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Store capacity exceeded: {required} bytes required, limit is {limit} bytes")]
    CapacityExceeded { required: usize, limit: usize },

    #[error("Invalid store configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
