//! Error types shared by the hub and its collaborators.

use thiserror::Error;

/// Failure reported by the project store or the object store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested record or object does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// The backend could not serve the request.
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// The identity provider refused a bearer token.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid or expired token")]
    InvalidToken,

    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

/// The code generator did not produce a usable program.
///
/// Every variant consumes one attempt of the deployment loop.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generator transport failure: {0}")]
    Transport(String),

    #[error("generator returned no choices")]
    EmptyResponse,

    #[error("no ```{0} code block in response")]
    MissingCodeBlock(&'static str),
}
