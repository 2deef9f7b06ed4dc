use std::time::Duration;

use thiserror::Error;

use crate::types::Capability;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced by the core operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("no authenticated principal for this request")]
    Unauthenticated,
    #[error("identity already established for this request")]
    IdentityAlreadyEstablished,
    #[error("permission denied: {capability} on {target}")]
    PermissionDenied {
        target: String,
        capability: Capability,
        cause: Option<EvaluationUnavailable>,
    },
    #[error("{target} not found")]
    ScopeNotFound { target: String },
    #[error("stored secret failed integrity check: {0}")]
    TamperOrCorruption(String),
    #[error("entropy source unavailable: {0}")]
    Entropy(String),
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error(transparent)]
    Storage(#[from] StoreError),
    #[error("resource access timed out after {0:?}")]
    ResourceTimeout(Duration),
    #[error("resource access failed: {0}")]
    Resource(String),
}

impl Error {
    pub(crate) fn denied(target: impl ToString, capability: Capability) -> Self {
        Error::PermissionDenied {
            target: target.to_string(),
            capability,
            cause: None,
        }
    }

    pub(crate) fn not_found(target: impl ToString) -> Self {
        Error::ScopeNotFound {
            target: target.to_string(),
        }
    }

    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Error::Invalid {
            field,
            reason: reason.into(),
        }
    }

    /// The store failure behind a fail-closed denial, if any.
    pub fn evaluation_unavailable(&self) -> Option<&EvaluationUnavailable> {
        match self {
            Error::PermissionDenied { cause, .. } => cause.as_ref(),
            _ => None,
        }
    }

    /// Whether a transport-level retry may change the outcome.
    pub fn is_retryable(&self) -> bool {
        self.evaluation_unavailable().is_some() || matches!(self, Error::ResourceTimeout(_))
    }
}

/// I/O failure reported by a grant, environment, or user store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("store error: {0}")]
pub struct StoreError(pub String);

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A permission check could not be decided because the grant store failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("permission evaluation unavailable: {source}")]
pub struct EvaluationUnavailable {
    #[from]
    pub source: StoreError,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CipherError {
    #[error("encryption key must be {expected} bytes, got {actual}")]
    KeyLength { expected: usize, actual: usize },
    #[error("encryption key is not valid base64")]
    KeyEncoding,
    #[error("entropy source unavailable: {0}")]
    Entropy(String),
    #[error("failed to seal plaintext")]
    Seal,
    #[error("{0}")]
    TamperOrCorruption(&'static str),
}

impl From<CipherError> for Error {
    fn from(value: CipherError) -> Self {
        match value {
            CipherError::KeyLength { .. } | CipherError::KeyEncoding => {
                Error::invalid("encryption key", value.to_string())
            }
            CipherError::Entropy(reason) => Error::Entropy(reason),
            CipherError::Seal => Error::invalid("plaintext", value.to_string()),
            CipherError::TamperOrCorruption(reason) => Error::TamperOrCorruption(reason.into()),
        }
    }
}
