//! Seam for the downstream collaborator that talks to the real database.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{RevealedSecret, Scope};

#[derive(Debug, Error)]
#[error("{message}")]
pub struct ResourceError {
    pub message: String,
}

impl ResourceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Executes an opaque request against the database behind an environment.
///
/// Implementations receive the plaintext connection string only after the
/// gateway has authorised the call; they must not log or retain it.
#[async_trait]
pub trait ResourceAccess: Send + Sync {
    type Request: Send;
    type Response: Send;

    async fn execute(
        &self,
        connection: &RevealedSecret,
        scope: &Scope,
        request: Self::Request,
    ) -> Result<Self::Response, ResourceError>;
}
