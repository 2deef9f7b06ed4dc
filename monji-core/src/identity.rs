use std::sync::OnceLock;

use crate::errors::{Error, Result};
use crate::types::Principal;

/// Per-request holder for the authenticated principal.
///
/// The authentication layer establishes the principal once; it cannot be
/// replaced afterwards.
#[derive(Debug, Default, Clone)]
pub struct IdentityContext {
    principal: OnceLock<Principal>,
}

impl IdentityContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn authenticated(principal: Principal) -> Self {
        let context = Self::new();
        let _ = context.principal.set(principal);
        context
    }

    pub fn establish(&self, principal: Principal) -> Result<()> {
        self.principal
            .set(principal)
            .map_err(|_| Error::IdentityAlreadyEstablished)
    }

    /// The principal, or `Unauthenticated` when none was established.
    pub fn principal(&self) -> Result<&Principal> {
        self.principal.get().ok_or(Error::Unauthenticated)
    }
}
