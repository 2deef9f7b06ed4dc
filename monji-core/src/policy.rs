//! Grant resolution.
//!
//! Elevated roles are allowed unconditionally. Everyone else needs a stored
//! grant on the scope; resource scopes additionally require environment read
//! (the baseline check) before the resource grant is consulted.

use tracing::{debug, error, info};

use crate::errors::{Error, EvaluationUnavailable, Result};
use crate::store::GrantStore;
use crate::types::{AccessLevel, Capability, EnvironmentId, Principal, Scope};

pub struct AccessEvaluator<G> {
    grants: G,
}

impl<G> AccessEvaluator<G>
where
    G: GrantStore,
{
    pub fn new(grants: G) -> Self {
        Self { grants }
    }

    pub fn grants(&self) -> &G {
        &self.grants
    }

    /// Decide whether `principal` holds `required` on `scope`.
    ///
    /// A missing grant is `Ok(false)`. Only store failures produce an error.
    pub async fn can_access(
        &self,
        principal: &Principal,
        scope: &Scope,
        required: Capability,
    ) -> std::result::Result<bool, EvaluationUnavailable> {
        if principal.is_elevated() {
            return Ok(true);
        }
        match scope {
            Scope::Environment { .. } => {
                let level = self.grants.get_grant(principal.id(), scope).await?;
                Ok(level.permits(required))
            }
            Scope::Resource { .. } => {
                let baseline = self.grants.get_grant(principal.id(), &scope.parent()).await?;
                if !baseline.permits(Capability::Read) {
                    return Ok(false);
                }
                let level = self.grants.get_grant(principal.id(), scope).await?;
                Ok(level.permits(required))
            }
        }
    }

    /// [`Self::can_access`] as a guard: denials and store failures both
    /// become `PermissionDenied`, the latter with its cause attached.
    pub async fn check(
        &self,
        principal: &Principal,
        scope: &Scope,
        required: Capability,
    ) -> Result<()> {
        match self.can_access(principal, scope, required).await {
            Ok(true) => {
                debug!(principal = principal.id(), %scope, %required, "access granted");
                Ok(())
            }
            Ok(false) => {
                info!(
                    target: "audit",
                    action = "access.denied",
                    principal = principal.id(),
                    %scope,
                    %required,
                    "access denied"
                );
                Err(Error::denied(scope, required))
            }
            Err(cause) => {
                error!(
                    target: "audit",
                    action = "access.unavailable",
                    principal = principal.id(),
                    %scope,
                    %required,
                    error = %cause,
                    "permission evaluation failed; denying"
                );
                Err(Error::PermissionDenied {
                    target: scope.to_string(),
                    capability: required,
                    cause: Some(cause),
                })
            }
        }
    }

    /// The level the caller effectively holds on `scope`.
    ///
    /// Elevated roles report `readAndWrite`. A resource grant counts only
    /// when the baseline read on its environment holds.
    pub async fn effective_level(&self, principal: &Principal, scope: &Scope) -> Result<AccessLevel> {
        if principal.is_elevated() {
            return Ok(AccessLevel::ReadAndWrite);
        }
        let unavailable = |source| Error::PermissionDenied {
            target: scope.to_string(),
            capability: Capability::Read,
            cause: Some(EvaluationUnavailable { source }),
        };
        if scope.resource_name().is_some() {
            let baseline = self
                .grants
                .get_grant(principal.id(), &scope.parent())
                .await
                .map_err(unavailable)?;
            if !baseline.permits(Capability::Read) {
                return Ok(AccessLevel::None);
            }
        }
        self.grants
            .get_grant(principal.id(), scope)
            .await
            .map_err(unavailable)
    }

    /// Keep the resource names `principal` may read, with their levels.
    pub async fn readable_resources<I, S>(
        &self,
        principal: &Principal,
        environment: EnvironmentId,
        names: I,
    ) -> Result<Vec<(String, AccessLevel)>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut readable = Vec::new();
        for name in names {
            let scope = Scope::resource(environment, name)?;
            let level = self.effective_level(principal, &scope).await?;
            if level.permits(Capability::Read) {
                if let Scope::Resource { resource, .. } = scope {
                    readable.push((resource, level));
                }
            }
        }
        Ok(readable)
    }
}
