use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::crypto::{SecretCipher, mask};
use crate::errors::{Error, Result};
use crate::policy::AccessEvaluator;
use crate::resource::ResourceAccess;
use crate::store::{EnvironmentStore, GrantStore};
use crate::types::{
    AccessLevel, Capability, EnvironmentId, EnvironmentRecord, EnvironmentSummary,
    EnvironmentUpdate, GrantSet, Principal, PrincipalId, RevealedSecret, Scope,
};

pub const DEFAULT_RESOURCE_TIMEOUT: Duration = Duration::from_secs(10);

const REGISTRY: &str = "environment registry";

/// Every path that touches a stored connection string.
///
/// Each operation runs the access check first and only then loads, decrypts,
/// or writes the secret, so an unauthorised caller learns nothing about
/// whether an environment exists.
pub struct CredentialGateway<E, G> {
    environments: E,
    evaluator: AccessEvaluator<G>,
    cipher: Arc<SecretCipher>,
    resource_timeout: Duration,
}

impl<E, G> CredentialGateway<E, G>
where
    E: EnvironmentStore,
    G: GrantStore,
{
    pub fn new(environments: E, grants: G, cipher: Arc<SecretCipher>) -> Self {
        Self {
            environments,
            evaluator: AccessEvaluator::new(grants),
            cipher,
            resource_timeout: DEFAULT_RESOURCE_TIMEOUT,
        }
    }

    pub fn with_resource_timeout(mut self, timeout: Duration) -> Self {
        self.resource_timeout = timeout;
        self
    }

    pub fn evaluator(&self) -> &AccessEvaluator<G> {
        &self.evaluator
    }

    pub fn resource_timeout(&self) -> Duration {
        self.resource_timeout
    }

    pub async fn check_access(
        &self,
        principal: &Principal,
        scope: &Scope,
        required: Capability,
    ) -> Result<()> {
        self.evaluator.check(principal, scope, required).await
    }

    /// Decrypted connection string. Callers must never log or return it to
    /// an end user; it is meant for the resource-access collaborator.
    pub async fn reveal(
        &self,
        principal: &Principal,
        environment: EnvironmentId,
    ) -> Result<RevealedSecret> {
        let scope = Scope::environment(environment);
        self.check_access(principal, &scope, Capability::Read).await?;
        let record = self.load(environment).await?;
        self.open(&record)
    }

    /// Masked connection string for display.
    pub async fn describe(&self, principal: &Principal, environment: EnvironmentId) -> Result<String> {
        Ok(self.reveal(principal, environment).await?.masked())
    }

    /// Encrypt `connection` and swap it in for the stored secret.
    pub async fn rotate(
        &self,
        principal: &Principal,
        environment: EnvironmentId,
        connection: &str,
    ) -> Result<()> {
        let scope = Scope::environment(environment);
        self.check_access(principal, &scope, Capability::Write).await?;
        require_text("connection_string", connection)?;

        let sealed = self.cipher.encrypt(connection)?;
        if !self
            .environments
            .update_environment(environment, None, Some(&sealed))
            .await?
        {
            return Err(Error::not_found(scope));
        }
        info!(
            target: "audit",
            action = "environment.rotate",
            principal = principal.id(),
            environment,
            "connection string rotated"
        );
        Ok(())
    }

    pub async fn register(
        &self,
        principal: &Principal,
        name: &str,
        connection: &str,
    ) -> Result<EnvironmentSummary> {
        if !principal.is_elevated() {
            info!(
                target: "audit",
                action = "access.denied",
                principal = principal.id(),
                scope = REGISTRY,
                "registration requires an admin"
            );
            return Err(Error::denied(REGISTRY, Capability::Write));
        }
        let name = require_text("name", name)?;
        require_text("connection_string", connection)?;

        let sealed = self.cipher.encrypt(connection)?;
        let record = self
            .environments
            .create_environment(name, &sealed, principal.id())
            .await?;
        info!(
            target: "audit",
            action = "environment.register",
            principal = principal.id(),
            environment = record.id,
            "environment registered"
        );
        Ok(EnvironmentSummary {
            id: record.id,
            name: record.name,
            connection_string: mask(connection),
            created_by: record.created_by,
            my_permission: AccessLevel::ReadAndWrite,
        })
    }

    /// Every environment `principal` can read, masked.
    pub async fn list_environments(&self, principal: &Principal) -> Result<Vec<EnvironmentSummary>> {
        let mut visible = Vec::new();
        for record in self.environments.list_environments().await? {
            let level = self
                .evaluator
                .effective_level(principal, &Scope::environment(record.id))
                .await?;
            if level.permits(Capability::Read) {
                visible.push(self.summarize(record, level)?);
            }
        }
        Ok(visible)
    }

    pub async fn describe_environment(
        &self,
        principal: &Principal,
        environment: EnvironmentId,
    ) -> Result<EnvironmentSummary> {
        let scope = Scope::environment(environment);
        self.check_access(principal, &scope, Capability::Read).await?;
        let record = self.load(environment).await?;
        let level = self.evaluator.effective_level(principal, &scope).await?;
        self.summarize(record, level)
    }

    /// Rename and/or rotate an environment in one write.
    pub async fn update_environment(
        &self,
        principal: &Principal,
        environment: EnvironmentId,
        update: &EnvironmentUpdate,
    ) -> Result<EnvironmentSummary> {
        let scope = Scope::environment(environment);
        self.check_access(principal, &scope, Capability::Write).await?;

        let name = update
            .name
            .as_deref()
            .map(|name| require_text("name", name))
            .transpose()?;
        let connection = update
            .connection_string
            .as_deref()
            .map(|connection| require_text("connection_string", connection))
            .transpose()?;
        if name.is_none() && connection.is_none() {
            return Err(Error::invalid("update", "nothing to change"));
        }

        let sealed = connection
            .map(|connection| self.cipher.encrypt(connection))
            .transpose()?;
        if !self
            .environments
            .update_environment(environment, name, sealed.as_ref())
            .await?
        {
            return Err(Error::not_found(scope));
        }
        info!(
            target: "audit",
            action = "environment.update",
            principal = principal.id(),
            environment,
            renamed = name.is_some(),
            rotated = sealed.is_some(),
            "environment updated"
        );
        self.describe_environment(principal, environment).await
    }

    /// Delete an environment together with every grant beneath it.
    ///
    /// Grants go first, so a failed revoke leaves the environment in place
    /// and a failed delete leaves it without grants.
    pub async fn delete_environment(
        &self,
        principal: &Principal,
        environment: EnvironmentId,
    ) -> Result<()> {
        let scope = Scope::environment(environment);
        self.check_access(principal, &scope, Capability::Write).await?;
        self.load(environment).await?;
        let revoked = self.evaluator.grants().revoke_environment(environment).await?;
        if !self.environments.delete_environment(environment).await? {
            return Err(Error::not_found(scope));
        }
        info!(
            target: "audit",
            action = "environment.delete",
            principal = principal.id(),
            environment,
            revoked,
            "environment deleted"
        );
        Ok(())
    }

    /// Authorise `required` on `scope`, then hand the revealed connection
    /// string to `collaborator` under the configured deadline.
    pub async fn dispatch<R>(
        &self,
        principal: &Principal,
        scope: &Scope,
        required: Capability,
        collaborator: &R,
        request: R::Request,
    ) -> Result<R::Response>
    where
        R: ResourceAccess,
    {
        self.check_access(principal, scope, required).await?;
        let record = self.load(scope.environment_id()).await?;
        let connection = self.open(&record)?;

        match tokio::time::timeout(
            self.resource_timeout,
            collaborator.execute(&connection, scope, request),
        )
        .await
        {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(err)) => {
                warn!(%scope, error = %err, "resource access failed");
                Err(Error::Resource(err.message))
            }
            Err(_) => {
                warn!(%scope, timeout = ?self.resource_timeout, "resource access timed out");
                Err(Error::ResourceTimeout(self.resource_timeout))
            }
        }
    }

    /// Upsert a grant. Only elevated principals may change grants, and the
    /// environment must exist.
    pub async fn set_grant(
        &self,
        actor: &Principal,
        principal: PrincipalId,
        scope: &Scope,
        level: AccessLevel,
    ) -> Result<()> {
        if !actor.is_elevated() {
            return Err(Error::denied(format!("grants of user {principal}"), Capability::Write));
        }
        self.load(scope.environment_id()).await?;
        self.evaluator
            .grants()
            .set_grant(principal, scope, level)
            .await?;
        info!(
            target: "audit",
            action = "grant.set",
            actor = actor.id(),
            principal,
            %scope,
            %level,
            "grant updated"
        );
        Ok(())
    }

    pub async fn get_grant(
        &self,
        actor: &Principal,
        principal: PrincipalId,
        scope: &Scope,
    ) -> Result<AccessLevel> {
        ensure_can_view_grants(actor, principal)?;
        Ok(self.evaluator.grants().get_grant(principal, scope).await?)
    }

    pub async fn list_grants_for_principal(
        &self,
        actor: &Principal,
        principal: PrincipalId,
    ) -> Result<GrantSet> {
        ensure_can_view_grants(actor, principal)?;
        Ok(self
            .evaluator
            .grants()
            .list_grants_for_principal(principal)
            .await?)
    }

    async fn load(&self, environment: EnvironmentId) -> Result<EnvironmentRecord> {
        self.environments
            .get_environment(environment)
            .await?
            .ok_or_else(|| Error::not_found(Scope::environment(environment)))
    }

    fn open(&self, record: &EnvironmentRecord) -> Result<RevealedSecret> {
        self.cipher.decrypt(&record.secret).map_err(|err| {
            error!(
                target: "audit",
                action = "secret.integrity_failure",
                environment = record.id,
                error = %err,
                "stored connection string failed to decrypt"
            );
            Error::from(err)
        })
    }

    fn summarize(&self, record: EnvironmentRecord, level: AccessLevel) -> Result<EnvironmentSummary> {
        let connection_string = self.open(&record)?.masked();
        Ok(EnvironmentSummary {
            id: record.id,
            name: record.name,
            connection_string,
            created_by: record.created_by,
            my_permission: level,
        })
    }
}

fn require_text<'a>(field: &'static str, value: &'a str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::invalid(field, "must not be empty"));
    }
    Ok(trimmed)
}

fn ensure_can_view_grants(actor: &Principal, principal: PrincipalId) -> Result<()> {
    if actor.is_elevated() || actor.id() == principal {
        Ok(())
    } else {
        Err(Error::denied(format!("grants of user {principal}"), Capability::Read))
    }
}
