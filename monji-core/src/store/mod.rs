//! Persistence seams for grants, environments, and user roles.

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::StoreError;
use crate::types::{
    AccessLevel, EncryptedSecret, EnvironmentId, EnvironmentRecord, GrantSet, Principal,
    PrincipalId, Scope,
};

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Durable mapping of (principal, scope) to a grant level.
///
/// At most one row exists per key. Writing [`AccessLevel::None`] removes the
/// row, so a missing row and an explicit `none` are indistinguishable.
#[async_trait]
pub trait GrantStore: Send + Sync {
    async fn get_grant(&self, principal: PrincipalId, scope: &Scope) -> StoreResult<AccessLevel>;
    async fn set_grant(
        &self,
        principal: PrincipalId,
        scope: &Scope,
        level: AccessLevel,
    ) -> StoreResult<()>;
    async fn list_grants_for_principal(&self, principal: PrincipalId) -> StoreResult<GrantSet>;
    /// Drop every environment and resource grant under an environment.
    async fn revoke_environment(&self, environment: EnvironmentId) -> StoreResult<u64>;
}

/// Environment rows and their encrypted connection strings.
#[async_trait]
pub trait EnvironmentStore: Send + Sync {
    async fn create_environment(
        &self,
        name: &str,
        secret: &EncryptedSecret,
        created_by: PrincipalId,
    ) -> StoreResult<EnvironmentRecord>;
    async fn get_environment(&self, id: EnvironmentId) -> StoreResult<Option<EnvironmentRecord>>;
    async fn list_environments(&self) -> StoreResult<Vec<EnvironmentRecord>>;
    /// Apply a new name and/or ciphertext in a single write. Returns `false`
    /// when no such environment exists.
    async fn update_environment(
        &self,
        id: EnvironmentId,
        name: Option<&str>,
        secret: Option<&EncryptedSecret>,
    ) -> StoreResult<bool>;
    /// Remove the row together with any grants this store keeps for it.
    async fn delete_environment(&self, id: EnvironmentId) -> StoreResult<bool>;
}

/// Read-only view of the user records that own principal roles.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_principal(&self, id: PrincipalId) -> StoreResult<Option<Principal>>;
}

#[async_trait]
impl<T> GrantStore for Arc<T>
where
    T: GrantStore + ?Sized,
{
    async fn get_grant(&self, principal: PrincipalId, scope: &Scope) -> StoreResult<AccessLevel> {
        (**self).get_grant(principal, scope).await
    }
    async fn set_grant(
        &self,
        principal: PrincipalId,
        scope: &Scope,
        level: AccessLevel,
    ) -> StoreResult<()> {
        (**self).set_grant(principal, scope, level).await
    }
    async fn list_grants_for_principal(&self, principal: PrincipalId) -> StoreResult<GrantSet> {
        (**self).list_grants_for_principal(principal).await
    }
    async fn revoke_environment(&self, environment: EnvironmentId) -> StoreResult<u64> {
        (**self).revoke_environment(environment).await
    }
}

#[async_trait]
impl<T> EnvironmentStore for Arc<T>
where
    T: EnvironmentStore + ?Sized,
{
    async fn create_environment(
        &self,
        name: &str,
        secret: &EncryptedSecret,
        created_by: PrincipalId,
    ) -> StoreResult<EnvironmentRecord> {
        (**self).create_environment(name, secret, created_by).await
    }
    async fn get_environment(&self, id: EnvironmentId) -> StoreResult<Option<EnvironmentRecord>> {
        (**self).get_environment(id).await
    }
    async fn list_environments(&self) -> StoreResult<Vec<EnvironmentRecord>> {
        (**self).list_environments().await
    }
    async fn update_environment(
        &self,
        id: EnvironmentId,
        name: Option<&str>,
        secret: Option<&EncryptedSecret>,
    ) -> StoreResult<bool> {
        (**self).update_environment(id, name, secret).await
    }
    async fn delete_environment(&self, id: EnvironmentId) -> StoreResult<bool> {
        (**self).delete_environment(id).await
    }
}

#[async_trait]
impl<T> UserDirectory for Arc<T>
where
    T: UserDirectory + ?Sized,
{
    async fn find_principal(&self, id: PrincipalId) -> StoreResult<Option<Principal>> {
        (**self).find_principal(id).await
    }
}
