use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{EnvironmentStore, GrantStore, StoreResult, UserDirectory};
use crate::types::{
    AccessLevel, EncryptedSecret, EnvironmentGrant, EnvironmentId, EnvironmentRecord, GrantSet,
    Principal, PrincipalId, ResourceGrant, Role, Scope,
};

type EnvironmentKey = (PrincipalId, EnvironmentId);
type ResourceKey = (PrincipalId, EnvironmentId, String);

#[derive(Default)]
struct Environments {
    next_id: EnvironmentId,
    rows: BTreeMap<EnvironmentId, EnvironmentRecord>,
}

/// Process-local store backing all three seams. Each table sits behind its
/// own lock, so every operation is a single atomic read or write.
#[derive(Default)]
pub struct MemoryStore {
    environments: RwLock<Environments>,
    environment_grants: RwLock<HashMap<EnvironmentKey, AccessLevel>>,
    resource_grants: RwLock<HashMap<ResourceKey, AccessLevel>>,
    users: RwLock<HashMap<PrincipalId, Role>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user record; user management lives outside the core.
    pub fn with_user(self, id: PrincipalId, role: Role) -> Self {
        self.insert_user(id, role);
        self
    }

    pub fn insert_user(&self, id: PrincipalId, role: Role) {
        self.users.write().insert(id, role);
    }
}

#[async_trait]
impl GrantStore for MemoryStore {
    async fn get_grant(&self, principal: PrincipalId, scope: &Scope) -> StoreResult<AccessLevel> {
        let level = match scope {
            Scope::Environment { environment_id } => self
                .environment_grants
                .read()
                .get(&(principal, *environment_id))
                .copied(),
            Scope::Resource {
                environment_id,
                resource,
            } => self
                .resource_grants
                .read()
                .get(&(principal, *environment_id, resource.clone()))
                .copied(),
        };
        Ok(level.unwrap_or_default())
    }

    async fn set_grant(
        &self,
        principal: PrincipalId,
        scope: &Scope,
        level: AccessLevel,
    ) -> StoreResult<()> {
        match scope {
            Scope::Environment { environment_id } => {
                let key = (principal, *environment_id);
                let mut grants = self.environment_grants.write();
                if level == AccessLevel::None {
                    grants.remove(&key);
                } else {
                    grants.insert(key, level);
                }
            }
            Scope::Resource {
                environment_id,
                resource,
            } => {
                let key = (principal, *environment_id, resource.clone());
                let mut grants = self.resource_grants.write();
                if level == AccessLevel::None {
                    grants.remove(&key);
                } else {
                    grants.insert(key, level);
                }
            }
        }
        Ok(())
    }

    async fn list_grants_for_principal(&self, principal: PrincipalId) -> StoreResult<GrantSet> {
        let mut set = GrantSet {
            environments: self
                .environment_grants
                .read()
                .iter()
                .filter(|((owner, _), _)| *owner == principal)
                .map(|((_, environment_id), level)| EnvironmentGrant {
                    environment_id: *environment_id,
                    level: *level,
                })
                .collect(),
            resources: self
                .resource_grants
                .read()
                .iter()
                .filter(|((owner, _, _), _)| *owner == principal)
                .map(|((_, environment_id, resource), level)| ResourceGrant {
                    environment_id: *environment_id,
                    resource: resource.clone(),
                    level: *level,
                })
                .collect(),
        };
        set.sort();
        Ok(set)
    }

    async fn revoke_environment(&self, environment: EnvironmentId) -> StoreResult<u64> {
        let mut removed = 0u64;
        {
            let mut grants = self.environment_grants.write();
            let before = grants.len();
            grants.retain(|(_, environment_id), _| *environment_id != environment);
            removed += (before - grants.len()) as u64;
        }
        let mut grants = self.resource_grants.write();
        let before = grants.len();
        grants.retain(|(_, environment_id, _), _| *environment_id != environment);
        removed += (before - grants.len()) as u64;
        Ok(removed)
    }
}

#[async_trait]
impl EnvironmentStore for MemoryStore {
    async fn create_environment(
        &self,
        name: &str,
        secret: &EncryptedSecret,
        created_by: PrincipalId,
    ) -> StoreResult<EnvironmentRecord> {
        let mut environments = self.environments.write();
        environments.next_id += 1;
        let record = EnvironmentRecord {
            id: environments.next_id,
            name: name.to_string(),
            secret: secret.clone(),
            created_by,
        };
        environments.rows.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_environment(&self, id: EnvironmentId) -> StoreResult<Option<EnvironmentRecord>> {
        Ok(self.environments.read().rows.get(&id).cloned())
    }

    async fn list_environments(&self) -> StoreResult<Vec<EnvironmentRecord>> {
        Ok(self.environments.read().rows.values().cloned().collect())
    }

    async fn update_environment(
        &self,
        id: EnvironmentId,
        name: Option<&str>,
        secret: Option<&EncryptedSecret>,
    ) -> StoreResult<bool> {
        let mut environments = self.environments.write();
        let Some(record) = environments.rows.get_mut(&id) else {
            return Ok(false);
        };
        if let Some(name) = name {
            record.name = name.to_string();
        }
        if let Some(secret) = secret {
            record.secret = secret.clone();
        }
        Ok(true)
    }

    async fn delete_environment(&self, id: EnvironmentId) -> StoreResult<bool> {
        // Lock order: environments, then environment grants, then resource grants.
        let mut environments = self.environments.write();
        let mut environment_grants = self.environment_grants.write();
        let mut resource_grants = self.resource_grants.write();
        if environments.rows.remove(&id).is_none() {
            return Ok(false);
        }
        environment_grants.retain(|(_, environment_id), _| *environment_id != id);
        resource_grants.retain(|(_, environment_id, _), _| *environment_id != id);
        Ok(true)
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn find_principal(&self, id: PrincipalId) -> StoreResult<Option<Principal>> {
        Ok(self
            .users
            .read()
            .get(&id)
            .map(|role| Principal::new(id, *role)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn none_level_removes_row() {
        let store = MemoryStore::new();
        let scope = Scope::environment(1);
        store
            .set_grant(7, &scope, AccessLevel::ReadOnly)
            .await
            .unwrap();
        store.set_grant(7, &scope, AccessLevel::None).await.unwrap();
        assert_eq!(store.get_grant(7, &scope).await.unwrap(), AccessLevel::None);
        assert!(store.list_grants_for_principal(7).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upsert_keeps_a_single_row() {
        let store = MemoryStore::new();
        let scope = Scope::resource(2, "orders").unwrap();
        store
            .set_grant(3, &scope, AccessLevel::ReadOnly)
            .await
            .unwrap();
        store
            .set_grant(3, &scope, AccessLevel::ReadAndWrite)
            .await
            .unwrap();
        let grants = store.list_grants_for_principal(3).await.unwrap();
        assert_eq!(grants.resources.len(), 1);
        assert_eq!(grants.resources[0].level, AccessLevel::ReadAndWrite);
    }

    #[tokio::test]
    async fn revoke_environment_only_touches_that_environment() {
        let store = MemoryStore::new();
        store
            .set_grant(1, &Scope::environment(10), AccessLevel::ReadOnly)
            .await
            .unwrap();
        store
            .set_grant(1, &Scope::resource(10, "a").unwrap(), AccessLevel::ReadOnly)
            .await
            .unwrap();
        store
            .set_grant(1, &Scope::environment(11), AccessLevel::ReadOnly)
            .await
            .unwrap();

        assert_eq!(store.revoke_environment(10).await.unwrap(), 2);
        let remaining = store.list_grants_for_principal(1).await.unwrap();
        assert_eq!(
            remaining.environments,
            vec![EnvironmentGrant {
                environment_id: 11,
                level: AccessLevel::ReadOnly
            }]
        );
        assert!(remaining.resources.is_empty());
    }

    #[tokio::test]
    async fn environment_ids_are_assigned_sequentially() {
        let store = MemoryStore::new();
        let secret = EncryptedSecret::from_stored("blob");
        let first = store.create_environment("a", &secret, 1).await.unwrap();
        let second = store.create_environment("b", &secret, 1).await.unwrap();
        assert_eq!((first.id, second.id), (1, 2));
        assert!(store.delete_environment(1).await.unwrap());
        assert!(!store.update_environment(1, Some("gone"), None).await.unwrap());
        assert_eq!(store.list_environments().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn deleting_environment_drops_its_grants() {
        let store = MemoryStore::new();
        let secret = EncryptedSecret::from_stored("blob");
        let env = store.create_environment("a", &secret, 1).await.unwrap();
        store
            .set_grant(4, &Scope::environment(env.id), AccessLevel::ReadOnly)
            .await
            .unwrap();
        store
            .set_grant(4, &Scope::resource(env.id, "orders").unwrap(), AccessLevel::ReadOnly)
            .await
            .unwrap();

        assert!(store.delete_environment(env.id).await.unwrap());
        assert!(store.list_grants_for_principal(4).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writes_to_one_key_leave_one_row() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let scope = Scope::resource(1, "orders").unwrap();
        let mut writers = tokio::task::JoinSet::new();
        for n in 0..64 {
            let store = store.clone();
            let scope = scope.clone();
            let level = if n % 2 == 0 {
                AccessLevel::ReadOnly
            } else {
                AccessLevel::ReadAndWrite
            };
            writers.spawn(async move { store.set_grant(9, &scope, level).await });
        }
        while let Some(joined) = writers.join_next().await {
            joined.unwrap().unwrap();
        }

        let grants = store.list_grants_for_principal(9).await.unwrap();
        assert_eq!(grants.resources.len(), 1);
        assert!(matches!(
            grants.resources[0].level,
            AccessLevel::ReadOnly | AccessLevel::ReadAndWrite
        ));
    }
}
