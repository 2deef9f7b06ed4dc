use std::str::FromStr;

use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::debug;

use super::{EnvironmentStore, GrantStore, StoreResult, UserDirectory};
use crate::errors::StoreError;
use crate::types::{
    AccessLevel, EncryptedSecret, EnvironmentGrant, EnvironmentId, EnvironmentRecord, GrantSet,
    Principal, PrincipalId, ResourceGrant, Role, Scope,
};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        role TEXT NOT NULL DEFAULT 'user'
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS environments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        connection_string TEXT NOT NULL,
        created_by INTEGER NOT NULL,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now'))
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_env_permissions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        environment_id INTEGER NOT NULL,
        permission TEXT NOT NULL,
        UNIQUE (user_id, environment_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_db_permissions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL,
        environment_id INTEGER NOT NULL,
        db_name TEXT NOT NULL,
        permission TEXT NOT NULL,
        UNIQUE (user_id, environment_id, db_name)
    )
    "#,
];

fn db_err(err: sqlx::Error) -> StoreError {
    StoreError::new(err.to_string())
}

fn parse_level(raw: &str) -> StoreResult<AccessLevel> {
    AccessLevel::from_str(raw).map_err(|_| StoreError::new(format!("unknown permission `{raw}`")))
}

type EnvironmentRow = (i64, String, String, i64);

fn record(row: EnvironmentRow) -> EnvironmentRecord {
    let (id, name, blob, created_by) = row;
    EnvironmentRecord {
        id,
        name,
        secret: EncryptedSecret::from_stored(blob),
        created_by,
    }
}

/// SQLite-backed store for users, environments, and both grant tables.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `url` and run migrations.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(db_err)?
            .create_if_missing(true);
        // Every connection to `:memory:` is its own database.
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(db_err)?;
        Self::new(pool).await
    }

    pub async fn new(pool: SqlitePool) -> StoreResult<Self> {
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn migrate(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
        }
        debug!("sqlite schema ready");
        Ok(())
    }

    /// Insert or update a user record. Accounts are normally provisioned by
    /// the external user service; this exists for bootstrap and tests.
    pub async fn upsert_user(&self, id: PrincipalId, email: &str, role: Role) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO users (id, email, role) VALUES (?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET email = excluded.email, role = excluded.role",
        )
        .bind(id)
        .bind(email)
        .bind(role.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}

#[async_trait]
impl GrantStore for SqliteStore {
    async fn get_grant(&self, principal: PrincipalId, scope: &Scope) -> StoreResult<AccessLevel> {
        let raw: Option<(String,)> = match scope {
            Scope::Environment { environment_id } => sqlx::query_as(
                "SELECT permission FROM user_env_permissions \
                 WHERE user_id = ? AND environment_id = ?",
            )
            .bind(principal)
            .bind(environment_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?,
            Scope::Resource {
                environment_id,
                resource,
            } => sqlx::query_as(
                "SELECT permission FROM user_db_permissions \
                 WHERE user_id = ? AND environment_id = ? AND db_name = ?",
            )
            .bind(principal)
            .bind(environment_id)
            .bind(resource)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?,
        };
        match raw {
            Some((level,)) => parse_level(&level),
            None => Ok(AccessLevel::None),
        }
    }

    async fn set_grant(
        &self,
        principal: PrincipalId,
        scope: &Scope,
        level: AccessLevel,
    ) -> StoreResult<()> {
        let query = match (scope, level) {
            (Scope::Environment { environment_id }, AccessLevel::None) => sqlx::query(
                "DELETE FROM user_env_permissions WHERE user_id = ? AND environment_id = ?",
            )
            .bind(principal)
            .bind(*environment_id),
            (Scope::Environment { environment_id }, level) => sqlx::query(
                "INSERT INTO user_env_permissions (user_id, environment_id, permission) \
                 VALUES (?, ?, ?) \
                 ON CONFLICT(user_id, environment_id) DO UPDATE SET permission = excluded.permission",
            )
            .bind(principal)
            .bind(*environment_id)
            .bind(level.as_str()),
            (
                Scope::Resource {
                    environment_id,
                    resource,
                },
                AccessLevel::None,
            ) => sqlx::query(
                "DELETE FROM user_db_permissions \
                 WHERE user_id = ? AND environment_id = ? AND db_name = ?",
            )
            .bind(principal)
            .bind(*environment_id)
            .bind(resource.as_str()),
            (
                Scope::Resource {
                    environment_id,
                    resource,
                },
                level,
            ) => sqlx::query(
                "INSERT INTO user_db_permissions (user_id, environment_id, db_name, permission) \
                 VALUES (?, ?, ?, ?) \
                 ON CONFLICT(user_id, environment_id, db_name) \
                 DO UPDATE SET permission = excluded.permission",
            )
            .bind(principal)
            .bind(*environment_id)
            .bind(resource.as_str())
            .bind(level.as_str()),
        };
        query.execute(&self.pool).await.map_err(db_err)?;
        Ok(())
    }

    async fn list_grants_for_principal(&self, principal: PrincipalId) -> StoreResult<GrantSet> {
        let env_rows: Vec<(i64, String)> = sqlx::query_as(
            "SELECT environment_id, permission FROM user_env_permissions \
             WHERE user_id = ? ORDER BY environment_id",
        )
        .bind(principal)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let resource_rows: Vec<(i64, String, String)> = sqlx::query_as(
            "SELECT environment_id, db_name, permission FROM user_db_permissions \
             WHERE user_id = ? ORDER BY environment_id, db_name",
        )
        .bind(principal)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut set = GrantSet::default();
        for (environment_id, level) in env_rows {
            set.environments.push(EnvironmentGrant {
                environment_id,
                level: parse_level(&level)?,
            });
        }
        for (environment_id, resource, level) in resource_rows {
            set.resources.push(ResourceGrant {
                environment_id,
                resource,
                level: parse_level(&level)?,
            });
        }
        set.sort();
        Ok(set)
    }

    async fn revoke_environment(&self, environment: EnvironmentId) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let envs = sqlx::query("DELETE FROM user_env_permissions WHERE environment_id = ?")
            .bind(environment)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?
            .rows_affected();
        let resources = sqlx::query("DELETE FROM user_db_permissions WHERE environment_id = ?")
            .bind(environment)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?
            .rows_affected();
        tx.commit().await.map_err(db_err)?;
        Ok(envs + resources)
    }
}

#[async_trait]
impl EnvironmentStore for SqliteStore {
    async fn create_environment(
        &self,
        name: &str,
        secret: &EncryptedSecret,
        created_by: PrincipalId,
    ) -> StoreResult<EnvironmentRecord> {
        let row: EnvironmentRow = sqlx::query_as(
            "INSERT INTO environments (name, connection_string, created_by) VALUES (?, ?, ?) \
             RETURNING id, name, connection_string, created_by",
        )
        .bind(name)
        .bind(secret.as_str())
        .bind(created_by)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(record(row))
    }

    async fn get_environment(&self, id: EnvironmentId) -> StoreResult<Option<EnvironmentRecord>> {
        let row: Option<EnvironmentRow> = sqlx::query_as(
            "SELECT id, name, connection_string, created_by FROM environments WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(record))
    }

    async fn list_environments(&self) -> StoreResult<Vec<EnvironmentRecord>> {
        let rows: Vec<EnvironmentRow> = sqlx::query_as(
            "SELECT id, name, connection_string, created_by FROM environments ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(record).collect())
    }

    async fn update_environment(
        &self,
        id: EnvironmentId,
        name: Option<&str>,
        secret: Option<&EncryptedSecret>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE environments SET name = COALESCE(?, name), \
             connection_string = COALESCE(?, connection_string), \
             updated_at = datetime('now') WHERE id = ?",
        )
        .bind(name)
        .bind(secret.map(EncryptedSecret::as_str))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_environment(&self, id: EnvironmentId) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let deleted = sqlx::query("DELETE FROM environments WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?
            .rows_affected();
        if deleted == 0 {
            return Ok(false);
        }
        for statement in [
            "DELETE FROM user_env_permissions WHERE environment_id = ?",
            "DELETE FROM user_db_permissions WHERE environment_id = ?",
        ] {
            sqlx::query(statement)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)?;
        Ok(true)
    }
}

#[async_trait]
impl UserDirectory for SqliteStore {
    async fn find_principal(&self, id: PrincipalId) -> StoreResult<Option<Principal>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT role FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        match row {
            Some((role,)) => {
                let role = Role::from_str(&role)
                    .map_err(|_| StoreError::new(format!("user {id} has unknown role `{role}`")))?;
                Ok(Some(Principal::new(id, role)))
            }
            None => Ok(None),
        }
    }
}
