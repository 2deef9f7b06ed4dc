use monji_core::{
    AccessLevel, Capability, EnvironmentId, GrantSet, Principal, PrincipalId, Role, Scope,
};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterEnvironmentRequest {
    pub name: String,
    pub connection_string: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessCheckRequest {
    pub environment_id: EnvironmentId,
    #[serde(default)]
    pub resource: Option<String>,
    pub capability: Capability,
}

impl AccessCheckRequest {
    pub fn scope(&self) -> Result<Scope, AppError> {
        match &self.resource {
            Some(resource) => Ok(Scope::resource(self.environment_id, resource.clone())?),
            None => Ok(Scope::environment(self.environment_id)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessCheckResponse {
    pub scope: Scope,
    pub capability: Capability,
    pub allowed: bool,
    pub permission: AccessLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetPermissionRequest {
    pub permission: AccessLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantResponse {
    pub user_id: PrincipalId,
    pub scope: Scope,
    pub permission: AccessLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionsResponse {
    pub user_id: PrincipalId,
    #[serde(flatten)]
    pub grants: GrantSet,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhoAmIResponse {
    pub id: PrincipalId,
    pub role: Role,
    #[serde(flatten)]
    pub grants: GrantSet,
}

impl WhoAmIResponse {
    pub fn new(principal: &Principal, grants: GrantSet) -> Self {
        Self {
            id: principal.id(),
            role: principal.role(),
            grants,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub id: EnvironmentId,
    pub deleted: bool,
}
