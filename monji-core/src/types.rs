use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::crypto::mask;
use crate::errors::{Error, Result};

pub type PrincipalId = i64;
pub type EnvironmentId = i64;

/// Role assigned by the user directory.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
    Superadmin,
}

impl Role {
    /// Admins and superadmins bypass every grant lookup.
    pub const fn is_elevated(self) -> bool {
        matches!(self, Role::Admin | Role::Superadmin)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::Superadmin => "superadmin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            "superadmin" => Ok(Role::Superadmin),
            other => Err(Error::invalid("role", format!("unknown role `{other}`"))),
        }
    }
}

/// Authenticated caller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Principal {
    id: PrincipalId,
    role: Role,
}

impl Principal {
    pub const fn new(id: PrincipalId, role: Role) -> Self {
        Self { id, role }
    }

    pub const fn id(&self) -> PrincipalId {
        self.id
    }

    pub const fn role(&self) -> Role {
        self.role
    }

    pub const fn is_elevated(&self) -> bool {
        self.role.is_elevated()
    }
}

/// Stored grant level. Ordered from weakest to strongest.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AccessLevel {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "readOnly")]
    ReadOnly,
    #[serde(rename = "readAndWrite")]
    ReadAndWrite,
}

impl AccessLevel {
    /// Whether this level satisfies the requested capability.
    pub const fn permits(self, required: Capability) -> bool {
        match required {
            Capability::Read => matches!(self, AccessLevel::ReadOnly | AccessLevel::ReadAndWrite),
            Capability::Write => matches!(self, AccessLevel::ReadAndWrite),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            AccessLevel::None => "none",
            AccessLevel::ReadOnly => "readOnly",
            AccessLevel::ReadAndWrite => "readAndWrite",
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessLevel {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "none" => Ok(AccessLevel::None),
            "readOnly" => Ok(AccessLevel::ReadOnly),
            "readAndWrite" => Ok(AccessLevel::ReadAndWrite),
            other => Err(Error::invalid(
                "permission",
                format!("`{other}` (use 'none', 'readOnly' or 'readAndWrite')"),
            )),
        }
    }
}

/// Capability requested by an operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Read,
    Write,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Capability::Read => "read",
            Capability::Write => "write",
        })
    }
}

/// Protected unit. Resources are nested inside their environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scope {
    Environment {
        environment_id: EnvironmentId,
    },
    Resource {
        environment_id: EnvironmentId,
        resource: String,
    },
}

impl Scope {
    pub const fn environment(environment_id: EnvironmentId) -> Self {
        Scope::Environment { environment_id }
    }

    /// Construct a resource scope, rejecting blank resource names.
    pub fn resource(environment_id: EnvironmentId, resource: impl Into<String>) -> Result<Self> {
        let resource = resource.into();
        if resource.trim().is_empty() {
            return Err(Error::invalid("resource", "must not be empty"));
        }
        Ok(Scope::Resource {
            environment_id,
            resource,
        })
    }

    pub const fn environment_id(&self) -> EnvironmentId {
        match self {
            Scope::Environment { environment_id } | Scope::Resource { environment_id, .. } => {
                *environment_id
            }
        }
    }

    pub fn resource_name(&self) -> Option<&str> {
        match self {
            Scope::Environment { .. } => None,
            Scope::Resource { resource, .. } => Some(resource),
        }
    }

    /// The enclosing environment scope (itself for environments).
    pub const fn parent(&self) -> Scope {
        Scope::environment(self.environment_id())
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Environment { environment_id } => write!(f, "environment {environment_id}"),
            Scope::Resource {
                environment_id,
                resource,
            } => write!(f, "resource `{resource}` in environment {environment_id}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvironmentGrant {
    pub environment_id: EnvironmentId,
    pub level: AccessLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceGrant {
    pub environment_id: EnvironmentId,
    pub resource: String,
    pub level: AccessLevel,
}

/// Every stored grant for one principal.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GrantSet {
    pub environments: Vec<EnvironmentGrant>,
    pub resources: Vec<ResourceGrant>,
}

impl GrantSet {
    pub fn is_empty(&self) -> bool {
        self.environments.is_empty() && self.resources.is_empty()
    }

    pub(crate) fn sort(&mut self) {
        self.environments.sort_by_key(|grant| grant.environment_id);
        self.resources.sort_by(|a, b| {
            (a.environment_id, &a.resource).cmp(&(b.environment_id, &b.resource))
        });
    }
}

/// Authenticated ciphertext as persisted next to an environment.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedSecret(String);

impl EncryptedSecret {
    /// Wrap a blob loaded from storage. No validation happens until decrypt.
    pub fn from_stored(blob: impl Into<String>) -> Self {
        Self(blob.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for EncryptedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptedSecret({} bytes)", self.0.len())
    }
}

/// Decrypted credential. Zeroed on drop and redacted in debug output.
pub struct RevealedSecret(Zeroizing<String>);

impl RevealedSecret {
    pub fn new(value: String) -> Self {
        Self(Zeroizing::new(value))
    }

    pub fn expose(&self) -> &str {
        self.0.as_str()
    }

    /// Lossy display form with all but the first secret character masked.
    pub fn masked(&self) -> String {
        mask(self.expose())
    }
}

impl fmt::Debug for RevealedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RevealedSecret(<redacted>)")
    }
}

/// Environment row as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentRecord {
    pub id: EnvironmentId,
    pub name: String,
    pub secret: EncryptedSecret,
    pub created_by: PrincipalId,
}

/// Caller-facing view of an environment; the connection string is masked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvironmentSummary {
    pub id: EnvironmentId,
    pub name: String,
    pub connection_string: String,
    pub created_by: PrincipalId,
    pub my_permission: AccessLevel,
}

/// Partial update applied by `update_environment`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvironmentUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub connection_string: Option<String>,
}
