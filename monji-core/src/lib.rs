//! Grant-based access control and encrypted connection strings for shared
//! database environments.

pub mod crypto;
pub mod errors;
pub mod gateway;
pub mod identity;
pub mod policy;
pub mod resource;
pub mod store;
pub mod types;

pub use crypto::{CipherKey, SecretCipher, mask};
pub use errors::{CipherError, Error, EvaluationUnavailable, Result, StoreError};
pub use gateway::{CredentialGateway, DEFAULT_RESOURCE_TIMEOUT};
pub use identity::IdentityContext;
pub use policy::AccessEvaluator;
pub use resource::{ResourceAccess, ResourceError};
pub use store::{EnvironmentStore, GrantStore, MemoryStore, UserDirectory};
#[cfg(feature = "sqlite")]
pub use store::SqliteStore;
pub use types::{
    AccessLevel, Capability, EncryptedSecret, EnvironmentGrant, EnvironmentId, EnvironmentRecord,
    EnvironmentSummary, EnvironmentUpdate, GrantSet, Principal, PrincipalId, ResourceGrant,
    RevealedSecret, Role, Scope,
};
