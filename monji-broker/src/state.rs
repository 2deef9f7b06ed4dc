use std::sync::Arc;

use monji_core::{CredentialGateway, EnvironmentStore, GrantStore};

use crate::auth::Authenticator;

pub type Gateway = CredentialGateway<Arc<dyn EnvironmentStore>, Arc<dyn GrantStore>>;
pub type SharedGateway = Arc<Gateway>;
pub type SharedAuthenticator = Arc<Authenticator>;

#[derive(Clone)]
pub struct AppState {
    pub gateway: SharedGateway,
    pub authenticator: SharedAuthenticator,
}

impl AppState {
    pub fn new(gateway: SharedGateway, authenticator: SharedAuthenticator) -> Self {
        Self {
            gateway,
            authenticator,
        }
    }
}
