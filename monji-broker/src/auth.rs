use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, header::AUTHORIZATION};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use monji_core::{IdentityContext, Principal, PrincipalId, UserDirectory};
use serde::Deserialize;
use tracing::{debug, error, warn};

use crate::error::{AppError, AppErrorKind};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[allow(dead_code)]
    exp: i64,
}

/// Verifies HS256 bearer tokens and resolves the caller's role from the
/// user directory. Roles carried inside a token are ignored.
pub struct Authenticator {
    key: DecodingKey,
    validation: Validation,
    users: Arc<dyn UserDirectory>,
}

impl Authenticator {
    pub fn new(secret: &[u8], users: Arc<dyn UserDirectory>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            key: DecodingKey::from_secret(secret),
            validation,
            users,
        }
    }

    pub async fn authenticate(&self, token: &str) -> Result<Principal, AppError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AppError::unauthorized("missing authorization token"));
        }

        let claims = decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|err| {
                debug!(error = %err, "token rejected");
                AppError::unauthorized("invalid or expired token")
            })?
            .claims;
        let id: PrincipalId = claims
            .sub
            .parse()
            .map_err(|_| AppError::unauthorized("token subject is not a user id"))?;

        match self.users.find_principal(id).await {
            Ok(Some(principal)) => Ok(principal),
            Ok(None) => {
                warn!(principal = id, "token for unknown user");
                Err(AppError::unauthorized("unknown user"))
            }
            Err(err) => {
                error!(error = %err, "user lookup failed");
                Err(AppError::new(AppErrorKind::Internal))
            }
        }
    }
}

pub fn extract_bearer_token(value: &str) -> Option<&str> {
    let value = value.trim();
    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
}

/// Establish the request's [`IdentityContext`] or answer 401.
pub async fn http_layer(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(extract_bearer_token)
        .map(str::to_owned);

    let Some(token) = token else {
        return AppError::unauthorized("missing authorization header").into_response();
    };

    match state.authenticator.authenticate(&token).await {
        Ok(principal) => {
            req.extensions_mut()
                .insert(IdentityContext::authenticated(principal));
            next.run(req).await
        }
        Err(err) => err.into_response(),
    }
}
