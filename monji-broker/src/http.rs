use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use monji_core::{EnvironmentId, EnvironmentUpdate, IdentityContext, PrincipalId, Scope};
use tracing::Instrument;

use crate::auth;
use crate::error::{AppError, attach_correlation};
use crate::models::{
    AccessCheckRequest, AccessCheckResponse, DeleteResponse, GrantResponse, PermissionsResponse,
    RegisterEnvironmentRequest, SetPermissionRequest, WhoAmIResponse,
};
use crate::state::AppState;
use crate::telemetry::{CorrelationId, correlation_layer, request_span};

pub fn router(state: AppState) -> Router {
    let api = api_routes().layer(middleware::from_fn_with_state(
        state.clone(),
        auth::http_layer,
    ));

    Router::new()
        .route("/healthz", get(health_check))
        .merge(api)
        .layer(middleware::from_fn(correlation_layer))
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/whoami", get(whoami))
        .route(
            "/v1/environments",
            get(list_environments).post(register_environment),
        )
        .route(
            "/v1/environments/{env_id}",
            get(describe_environment)
                .put(update_environment)
                .delete(delete_environment),
        )
        .route("/v1/access/check", post(check_access))
        .route("/v1/users/{user_id}/permissions", get(list_permissions))
        .route(
            "/v1/users/{user_id}/environments/{env_id}/permissions",
            put(set_environment_permission),
        )
        .route(
            "/v1/users/{user_id}/environments/{env_id}/resources/{resource}/permissions",
            put(set_resource_permission),
        )
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn whoami(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Extension(identity): Extension<IdentityContext>,
) -> Result<impl IntoResponse, AppError> {
    let span = request_span("http.whoami", &correlation.0);
    async move {
        let principal = identity.principal()?;
        let grants = state
            .gateway
            .list_grants_for_principal(principal, principal.id())
            .await?;
        Ok(Json(WhoAmIResponse::new(principal, grants)))
    }
    .instrument(span)
    .await
    .map_err(|err: AppError| attach_correlation(err, &correlation))
}

async fn list_environments(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Extension(identity): Extension<IdentityContext>,
) -> Result<impl IntoResponse, AppError> {
    let span = request_span("http.environments.list", &correlation.0);
    async move {
        let principal = identity.principal()?;
        let environments = state.gateway.list_environments(principal).await?;
        Ok(Json(environments))
    }
    .instrument(span)
    .await
    .map_err(|err: AppError| attach_correlation(err, &correlation))
}

async fn register_environment(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Extension(identity): Extension<IdentityContext>,
    Json(request): Json<RegisterEnvironmentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let span = request_span("http.environments.register", &correlation.0);
    async move {
        let principal = identity.principal()?;
        let summary = state
            .gateway
            .register(principal, &request.name, &request.connection_string)
            .await?;
        Ok((StatusCode::CREATED, Json(summary)))
    }
    .instrument(span)
    .await
    .map_err(|err: AppError| attach_correlation(err, &correlation))
}

async fn describe_environment(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Extension(identity): Extension<IdentityContext>,
    Path(env_id): Path<EnvironmentId>,
) -> Result<impl IntoResponse, AppError> {
    let span = request_span("http.environments.describe", &correlation.0);
    async move {
        let principal = identity.principal()?;
        let summary = state.gateway.describe_environment(principal, env_id).await?;
        Ok(Json(summary))
    }
    .instrument(span)
    .await
    .map_err(|err: AppError| attach_correlation(err, &correlation))
}

async fn update_environment(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Extension(identity): Extension<IdentityContext>,
    Path(env_id): Path<EnvironmentId>,
    Json(update): Json<EnvironmentUpdate>,
) -> Result<impl IntoResponse, AppError> {
    let span = request_span("http.environments.update", &correlation.0);
    async move {
        let principal = identity.principal()?;
        let summary = state
            .gateway
            .update_environment(principal, env_id, &update)
            .await?;
        Ok(Json(summary))
    }
    .instrument(span)
    .await
    .map_err(|err: AppError| attach_correlation(err, &correlation))
}

async fn delete_environment(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Extension(identity): Extension<IdentityContext>,
    Path(env_id): Path<EnvironmentId>,
) -> Result<impl IntoResponse, AppError> {
    let span = request_span("http.environments.delete", &correlation.0);
    async move {
        let principal = identity.principal()?;
        state.gateway.delete_environment(principal, env_id).await?;
        Ok(Json(DeleteResponse {
            id: env_id,
            deleted: true,
        }))
    }
    .instrument(span)
    .await
    .map_err(|err: AppError| attach_correlation(err, &correlation))
}

async fn check_access(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Extension(identity): Extension<IdentityContext>,
    Json(request): Json<AccessCheckRequest>,
) -> Result<impl IntoResponse, AppError> {
    let span = request_span("http.access.check", &correlation.0);
    async move {
        let principal = identity.principal()?;
        let scope = request.scope()?;
        let evaluator = state.gateway.evaluator();
        let allowed = match evaluator
            .can_access(principal, &scope, request.capability)
            .await
        {
            Ok(allowed) => allowed,
            Err(cause) => {
                return Err(AppError::from(monji_core::Error::PermissionDenied {
                    target: scope.to_string(),
                    capability: request.capability,
                    cause: Some(cause),
                }));
            }
        };
        let permission = evaluator.effective_level(principal, &scope).await?;
        Ok(Json(AccessCheckResponse {
            scope,
            capability: request.capability,
            allowed,
            permission,
        }))
    }
    .instrument(span)
    .await
    .map_err(|err: AppError| attach_correlation(err, &correlation))
}

async fn list_permissions(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Extension(identity): Extension<IdentityContext>,
    Path(user_id): Path<PrincipalId>,
) -> Result<impl IntoResponse, AppError> {
    let span = request_span("http.permissions.list", &correlation.0);
    async move {
        let principal = identity.principal()?;
        let grants = state
            .gateway
            .list_grants_for_principal(principal, user_id)
            .await?;
        Ok(Json(PermissionsResponse { user_id, grants }))
    }
    .instrument(span)
    .await
    .map_err(|err: AppError| attach_correlation(err, &correlation))
}

async fn set_environment_permission(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Extension(identity): Extension<IdentityContext>,
    Path((user_id, env_id)): Path<(PrincipalId, EnvironmentId)>,
    Json(request): Json<SetPermissionRequest>,
) -> Result<impl IntoResponse, AppError> {
    set_permission(
        state,
        correlation,
        identity,
        user_id,
        Scope::environment(env_id),
        request,
    )
    .await
}

async fn set_resource_permission(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationId>,
    Extension(identity): Extension<IdentityContext>,
    Path((user_id, env_id, resource)): Path<(PrincipalId, EnvironmentId, String)>,
    Json(request): Json<SetPermissionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let scope = Scope::resource(env_id, resource)
        .map_err(|err| attach_correlation(AppError::from(err), &correlation))?;
    set_permission(state, correlation, identity, user_id, scope, request).await
}

async fn set_permission(
    state: AppState,
    correlation: CorrelationId,
    identity: IdentityContext,
    user_id: PrincipalId,
    scope: Scope,
    request: SetPermissionRequest,
) -> Result<impl IntoResponse, AppError> {
    let span = request_span("http.permissions.set", &correlation.0);
    async move {
        let principal = identity.principal()?;
        state
            .gateway
            .set_grant(principal, user_id, &scope, request.permission)
            .await?;
        Ok(Json(GrantResponse {
            user_id,
            scope,
            permission: request.permission,
        }))
    }
    .instrument(span)
    .await
    .map_err(|err: AppError| attach_correlation(err, &correlation))
}
