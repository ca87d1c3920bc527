//! REST API routes and handlers
//!
//! Defines the control-plane endpoints for fingerprints and account contexts.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::api::server::AppState;
use crate::api::websocket::ws_handler;
use crate::config::AccountConfig;
use crate::context::{ContextInfo, ContextState, LifecycleError};
use crate::fingerprint::{user_agent_for, FingerprintProfile, QualityReport};

// ============================================================================
// Request/Response Structs
// ============================================================================

/// Standard API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ApiResponse::<()>::error(message))).into_response()
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub api_enabled: bool,
    pub running_contexts: usize,
}

/// Generate request; without a seed the profile is random
#[derive(Debug, Default, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub seed: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub profile: FingerprintProfile,
    pub quality: QualityReport,
    pub user_agent: String,
}

/// Account status, including accounts without a live context
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountStatus {
    pub account_id: String,
    pub state: ContextState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityReport>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptResponse {
    pub account_id: String,
    pub script: String,
}

/// API toggle request
#[derive(Debug, Deserialize)]
pub struct ApiToggleRequest {
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct ApiStatusResponse {
    pub enabled: bool,
    pub connected_clients: usize,
}

/// Parse a profile body and check its shape; serde rejections become 400s.
fn parse_profile(body: serde_json::Value) -> Result<FingerprintProfile, Response> {
    let profile: FingerprintProfile = serde_json::from_value(body)
        .map_err(|e| failure(StatusCode::BAD_REQUEST, format!("Malformed profile: {}", e)))?;
    profile
        .check_shape()
        .map_err(|e| failure(StatusCode::BAD_REQUEST, e.to_string()))?;
    Ok(profile)
}

fn lifecycle_failure(err: LifecycleError) -> Response {
    let status = match &err {
        LifecycleError::InvalidProfile(_) | LifecycleError::InvalidConfig(_) => {
            StatusCode::BAD_REQUEST
        }
        LifecycleError::Cancelled { .. } => StatusCode::CONFLICT,
        LifecycleError::LoadFailed { .. } => StatusCode::BAD_GATEWAY,
        LifecycleError::ContextCreationFailure { .. } | LifecycleError::CloseFailed { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    if status.is_server_error() {
        error!("{}", err);
    }
    failure(status, err.to_string())
}

async fn ensure_enabled(state: &AppState) -> Result<(), Response> {
    if state.is_enabled().await {
        Ok(())
    } else {
        Err(failure(StatusCode::SERVICE_UNAVAILABLE, "API is disabled"))
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        api_enabled: state.is_enabled().await,
        running_contexts: state.manager.contexts().len(),
    }))
}

/// POST /fingerprints/generate - Generate a profile and score it
pub async fn generate_fingerprint(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Response {
    if let Err(rejection) = ensure_enabled(&state).await {
        return rejection;
    }

    let profile = state.generator.generate(request.seed.as_deref());
    let quality = state.validator.validate(&profile);
    let user_agent = user_agent_for(
        &profile.navigator.platform,
        &state.manager.settings().chrome_version,
    );

    Json(ApiResponse::success(GenerateResponse {
        profile,
        quality,
        user_agent,
    }))
    .into_response()
}

/// POST /fingerprints/validate - Score a supplied profile
pub async fn validate_fingerprint(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    if let Err(rejection) = ensure_enabled(&state).await {
        return rejection;
    }

    match parse_profile(body) {
        Ok(profile) => Json(ApiResponse::success(state.validator.validate(&profile))).into_response(),
        Err(rejection) => rejection,
    }
}

/// GET /accounts - List live contexts
pub async fn list_accounts(State(state): State<AppState>) -> Response {
    if let Err(rejection) = ensure_enabled(&state).await {
        return rejection;
    }
    Json(ApiResponse::success(state.manager.contexts())).into_response()
}

/// GET /accounts/:id - State of one account
pub async fn get_account(State(state): State<AppState>, Path(account_id): Path<String>) -> Response {
    if let Err(rejection) = ensure_enabled(&state).await {
        return rejection;
    }

    Json(ApiResponse::success(AccountStatus {
        state: state.manager.state(&account_id),
        context: state.manager.context(&account_id),
        quality: state.manager.quality(&account_id),
        account_id,
    }))
    .into_response()
}

/// POST /accounts/:id/start - Start or reuse the account's context
pub async fn start_account(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    Json(config): Json<AccountConfig>,
) -> Response {
    if let Err(rejection) = ensure_enabled(&state).await {
        return rejection;
    }

    match state.manager.start(&account_id, config).await {
        Ok(handle) => {
            info!(account = %account_id, context = %handle, "Account started via API");
            match state.manager.context(&account_id) {
                Some(info) => Json(ApiResponse::success(info)).into_response(),
                None => failure(
                    StatusCode::CONFLICT,
                    format!("Context of account {} closed before it could be reported", account_id),
                ),
            }
        }
        Err(e) => lifecycle_failure(e),
    }
}

/// POST /accounts/:id/stop - Close the account's context
pub async fn stop_account(State(state): State<AppState>, Path(account_id): Path<String>) -> Response {
    if let Err(rejection) = ensure_enabled(&state).await {
        return rejection;
    }

    match state.manager.stop(&account_id).await {
        Ok(()) => Json(ApiResponse::success(state.manager.state(&account_id))).into_response(),
        Err(e) => lifecycle_failure(e),
    }
}

/// GET /accounts/:id/fingerprint - Cached profile of an account
pub async fn get_fingerprint(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Response {
    if let Err(rejection) = ensure_enabled(&state).await {
        return rejection;
    }

    match state.manager.profile(&account_id) {
        Some(profile) => Json(ApiResponse::success(profile)).into_response(),
        None => failure(
            StatusCode::NOT_FOUND,
            format!("No profile for account {}", account_id),
        ),
    }
}

/// PUT /accounts/:id/fingerprint - Replace an account's profile
pub async fn put_fingerprint(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    if let Err(rejection) = ensure_enabled(&state).await {
        return rejection;
    }

    let profile = match parse_profile(body) {
        Ok(profile) => profile,
        Err(rejection) => return rejection,
    };
    let quality = state.validator.validate(&profile);

    match state.manager.update_profile(&account_id, profile).await {
        Ok(()) => Json(ApiResponse::success(quality)).into_response(),
        Err(e) => lifecycle_failure(e),
    }
}

/// DELETE /accounts/:id/fingerprint - Forget a cached profile
pub async fn delete_fingerprint(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Response {
    if let Err(rejection) = ensure_enabled(&state).await {
        return rejection;
    }

    match state.manager.forget_profile(&account_id) {
        Some(_) => Json(ApiResponse::success(())).into_response(),
        None => failure(
            StatusCode::NOT_FOUND,
            format!("No profile for account {}", account_id),
        ),
    }
}

/// GET /accounts/:id/script - Bootstrap script for the account's profile
pub async fn get_script(State(state): State<AppState>, Path(account_id): Path<String>) -> Response {
    if let Err(rejection) = ensure_enabled(&state).await {
        return rejection;
    }

    match state.manager.bootstrap_script(&account_id) {
        Some(script) => Json(ApiResponse::success(ScriptResponse { account_id, script })).into_response(),
        None => failure(
            StatusCode::NOT_FOUND,
            format!("No profile for account {}", account_id),
        ),
    }
}

/// POST /api/toggle - Toggle API enabled state
pub async fn toggle_api(
    State(state): State<AppState>,
    Json(request): Json<ApiToggleRequest>,
) -> impl IntoResponse {
    state.set_enabled(request.enabled).await;

    info!("API {} by request", if request.enabled { "enabled" } else { "disabled" });

    Json(ApiResponse::success(ApiStatusResponse {
        enabled: request.enabled,
        connected_clients: state.ws_handler.client_count().await,
    }))
}

/// GET /api/status - Get API status
pub async fn api_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(ApiStatusResponse {
        enabled: state.is_enabled().await,
        connected_clients: state.ws_handler.client_count().await,
    }))
}

// ============================================================================
// Router Configuration
// ============================================================================

/// Create the API router with all routes configured
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))

        // Fingerprints
        .route("/fingerprints/generate", post(generate_fingerprint))
        .route("/fingerprints/validate", post(validate_fingerprint))

        // Accounts
        .route("/accounts", get(list_accounts))
        .route("/accounts/:id", get(get_account))
        .route("/accounts/:id/start", post(start_account))
        .route("/accounts/:id/stop", post(stop_account))
        .route(
            "/accounts/:id/fingerprint",
            get(get_fingerprint).put(put_fingerprint).delete(delete_fingerprint),
        )
        .route("/accounts/:id/script", get(get_script))

        // Lifecycle event stream
        .route("/events", get(ws_handler))

        // API management
        .route("/api/toggle", post(toggle_api))
        .route("/api/status", get(api_status))

        .with_state(state)
}
