use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::Json,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::auth::{
    errors::ErrorKind,
    models::{
        ChangePasswordRequest, HealthResponse, LoginRequest, LoginResponse, LogoutRequest,
        ProfileResponse, RefreshRequest, RefreshResponse, RegisterRequest, RegisterResponse,
        StatusResponse, TokenRequest, ValidateResponse,
    },
    AuthEngine,
};
use crate::middleware::request_logging;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AuthEngine>,
}

/// Create the API router
pub fn create_router(engine: Arc<AuthEngine>) -> Router {
    let state = AppState { engine };

    Router::new()
        .route("/health", get(health_check))
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/validate", post(validate))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/change-password", post(change_password))
        .route("/api/auth/profile", post(profile))
        .layer(middleware::from_fn(request_logging))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// HTTP status for a result's error kind. The body is always the result.
pub fn status_for(error: Option<ErrorKind>) -> StatusCode {
    match error {
        None => StatusCode::OK,
        Some(ErrorKind::ValidationError) | Some(ErrorKind::InvalidClient) => {
            StatusCode::BAD_REQUEST
        }
        Some(ErrorKind::AlreadyExists) => StatusCode::CONFLICT,
        Some(ErrorKind::InvalidCredentials)
        | Some(ErrorKind::InvalidToken)
        | Some(ErrorKind::Invalid) => StatusCode::UNAUTHORIZED,
        Some(ErrorKind::NotFound) => StatusCode::NOT_FOUND,
        Some(ErrorKind::Internal) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ===== Route Handlers =====

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(state.engine.health())
}

/// POST /api/auth/register
async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> (StatusCode, Json<RegisterResponse>) {
    let resp = state.engine.register(&payload).await;
    let status = match resp.error {
        None => StatusCode::CREATED,
        kind => status_for(kind),
    };
    (status, Json(resp))
}

/// POST /api/auth/login
async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> (StatusCode, Json<LoginResponse>) {
    let resp = state.engine.login(&payload).await;
    (status_for(resp.error), Json(resp))
}

/// POST /api/auth/validate
async fn validate(
    State(state): State<AppState>,
    Json(payload): Json<TokenRequest>,
) -> (StatusCode, Json<ValidateResponse>) {
    let resp = state.engine.validate(&payload).await;
    (status_for(resp.error), Json(resp))
}

/// POST /api/auth/refresh
async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> (StatusCode, Json<RefreshResponse>) {
    let resp = state.engine.refresh(&payload).await;
    (status_for(resp.error), Json(resp))
}

/// POST /api/auth/logout
async fn logout(
    State(state): State<AppState>,
    Json(payload): Json<LogoutRequest>,
) -> (StatusCode, Json<StatusResponse>) {
    let resp = state.engine.logout(&payload).await;
    (status_for(resp.error), Json(resp))
}

/// POST /api/auth/change-password
async fn change_password(
    State(state): State<AppState>,
    Json(payload): Json<ChangePasswordRequest>,
) -> (StatusCode, Json<StatusResponse>) {
    let resp = state.engine.change_password(&payload).await;
    (status_for(resp.error), Json(resp))
}

/// POST /api/auth/profile
async fn profile(
    State(state): State<AppState>,
    Json(payload): Json<TokenRequest>,
) -> (StatusCode, Json<ProfileResponse>) {
    let resp = state.engine.user_profile(&payload).await;
    (status_for(resp.error), Json(resp))
}
