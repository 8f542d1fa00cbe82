//! HTTP surface for the record store.
//!
//! Handlers are deliberately thin: decode, authorize, call the store with
//! the retry engine wrapped around it, translate the result. All the
//! interesting behavior lives in the store and provisioner.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use rand::Rng;
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use folio_core::error::ApiError;
use folio_core::records::{AdminEntry, BanEntry};
use folio_core::retry::retry_github_api;

use crate::store::verification::{hash_key, seal_code};
use crate::store::StoreError;
use crate::SharedState;

pub fn api_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/verification/request", post(request_verification))
        .route("/api/verification/verify", post(verify_submission))
        .route("/api/admins", get(list_admins).put(update_admins))
        .route("/api/bans", get(list_bans).put(update_bans))
        .route("/api/achievements", post(record_achievement))
        .route("/api/achievements/{username}", get(get_achievements))
        .route("/api/permissions/{username}", get(check_permissions))
        .with_state(state)
}

struct ErrorResponse(StoreError);

impl From<StoreError> for ErrorResponse {
    fn from(error: StoreError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            StoreError::Forbidden(m) => (StatusCode::FORBIDDEN, m.clone()),
            StoreError::Api(ApiError::Status { status, .. }) => (
                StatusCode::BAD_GATEWAY,
                format!("GitHub API request failed with status {}", status),
            ),
            StoreError::Api(ApiError::Network { .. }) => (
                StatusCode::BAD_GATEWAY,
                "GitHub API request failed".to_string(),
            ),
            StoreError::Serialize(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to serialize record".to_string(),
            ),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Constant-shape bearer check. `expected == None` means the endpoint is
/// disabled, not open.
fn is_authorized(expected: Option<&str>, authorization: Option<&str>) -> bool {
    let Some(expected) = expected else {
        return false;
    };
    matches!(
        authorization.and_then(|value| value.strip_prefix("Bearer ")),
        Some(token) if token == expected
    )
}

fn authorize_admin(state: &SharedState, headers: &HeaderMap) -> Result<(), ErrorResponse> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    if is_authorized(state.admin_auth_token.as_deref(), authorization) {
        Ok(())
    } else {
        Err(ErrorResponse(StoreError::Forbidden(
            "missing or invalid bearer token".to_string(),
        )))
    }
}

fn generate_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "folio",
        "version": crate::service_version(),
    }))
}

#[derive(Debug, Deserialize)]
struct VerificationRequest {
    email: String,
}

async fn request_verification(
    State(state): State<SharedState>,
    Json(request): Json<VerificationRequest>,
) -> Result<Json<serde_json::Value>, ErrorResponse> {
    let request_id = Uuid::new_v4();
    let code = generate_code();
    let key_hash = hash_key(&request.email);
    let sealed = seal_code(&state.verification_secret, &key_hash, &code);

    let events = Some(state.retry_events.clone());
    let ttl = state.verification_ttl;
    let store_state = state.clone();
    let expires_at = retry_github_api(
        move || {
            let state = store_state.clone();
            let key_hash = key_hash.clone();
            let sealed = sealed.clone();
            async move {
                state
                    .store
                    .store_verification_code(&key_hash, &sealed, Utc::now(), ttl)
                    .await
            }
        },
        events,
    )
    .await
    .map_err(ErrorResponse)?;

    // Code delivery (email) happens out of band; this service only stores
    // the sealed entry.
    info!("Stored verification code (request {})", request_id);
    Ok(Json(json!({ "expiresAt": expires_at })))
}

#[derive(Debug, Deserialize)]
struct VerifySubmission {
    email: String,
    code: String,
}

async fn verify_submission(
    State(state): State<SharedState>,
    Json(submission): Json<VerifySubmission>,
) -> Result<Json<serde_json::Value>, ErrorResponse> {
    let key_hash = hash_key(&submission.email);
    let sealed = seal_code(&state.verification_secret, &key_hash, &submission.code);

    let events = Some(state.retry_events.clone());
    let store_state = state.clone();
    let verified = retry_github_api(
        move || {
            let state = store_state.clone();
            let key_hash = key_hash.clone();
            let sealed = sealed.clone();
            async move { state.store.verify_code(&key_hash, &sealed, Utc::now()).await }
        },
        events,
    )
    .await
    .map_err(ErrorResponse)?;

    Ok(Json(json!({ "verified": verified })))
}

async fn list_admins(
    State(state): State<SharedState>,
) -> Result<Json<serde_json::Value>, ErrorResponse> {
    let events = Some(state.retry_events.clone());
    let store_state = state.clone();
    let admins = retry_github_api(
        move || {
            let state = store_state.clone();
            async move { state.store.admin_list().await }
        },
        events,
    )
    .await
    .map_err(ErrorResponse)?;
    Ok(Json(json!({ "admins": admins })))
}

#[derive(Debug, Deserialize)]
struct AdminListUpdate {
    admins: Vec<AdminEntry>,
}

async fn update_admins(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(update): Json<AdminListUpdate>,
) -> Result<Json<serde_json::Value>, ErrorResponse> {
    authorize_admin(&state, &headers)?;

    let events = Some(state.retry_events.clone());
    let store_state = state.clone();
    retry_github_api(
        move || {
            let state = store_state.clone();
            let admins = update.admins.clone();
            async move { state.store.update_admin_list(admins).await }
        },
        events,
    )
    .await
    .map_err(ErrorResponse)?;
    Ok(Json(json!({ "updated": true })))
}

async fn list_bans(
    State(state): State<SharedState>,
) -> Result<Json<serde_json::Value>, ErrorResponse> {
    let events = Some(state.retry_events.clone());
    let store_state = state.clone();
    let banned = retry_github_api(
        move || {
            let state = store_state.clone();
            async move { state.store.ban_list().await }
        },
        events,
    )
    .await
    .map_err(ErrorResponse)?;
    Ok(Json(json!({ "banned": banned })))
}

#[derive(Debug, Deserialize)]
struct BanListUpdate {
    banned: Vec<BanEntry>,
}

async fn update_bans(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(update): Json<BanListUpdate>,
) -> Result<Json<serde_json::Value>, ErrorResponse> {
    authorize_admin(&state, &headers)?;

    let events = Some(state.retry_events.clone());
    let store_state = state.clone();
    retry_github_api(
        move || {
            let state = store_state.clone();
            let banned = update.banned.clone();
            async move { state.store.update_ban_list(banned).await }
        },
        events,
    )
    .await
    .map_err(ErrorResponse)?;
    Ok(Json(json!({ "updated": true })))
}

#[derive(Debug, Deserialize)]
struct AchievementSubmission {
    username: String,
    achievement: String,
}

async fn record_achievement(
    State(state): State<SharedState>,
    Json(submission): Json<AchievementSubmission>,
) -> Result<Json<serde_json::Value>, ErrorResponse> {
    let events = Some(state.retry_events.clone());
    let store_state = state.clone();
    let username = submission.username.clone();
    let achievement = submission.achievement.clone();
    let count = retry_github_api(
        move || {
            let state = store_state.clone();
            let username = submission.username.clone();
            let achievement = submission.achievement.clone();
            async move {
                state
                    .store
                    .record_achievement(&username, &achievement, Utc::now())
                    .await
            }
        },
        events,
    )
    .await
    .map_err(ErrorResponse)?;

    Ok(Json(json!({
        "username": username,
        "achievement": achievement,
        "count": count,
    })))
}

async fn get_achievements(
    State(state): State<SharedState>,
    Path(username): Path<String>,
) -> Result<Json<serde_json::Value>, ErrorResponse> {
    let events = Some(state.retry_events.clone());
    let store_state = state.clone();
    let lookup = username.clone();
    let achievements = retry_github_api(
        move || {
            let state = store_state.clone();
            let username = lookup.clone();
            async move { state.store.user_achievements(&username).await }
        },
        events,
    )
    .await
    .map_err(ErrorResponse)?;

    Ok(Json(json!({
        "username": username,
        "achievements": achievements,
    })))
}

#[derive(Debug, Deserialize)]
struct PermissionsQuery {
    #[serde(rename = "userId")]
    user_id: Option<u64>,
}

async fn check_permissions(
    State(state): State<SharedState>,
    Path(username): Path<String>,
    Query(query): Query<PermissionsQuery>,
) -> Result<Json<serde_json::Value>, ErrorResponse> {
    let events = Some(state.retry_events.clone());
    let store_state = state.clone();
    let lookup = username.clone();
    retry_github_api(
        move || {
            let state = store_state.clone();
            let username = lookup.clone();
            async move { state.store.require_admin(&username, query.user_id).await }
        },
        events,
    )
    .await
    .map_err(ErrorResponse)?;

    Ok(Json(json!({ "username": username, "allowed": true })))
}
