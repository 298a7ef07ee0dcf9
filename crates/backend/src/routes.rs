//! HTTP routes.

use crate::auth::{self, MIN_PASSWORD_LEN};
use crate::error::ApiError;
use crate::SharedState;
use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, get, post},
    Json, Router,
};
use lifequest_core::{validate_player, PlayerInfo};
use persistence::db::{self, Achievement, LeaderboardEntry, StoredSave, UnlockedAchievement};
use persistence::SaveReceipt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

pub const DEFAULT_PAGE: u32 = 10;
pub const MAX_PAGE: u32 = 50;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub email: String,
    pub name: String,
    pub created_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct ProfileUpdate {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct SaveRequest {
    pub snapshot: PlayerInfo,
    #[serde(default)]
    pub version: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ScoreRequest {
    pub score: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockRequest {
    pub achievement_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct Page {
    pub limit: Option<u32>,
}

impl Page {
    /// Requested page size, defaulted and clamped to `1..=MAX_PAGE`.
    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE)
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

// ============================================================================
// Health
// ============================================================================

pub fn health_routes() -> Router<SharedState> {
    Router::new().route("/health", get(health))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

// ============================================================================
// Auth
// ============================================================================

pub fn auth_routes() -> Router<SharedState> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/verify", post(verify))
}

async fn register(
    State(state): State<SharedState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let email = normalize_email(&req.email);
    let name = req.name.trim().to_string();
    validate_player(&PlayerInfo::new(name.clone(), email.clone())).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    let salt = auth::new_salt();
    let hash = auth::hash_password(&req.password, &salt);
    if !db::create_user(&state.pool, &email, &name, &hash, &salt).await? {
        return Err(ApiError::Conflict(format!("{email} is already registered")));
    }
    info!(%email, "account registered");
    Ok((StatusCode::CREATED, Json(json!({ "email": email, "name": name }))))
}

async fn login(State(state): State<SharedState>, Json(req): Json<LoginRequest>) -> Result<Json<Value>, ApiError> {
    let email = normalize_email(&req.email);
    let user = db::find_user(&state.pool, &email).await?;
    let user = match user {
        Some(u) if auth::verify_password(&req.password, &u.salt, &u.password_hash) => u,
        _ => return Err(ApiError::Unauthorized("invalid email or password".into())),
    };
    let token = auth::issue_token(&state, &user.email).await?;
    info!(email = %user.email, "login");
    Ok(Json(json!({ "token": token })))
}

async fn verify(State(state): State<SharedState>, headers: HeaderMap) -> Result<Json<Value>, ApiError> {
    let email = auth::authenticate(&state, &headers).await?;
    Ok(Json(json!({ "valid": true, "email": email })))
}

// ============================================================================
// Player
// ============================================================================

pub fn player_routes() -> Router<SharedState> {
    Router::new()
        .route("/api/player/profile", get(get_profile).put(update_profile))
        .route("/api/player/save", post(save_game))
        .route("/api/player/load", get(load_game))
        .route("/api/player/saves", get(list_saves))
        .route("/api/player", delete(delete_account))
}

async fn get_profile(State(state): State<SharedState>, headers: HeaderMap) -> Result<Json<Profile>, ApiError> {
    let email = auth::authenticate(&state, &headers).await?;
    let user = db::find_user(&state.pool, &email)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("account {email} not found")))?;
    Ok(Json(Profile {
        email: user.email,
        name: user.name,
        created_at: user.created_at,
    }))
}

async fn update_profile(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(req): Json<ProfileUpdate>,
) -> Result<Json<Profile>, ApiError> {
    let email = auth::authenticate(&state, &headers).await?;
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".into()));
    }
    if !db::update_user_name(&state.pool, &email, name).await? {
        return Err(ApiError::NotFound(format!("account {email} not found")));
    }
    get_profile(State(state), headers).await
}

async fn save_game(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(req): Json<SaveRequest>,
) -> Result<Json<SaveReceipt>, ApiError> {
    let email = auth::authenticate(&state, &headers).await?;
    validate_player(&req.snapshot).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    if normalize_email(&req.snapshot.email) != email {
        return Err(ApiError::BadRequest(format!(
            "snapshot belongs to {}, not {email}",
            req.snapshot.email
        )));
    }
    let receipt = db::create_save(&state.pool, &email, &req.snapshot, req.version).await?;
    info!(%email, version = receipt.version, "cloud save stored");
    Ok(Json(receipt))
}

async fn load_game(State(state): State<SharedState>, headers: HeaderMap) -> Result<Json<StoredSave>, ApiError> {
    let email = auth::authenticate(&state, &headers).await?;
    db::latest_save(&state.pool, &email)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("no save found".into()))
}

async fn list_saves(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(page): Query<Page>,
) -> Result<Json<Vec<StoredSave>>, ApiError> {
    let email = auth::authenticate(&state, &headers).await?;
    Ok(Json(db::list_saves(&state.pool, &email, page.limit()).await?))
}

async fn delete_account(State(state): State<SharedState>, headers: HeaderMap) -> Result<StatusCode, ApiError> {
    let email = auth::authenticate(&state, &headers).await?;
    if !db::delete_user(&state.pool, &email).await? {
        return Err(ApiError::NotFound(format!("account {email} not found")));
    }
    info!(%email, "account deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Leaderboard
// ============================================================================

pub fn leaderboard_routes() -> Router<SharedState> {
    Router::new()
        .route("/api/leaderboard", get(top_scores))
        .route("/api/leaderboard/submit", post(submit_score))
}

async fn submit_score(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(req): Json<ScoreRequest>,
) -> Result<StatusCode, ApiError> {
    let email = auth::authenticate(&state, &headers).await?;
    if req.score < 0 {
        return Err(ApiError::BadRequest("score must not be negative".into()));
    }
    db::submit_score(&state.pool, &email, req.score).await?;
    Ok(StatusCode::CREATED)
}

async fn top_scores(
    State(state): State<SharedState>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<LeaderboardEntry>>, ApiError> {
    Ok(Json(db::top_scores(&state.pool, page.limit()).await?))
}

// ============================================================================
// Achievements
// ============================================================================

pub fn achievement_routes() -> Router<SharedState> {
    Router::new()
        .route("/api/achievements", get(list_achievements))
        .route("/api/achievements/unlock", post(unlock_achievement))
        .route("/api/achievements/user", get(user_achievements))
}

async fn list_achievements(State(state): State<SharedState>) -> Result<Json<Vec<Achievement>>, ApiError> {
    Ok(Json(db::list_achievements(&state.pool).await?))
}

async fn unlock_achievement(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(req): Json<UnlockRequest>,
) -> Result<Json<Value>, ApiError> {
    let email = auth::authenticate(&state, &headers).await?;
    let newly = db::unlock_achievement(&state.pool, &email, &req.achievement_id).await?;
    Ok(Json(json!({ "achievementId": req.achievement_id, "unlocked": newly })))
}

async fn user_achievements(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<Vec<UnlockedAchievement>>, ApiError> {
    let email = auth::authenticate(&state, &headers).await?;
    Ok(Json(db::user_achievements(&state.pool, &email).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_limits_are_clamped() {
        assert_eq!(Page::default().limit(), DEFAULT_PAGE);
        assert_eq!(Page { limit: Some(0) }.limit(), 1);
        assert_eq!(Page { limit: Some(500) }.limit(), MAX_PAGE);
        assert_eq!(Page { limit: Some(7) }.limit(), 7);
    }
}
