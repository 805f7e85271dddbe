use std::sync::LazyLock;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    Json, Router,
    extract::{FromRequestParts, State},
    http::request::Parts,
    response::IntoResponse,
    routing::post,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

use hikebot_common::AuthUser;

use crate::errors::HikeError;

use super::api::{ApiError, SharedState};

static USER_CODE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]{4,16}$").unwrap());

const INVALID_LOGIN: &str = "Invalid username or password";

pub const USERNAME_HEADER: &str = "x-username";
pub const USER_CODE_HEADER: &str = "x-user-code";

#[derive(Deserialize)]
pub struct SignupRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub user_code: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: AuthUser,
    pub message: String,
}

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
}

// ── Password hashing ──────────────────────────────────────────────────

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

// ── Account operations ────────────────────────────────────────────────

/// Validate and store a new account. Shared by the JSON API and the
/// dashboard signup form.
pub async fn register(
    state: &SharedState,
    username: &str,
    password: &str,
    user_code: &str,
) -> Result<AuthUser, ApiError> {
    let username = username.trim().to_string();
    let user_code = user_code.trim().to_string();
    if username.is_empty() || password.is_empty() || user_code.is_empty() {
        return Err(HikeError::Validation(
            "username, password and user_code are required".into(),
        )
        .into());
    }
    if !USER_CODE_REGEX.is_match(&user_code) {
        return Err(HikeError::Validation("user_code must be 4-16 letters or digits".into()).into());
    }

    let password = password.to_string();
    let hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| anyhow::anyhow!("Hashing task failed: {}", e))??;

    let user = state
        .db
        .call(move |db| db.create_user(&username, &user_code, &hash))
        .await?;
    info!(user_id = user.id, username = %user.username, "User signed up");
    Ok(user)
}

/// Check a username/password pair. Every mismatch reports the same error.
pub async fn authenticate(state: &SharedState, username: &str, password: &str) -> Result<AuthUser, ApiError> {
    let username = username.trim().to_string();
    if username.is_empty() || password.is_empty() {
        return Err(ApiError::BadRequest(INVALID_LOGIN.into()));
    }

    let Some((user, stored)) = state.db.call(move |db| db.get_credentials(&username)).await? else {
        return Err(ApiError::BadRequest(INVALID_LOGIN.into()));
    };

    let password = password.to_string();
    let valid = tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .map_err(|e| anyhow::anyhow!("Verification task failed: {}", e))?;
    if !valid {
        return Err(ApiError::BadRequest(INVALID_LOGIN.into()));
    }
    Ok(user)
}

/// Resolve a username/user code pair to a stored user.
pub async fn resolve_identity(
    state: &SharedState,
    username: &str,
    user_code: &str,
) -> Result<Option<AuthUser>, ApiError> {
    let username = username.trim().to_string();
    let user_code = user_code.trim().to_string();
    if username.is_empty() || user_code.is_empty() {
        return Ok(None);
    }
    Ok(state
        .db
        .call(move |db| db.find_user_by_identity(&username, &user_code))
        .await?)
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn signup(
    State(state): State<SharedState>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = register(&state, &req.username, &req.password, &req.user_code).await?;
    Ok(Json(AuthResponse {
        user,
        message: "Signup successful".into(),
    }))
}

async fn login(
    State(state): State<SharedState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = authenticate(&state, &req.username, &req.password).await?;
    info!(user_id = user.id, "User logged in");
    Ok(Json(AuthResponse {
        user,
        message: "Login successful".into(),
    }))
}

// ── Extractor ─────────────────────────────────────────────────────────

fn header_value(parts: &Parts, name: &str) -> String {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// The caller, identified by the `X-Username` and `X-User-Code` headers.
pub struct CurrentUser(pub AuthUser);

impl FromRequestParts<SharedState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &SharedState) -> Result<Self, Self::Rejection> {
        let username = header_value(parts, USERNAME_HEADER);
        let user_code = header_value(parts, USER_CODE_HEADER);

        match resolve_identity(state, &username, &user_code).await? {
            Some(user) => Ok(CurrentUser(user)),
            None => Err(HikeError::Unauthorized.into()),
        }
    }
}
