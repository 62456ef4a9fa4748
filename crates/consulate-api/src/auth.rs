use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, Json, extract::State, response::IntoResponse};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::{info, warn};

use consulate_db::{Database, is_unique_violation};
use consulate_types::api::{AuthResponse, Claims, LoginRequest, SignupRequest};
use consulate_types::models::User;

use crate::error::{ApiError, ApiJson, blocking};
use crate::middleware::TOKEN_COOKIE;
use crate::state::AppState;
use crate::validation;

const MAX_FULL_NAME_LEN: usize = 120;

pub async fn signup(
    State(state): State<AppState>,
    jar: CookieJar,
    ApiJson(req): ApiJson<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = validation::email("Username", &req.username)?;
    validation::password(&req.password)?;
    let full_name = validation::optional_text("Full name", Some(&req.full_name), MAX_FULL_NAME_LEN)?
        .unwrap_or_default();
    let is_admin = state.auth.is_admin_email(&username);

    let password = req.password;
    let password_hash = blocking(move || hash_password(&password)).await?;

    let name = username.clone();
    let created = state
        .with_db(move |db| {
            let id = db.create_user(&name, &password_hash, &full_name, is_admin)?;
            db.get_user_by_id(id)
        })
        .await;

    let user = match created {
        Ok(Some(row)) => row.into_user(),
        Ok(None) => {
            return Err(ApiError::Internal(anyhow::anyhow!(
                "user {username} vanished after insert"
            )));
        }
        Err(ApiError::Internal(e)) if is_unique_violation(&e) => {
            return Err(ApiError::Conflict("Username is already registered".into()));
        }
        Err(e) => return Err(e),
    };

    info!(user_id = user.id, is_admin = user.is_admin, "User signed up");
    respond_with_token(&state, jar, user)
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.trim().to_ascii_lowercase();
    let row = state
        .with_db(move |db| db.get_user_by_username(&username))
        .await?
        .ok_or_else(invalid_credentials)?;

    let hash = row.password_hash.clone();
    let password = req.password;
    let valid = blocking(move || Ok(verify_password(&hash, &password))).await?;
    if !valid {
        warn!(user_id = row.id, "Failed login attempt");
        return Err(invalid_credentials());
    }

    respond_with_token(&state, jar, row.into_user())
}

pub async fn logout(jar: CookieJar) -> impl IntoResponse {
    let jar = jar.remove(Cookie::build(TOKEN_COOKIE).path("/"));
    (jar, Json(serde_json::json!({ "success": true })))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<User>, ApiError> {
    let user = state
        .with_db(move |db| db.get_user_by_id(claims.id))
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;
    Ok(Json(user.into_user()))
}

fn invalid_credentials() -> ApiError {
    ApiError::Unauthenticated("Invalid username or password".into())
}

fn respond_with_token(
    state: &AppState,
    jar: CookieJar,
    user: User,
) -> Result<(CookieJar, Json<AuthResponse>), ApiError> {
    let ttl_days = state.auth.token_ttl_days;
    let token = issue_token(&state.auth.jwt_secret, &user, ttl_days)?;

    let cookie = Cookie::build((TOKEN_COOKIE, token.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(cookie::time::Duration::days(ttl_days));

    Ok((
        jar.add(cookie),
        Json(AuthResponse {
            success: true,
            token,
            user,
        }),
    ))
}

/// Sign an HS256 token for `user`, valid for `ttl_days`.
pub fn issue_token(secret: &str, user: &User, ttl_days: i64) -> anyhow::Result<String> {
    let claims = Claims {
        id: user.id,
        username: user.username.clone(),
        is_admin: user.is_admin,
        exp: (chrono::Utc::now() + chrono::Duration::days(ttl_days)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Claims of a valid, unexpired token. Any failure is just "no identity".
pub fn verify_token(secret: &str, token: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {e}"))?
        .to_string();
    Ok(hash)
}

pub fn verify_password(hash: &str, password: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        warn!("Stored password hash is malformed");
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Create the configured administrator account if it does not exist yet.
pub fn ensure_seed_admin(db: &Database, email: &str, password: &str) -> anyhow::Result<()> {
    let email = email.trim().to_ascii_lowercase();
    if db.get_user_by_username(&email)?.is_some() {
        return Ok(());
    }

    let hash = hash_password(password)?;
    db.create_user(&email, &hash, "Administrator", true)?;
    info!("Seeded administrator account {}", email);
    Ok(())
}
