use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::debug;

use consulate_types::api::Claims;

use crate::auth::verify_token;
use crate::error::ApiError;
use crate::state::AppState;

/// Cookie carrying the token for browser clients.
pub const TOKEN_COOKIE: &str = "token";

/// Token from `Authorization: Bearer`, falling back to the `token` cookie.
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());

    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    CookieJar::from_headers(headers)
        .get(TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
}

/// Claims for the caller if a valid token is present. Used by public routes
/// that only enrich their data with the identity.
pub fn optional_claims(headers: &HeaderMap, secret: &str) -> Option<Claims> {
    token_from_headers(headers).and_then(|token| verify_token(secret, &token))
}

/// Reject with 401 unless a valid token is present; stores the claims in the
/// request extensions for handlers.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let claims = optional_claims(req.headers(), &state.auth.jwt_secret).ok_or_else(|| {
        debug!("Rejecting {} {}: missing or invalid token", req.method(), req.uri().path());
        StatusCode::UNAUTHORIZED
    })?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Reject with 403 unless the authenticated caller is an administrator.
/// Must run after `require_auth`.
pub async fn require_admin(req: Request, next: Next) -> Result<Response, StatusCode> {
    let is_admin = req
        .extensions()
        .get::<Claims>()
        .map(|c| c.is_admin)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if !is_admin {
        return Err(StatusCode::FORBIDDEN);
    }
    Ok(next.run(req).await)
}

/// Owner-or-admin gate for per-user resources.
pub fn ensure_owner_or_admin(claims: &Claims, owner: &str) -> Result<(), ApiError> {
    if claims.is_admin || claims.username.eq_ignore_ascii_case(owner) {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn claims(username: &str, is_admin: bool) -> Claims {
        Claims {
            id: 1,
            username: username.into(),
            is_admin,
            exp: 0,
        }
    }

    #[test]
    fn bearer_header_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.insert(header::COOKIE, HeaderValue::from_static("token=from-cookie"));
        assert_eq!(token_from_headers(&headers).as_deref(), Some("abc"));
    }

    #[test]
    fn cookie_is_the_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; token=xyz"));
        assert_eq!(token_from_headers(&headers).as_deref(), Some("xyz"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic Zm9v"));
        assert_eq!(token_from_headers(&headers).as_deref(), Some("xyz"));

        assert!(token_from_headers(&HeaderMap::new()).is_none());
    }

    #[test]
    fn owner_and_admin_pass_the_gate() {
        assert!(ensure_owner_or_admin(&claims("ada@example.com", false), "ada@example.com").is_ok());
        assert!(ensure_owner_or_admin(&claims("ADA@example.com", false), "ada@example.com").is_ok());
        assert!(ensure_owner_or_admin(&claims("root@consulate.gov", true), "ada@example.com").is_ok());
        assert!(matches!(
            ensure_owner_or_admin(&claims("bob@example.com", false), "ada@example.com"),
            Err(ApiError::Forbidden)
        ));
    }
}
