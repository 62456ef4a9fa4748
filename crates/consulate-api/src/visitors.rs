use axum::{
    Json,
    extract::State,
    http::{HeaderMap, header},
};
use chrono::{NaiveTime, Utc};
use sha2::{Digest, Sha256};
use tracing::debug;

use consulate_db::models::{VisitRow, format_timestamp};
use consulate_db::visitors::NewVisit;
use consulate_types::api::{PageViews, TrackVisitRequest, VisitorStats};
use consulate_types::models::VisitorLog;

use crate::error::{ApiError, ApiJson};
use crate::middleware::optional_claims;
use crate::state::AppState;
use crate::validation;

pub const RECENT_VISITS_LIMIT: u32 = 100;
pub const TOP_PAGES_LIMIT: u32 = 10;

const MAX_PATH_LEN: usize = 512;
const MAX_REFERRER_LEN: usize = 1024;
const MAX_SESSION_ID_LEN: usize = 128;
const MAX_USER_AGENT_LEN: usize = 512;

/// Record one page view. Public; a token, when present, attributes the view
/// to the signed-in user.
pub async fn track(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<TrackVisitRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let page_path = validation::required_text("Page path", &req.page_path, MAX_PATH_LEN)?;
    let referrer = validation::optional_text("Referrer", req.referrer.as_deref(), MAX_REFERRER_LEN)?;
    let session_id =
        validation::optional_text("Session id", req.session_id.as_deref(), MAX_SESSION_ID_LEN)?;

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|ua| ua.chars().take(MAX_USER_AGENT_LEN).collect::<String>());
    let ip_hash = client_ip(&headers).map(|ip| hash_ip(&ip));
    let user_id = optional_claims(&headers, &state.auth.jwt_secret).map(|c| c.id);

    state
        .with_db(move |db| {
            db.insert_visit(&NewVisit {
                session_id: session_id.as_deref(),
                page_path: &page_path,
                referrer: referrer.as_deref(),
                user_agent: user_agent.as_deref(),
                ip_hash: ip_hash.as_deref(),
                user_id,
            })
        })
        .await?;

    Ok(Json(serde_json::json!({ "success": true })))
}

pub async fn recent(State(state): State<AppState>) -> Result<Json<Vec<VisitorLog>>, ApiError> {
    let rows = state
        .with_db(|db| db.recent_visits(RECENT_VISITS_LIMIT))
        .await?;
    Ok(Json(rows.into_iter().map(VisitRow::into_visitor_log).collect()))
}

pub async fn stats(State(state): State<AppState>) -> Result<Json<VisitorStats>, ApiError> {
    let since = start_of_today();
    let totals = state
        .with_db(move |db| db.visitor_totals(&since, TOP_PAGES_LIMIT))
        .await?;

    Ok(Json(VisitorStats {
        total_views: totals.total_views,
        unique_sessions: totals.unique_sessions,
        views_today: totals.views_since,
        top_pages: totals
            .top_pages
            .into_iter()
            .map(|(page_path, views)| PageViews { page_path, views })
            .collect(),
    }))
}

/// Midnight UTC today, in the stored timestamp format.
pub fn start_of_today() -> String {
    format_timestamp(Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc())
}

/// Originating client address as reported by the reverse proxy.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let ip = forwarded.or_else(|| {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    });

    if ip.is_none() {
        debug!("No client address header on tracked visit");
    }
    ip.map(str::to_string)
}

fn hash_ip(ip: &str) -> String {
    hex::encode(Sha256::digest(ip.as_bytes()))
}
