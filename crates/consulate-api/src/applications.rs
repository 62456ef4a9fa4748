use axum::{
    Extension, Json, Router,
    extract::State,
    http::header,
    middleware,
    response::IntoResponse,
    routing::{MethodRouter, get, post, put},
};
use tracing::{error, info};

use consulate_db::Database;
use consulate_types::api::{
    ApplicationForm, Claims, CreatedResponse, StatusChange, StatusUpdateRequest,
    TrackingAssignment, TrackingRequest,
};
use consulate_types::models::{Application, ApplicationKind};

use crate::documents;
use crate::error::{ApiError, ApiJson, ApiPath};
use crate::middleware::{ensure_owner_or_admin, require_admin, require_auth};
use crate::state::AppState;
use crate::validation::validate_form;
use crate::workflow;

/// Routes for one application kind under `/api/{slug}-applications`. Every
/// route requires a token; listing everything and changing status or
/// tracking additionally require an administrator.
pub fn router(state: AppState, kind: ApplicationKind) -> Router<AppState> {
    let base = format!("/api/{}-applications", kind.slug());

    Router::new()
        .route(&base, post(submit).merge(admin_only(get(list_all))))
        .route(&format!("{base}/{{id}}"), get(get_application))
        .route(&format!("{base}/user/{{username}}"), get(list_for_user))
        .route(&format!("{base}/{{id}}/status"), admin_only(put(update_status)))
        .route(&format!("{base}/{{id}}/tracking"), admin_only(put(assign_tracking)))
        .route(&format!("{base}/{{id}}/pdf"), get(download_pdf))
        .route_layer(middleware::from_fn_with_state(state, require_auth))
        .layer(Extension(kind))
}

fn admin_only(route: MethodRouter<AppState>) -> MethodRouter<AppState> {
    route.route_layer(middleware::from_fn(require_admin))
}

pub async fn submit(
    State(state): State<AppState>,
    Extension(kind): Extension<ApplicationKind>,
    Extension(claims): Extension<Claims>,
    ApiJson(form): ApiJson<ApplicationForm>,
) -> Result<Json<CreatedResponse>, ApiError> {
    let values = validate_form(kind, &form)?;

    let owner = claims.username.clone();
    let id = state
        .with_db(move |db| db.insert_application(kind, &owner, &values))
        .await?;

    info!(kind = %kind, application_id = id, "Application submitted");
    Ok(Json(CreatedResponse { success: true, id }))
}

pub async fn list_all(
    State(state): State<AppState>,
    Extension(kind): Extension<ApplicationKind>,
) -> Result<Json<Vec<Application>>, ApiError> {
    let applications = state
        .with_db(move |db| with_histories(db, kind, db.list_applications(kind)?))
        .await?;
    Ok(Json(applications))
}

pub async fn get_application(
    State(state): State<AppState>,
    Extension(kind): Extension<ApplicationKind>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Application>, ApiError> {
    let application = fetch(&state, kind, id).await?;
    ensure_owner_or_admin(&claims, &application.user_name)?;
    Ok(Json(application))
}

pub async fn list_for_user(
    State(state): State<AppState>,
    Extension(kind): Extension<ApplicationKind>,
    Extension(claims): Extension<Claims>,
    ApiPath(username): ApiPath<String>,
) -> Result<Json<Vec<Application>>, ApiError> {
    let username = username.trim().to_ascii_lowercase();
    ensure_owner_or_admin(&claims, &username)?;

    let applications = state
        .with_db(move |db| {
            let rows = db.list_applications_for_user(kind, &username)?;
            with_histories(db, kind, rows)
        })
        .await?;
    Ok(Json(applications))
}

pub async fn update_status(
    State(state): State<AppState>,
    Extension(kind): Extension<ApplicationKind>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<StatusUpdateRequest>,
) -> Result<Json<StatusChange>, ApiError> {
    let change = workflow::update_status(
        &state.db,
        state.notifier.as_ref(),
        kind,
        id,
        &req.status,
        &claims.username,
    )
    .await?;
    Ok(Json(change))
}

pub async fn assign_tracking(
    State(state): State<AppState>,
    Extension(kind): Extension<ApplicationKind>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<TrackingRequest>,
) -> Result<Json<TrackingAssignment>, ApiError> {
    let assignment = workflow::assign_tracking(
        &state.db,
        state.notifier.as_ref(),
        kind,
        id,
        &req.tracking_number,
        req.shipping_carrier.as_deref(),
    )
    .await?;
    Ok(Json(assignment))
}

pub async fn download_pdf(
    State(state): State<AppState>,
    Extension(kind): Extension<ApplicationKind>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let application = fetch(&state, kind, id).await?;
    ensure_owner_or_admin(&claims, &application.user_name)?;

    let bytes = tokio::task::spawn_blocking(move || documents::render_pdf(&application))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow::anyhow!("PDF task failed: {e}"))
        })?
        .map_err(ApiError::Dependency)?;

    let disposition = format!("attachment; filename=\"{}-application-{}.pdf\"", kind.slug(), id);
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

async fn fetch(state: &AppState, kind: ApplicationKind, id: i64) -> Result<Application, ApiError> {
    state
        .with_db(move |db| {
            let Some(row) = db.get_application(kind, id)? else {
                return Ok(None);
            };
            let history = db.status_history(kind, id)?;
            Ok(Some(row.into_application(history)))
        })
        .await?
        .ok_or_else(|| ApiError::NotFound("Application not found".into()))
}

fn with_histories(
    db: &Database,
    kind: ApplicationKind,
    rows: Vec<consulate_db::models::ApplicationRow>,
) -> anyhow::Result<Vec<Application>> {
    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let mut histories = db.status_histories(kind, &ids)?;
    Ok(rows
        .into_iter()
        .map(|row| {
            let history = histories.remove(&row.id).unwrap_or_default();
            row.into_application(history)
        })
        .collect())
}
