use axum::{
    Json, Router, middleware,
    routing::{get, post, put},
};

use consulate_types::models::ApplicationKind;

use crate::middleware::{require_admin, require_auth};
use crate::state::AppState;
use crate::{admin, applications, auth, chat, contact, visitors};

/// Every `/api` route. Cross-cutting layers (CORS, tracing) are added by the
/// server binary.
pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/health", get(health))
        .route("/api/signup", post(auth::signup))
        .route("/api/login", post(auth::login))
        .route("/api/logout", post(auth::logout))
        .route("/api/contact", post(contact::submit))
        .route("/api/visitors/track", post(visitors::track))
        .route("/api/chat/conversations", post(chat::start_conversation))
        .route("/api/chat/messages", post(chat::send_message))
        .route(
            "/api/chat/conversations/{session_id}/messages",
            get(chat::visitor_messages),
        );

    let protected_routes = Router::new()
        .route("/api/me", get(auth::me))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let admin_routes = Router::new()
        .route("/api/admin/dashboard", get(admin::dashboard))
        .route("/api/admin/chat/conversations", get(chat::list_conversations))
        .route(
            "/api/admin/chat/conversations/{id}/messages",
            get(chat::conversation_messages).post(chat::admin_reply),
        )
        .route("/api/admin/chat/conversations/{id}/close", put(chat::close_conversation))
        .route("/api/admin/visitors/recent", get(visitors::recent))
        .route("/api/admin/visitors/stats", get(visitors::stats))
        .route_layer(middleware::from_fn(require_admin))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let mut app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(admin_routes);

    for kind in ApplicationKind::ALL {
        app = app.merge(applications::router(state.clone(), kind));
    }

    app.with_state(state)
}

/// Liveness probe. Never touches the store.
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
