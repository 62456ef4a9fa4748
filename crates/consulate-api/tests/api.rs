use std::sync::{Arc, Mutex};

use axum::{
    Router,
    body::{Body, Bytes},
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use futures_util::future::BoxFuture;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use consulate_api::notify::Notifier;
use consulate_api::router::build_router;
use consulate_api::state::{AppStateInner, AuthSettings};
use consulate_db::Database;
use consulate_types::events::NotificationEvent;
use consulate_types::models::ApplicationKind;

const ADMIN: &str = "root@consulate.gov";

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<NotificationEvent>>,
}

impl Notifier for RecordingNotifier {
    fn notify<'a>(&'a self, event: &'a NotificationEvent) -> BoxFuture<'a, anyhow::Result<()>> {
        self.sent.lock().unwrap().push(event.clone());
        Box::pin(async { Ok::<_, anyhow::Error>(()) })
    }
}

struct TestApp {
    router: Router,
    db: Database,
    notifier: Arc<RecordingNotifier>,
}

fn app() -> TestApp {
    let db = Database::open_in_memory().unwrap();
    let notifier = Arc::new(RecordingNotifier::default());
    let state = Arc::new(AppStateInner {
        db: db.clone(),
        notifier: notifier.clone(),
        auth: AuthSettings {
            jwt_secret: "test-secret".into(),
            token_ttl_days: 7,
            admin_emails: vec![ADMIN.into()],
        },
        contact_email: "desk@consulate.local".into(),
    });

    TestApp {
        router: build_router(state),
        db,
        notifier,
    }
}

async fn send(
    app: &TestApp,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, HeaderMap, Bytes) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let req = match body {
        Some(body) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };

    let response = app.router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, bytes)
}

async fn json_call(
    app: &TestApp,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let (status, _, bytes) = send(app, method, uri, token, body).await;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn signup(app: &TestApp, username: &str) -> String {
    let (status, body) = json_call(
        app,
        Method::POST,
        "/api/signup",
        None,
        Some(json!({ "username": username, "password": "password123", "fullName": "Test" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["token"].as_str().unwrap().to_string()
}

async fn submit_visa(app: &TestApp, token: &str) -> i64 {
    let (status, body) = json_call(
        app,
        Method::POST,
        "/api/visa-applications",
        Some(token),
        Some(json!({
            "fullName": "Ada Lovelace",
            "email": "ada.l@example.org",
            "visaType": "business"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["success"], true);
    body["id"].as_i64().unwrap()
}

#[tokio::test]
async fn health_is_ok() {
    let app = app();
    let (status, body) = json_call(&app, Method::GET, "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn signup_login_and_duplicates() {
    let app = app();
    signup(&app, "ada@example.com").await;

    let (status, body) = json_call(
        &app,
        Method::POST,
        "/api/signup",
        None,
        Some(json!({ "username": "ADA@example.com", "password": "password123" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string());

    let (status, _) = json_call(
        &app,
        Method::POST,
        "/api/login",
        None,
        Some(json!({ "username": "ada@example.com", "password": "wrong-password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = json_call(
        &app,
        Method::POST,
        "/api/login",
        None,
        Some(json!({ "username": "ada@example.com", "password": "password123" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["isAdmin"], false);

    let token = body["token"].as_str().unwrap();
    let (status, me) = json_call(&app, Method::GET, "/api/me", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "ada@example.com");
}

#[tokio::test]
async fn short_password_is_rejected() {
    let app = app();
    let (status, body) = json_call(
        &app,
        Method::POST,
        "/api/signup",
        None,
        Some(json!({ "username": "ada@example.com", "password": "short" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Password must be at least 8 characters");
}

#[tokio::test]
async fn admin_role_comes_from_configuration() {
    let app = app();
    let token = signup(&app, ADMIN).await;
    let (_, me) = json_call(&app, Method::GET, "/api/me", Some(&token), None).await;
    assert_eq!(me["isAdmin"], true);

    // A username merely containing "admin" gets no privileges.
    let token = signup(&app, "admin.fan@example.com").await;
    let (_, me) = json_call(&app, Method::GET, "/api/me", Some(&token), None).await;
    assert_eq!(me["isAdmin"], false);
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let app = app();
    let (status, _) = json_call(
        &app,
        Method::POST,
        "/api/visa-applications",
        None,
        Some(json!({ "fullName": "Ada" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = json_call(&app, Method::GET, "/api/me", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn token_cookie_is_accepted() {
    let app = app();
    let token = signup(&app, "ada@example.com").await;

    let req = Request::builder()
        .uri("/api/me")
        .header(header::COOKIE, format!("token={token}"))
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn non_owner_gets_forbidden_with_error_only() {
    let app = app();
    let ada = signup(&app, "ada@example.com").await;
    let bob = signup(&app, "bob@example.com").await;
    let id = submit_visa(&app, &ada).await;

    let uri = format!("/api/visa-applications/{id}");
    let (status, body) = json_call(&app, Method::GET, &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let object = body.as_object().unwrap();
    assert_eq!(object.len(), 1);
    assert!(object.contains_key("error"));

    let (status, _) = json_call(
        &app,
        Method::GET,
        "/api/visa-applications/user/ada@example.com",
        Some(&bob),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = json_call(&app, Method::GET, &uri, Some(&ada), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["userName"], "ada@example.com");
    assert_eq!(body["status"], "pending");
    assert_eq!(body["visaType"], "business");
    assert_eq!(body["statusHistory"], json!([]));
}

#[tokio::test]
async fn own_listing_ignores_username_case() {
    let app = app();
    let ada = signup(&app, "ada@example.com").await;
    let id = submit_visa(&app, &ada).await;

    let (status, body) = json_call(
        &app,
        Method::GET,
        "/api/visa-applications/user/ADA@example.com",
        Some(&ada),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let listed = body.as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["id"], id);
}

#[tokio::test]
async fn malformed_ids_get_a_json_error() {
    let app = app();
    let admin = signup(&app, ADMIN).await;

    for (method, uri) in [
        (Method::GET, "/api/visa-applications/abc"),
        (Method::GET, "/api/travel-pass-applications/abc/pdf"),
        (Method::GET, "/api/admin/chat/conversations/abc/messages"),
        (Method::PUT, "/api/admin/chat/conversations/abc/close"),
    ] {
        let (status, headers, bytes) = send(&app, method, uri, Some(&admin), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(headers[header::CONTENT_TYPE], "application/json", "{uri}");
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body["error"].is_string(), "{uri}");
    }
}

#[tokio::test]
async fn signup_rejects_unknown_fields() {
    let app = app();
    let (status, body) = json_call(
        &app,
        Method::POST,
        "/api/signup",
        None,
        Some(json!({
            "username": "ada@example.com",
            "password": "password123",
            "fullName": "Ada",
            "isAdmin": true
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn non_admin_cannot_list_or_change_status() {
    let app = app();
    let ada = signup(&app, "ada@example.com").await;
    let id = submit_visa(&app, &ada).await;

    let (status, _) = json_call(&app, Method::GET, "/api/visa-applications", Some(&ada), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = json_call(
        &app,
        Method::PUT,
        &format!("/api/visa-applications/{id}/status"),
        Some(&ada),
        Some(json!({ "status": "approved" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(app.db.status_history(ApplicationKind::Visa, id).unwrap().is_empty());
}

#[tokio::test]
async fn visa_submit_then_approve() {
    let app = app();
    let ada = signup(&app, "ada@example.com").await;
    let admin = signup(&app, ADMIN).await;
    let id = submit_visa(&app, &ada).await;

    let status_uri = format!("/api/visa-applications/{id}/status");
    let (status, body) = json_call(
        &app,
        Method::PUT,
        &status_uri,
        Some(&admin),
        Some(json!({ "status": "issued" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("issued"));
    assert!(app.db.status_history(ApplicationKind::Visa, id).unwrap().is_empty());
    assert!(app.notifier.sent.lock().unwrap().is_empty());

    let (status, change) = json_call(
        &app,
        Method::PUT,
        &status_uri,
        Some(&admin),
        Some(json!({ "status": "approved" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{change}");
    assert_eq!(change["previousStatus"], "pending");
    assert_eq!(change["status"], "approved");
    assert_eq!(change["applied"], true);
    assert_eq!(change["notified"], true);

    let (_, application) = json_call(
        &app,
        Method::GET,
        &format!("/api/visa-applications/{id}"),
        Some(&ada),
        None,
    )
    .await;
    assert_eq!(application["status"], "approved");
    let history = application["statusHistory"].as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["status"], "approved");
    assert_eq!(history[0]["previousStatus"], "pending");
    assert_eq!(history[0]["changedBy"], ADMIN);

    let sent = app.notifier.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient(), "ada.l@example.org");

    drop(sent);
    let (status, list) =
        json_call(&app, Method::GET, "/api/visa-applications", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list[0]["statusHistory"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn tracking_assignment() {
    let app = app();
    let ada = signup(&app, "ada@example.com").await;
    let admin = signup(&app, ADMIN).await;
    let id = submit_visa(&app, &ada).await;

    let (status, body) = json_call(
        &app,
        Method::PUT,
        &format!("/api/visa-applications/{id}/tracking"),
        Some(&admin),
        Some(json!({ "trackingNumber": "1Z999", "shippingCarrier": "dhl" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["trackingNumber"], "1Z999");
    assert_eq!(body["shippingCarrier"], "dhl");

    let (status, _) = json_call(
        &app,
        Method::PUT,
        "/api/visa-applications/999/tracking",
        Some(&admin),
        Some(json!({ "trackingNumber": "1Z999" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_form_is_rejected_before_storage() {
    let app = app();
    let ada = signup(&app, "ada@example.com").await;

    let (status, body) = json_call(
        &app,
        Method::POST,
        "/api/birth-certificate-applications",
        Some(&ada),
        Some(json!({ "fullName": "Ada", "email": "ada@example.com", "childName": "Byron" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Date of birth is required");
    assert!(
        app.db
            .list_applications(ApplicationKind::BirthCertificate)
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn pdf_download() {
    let app = app();
    let ada = signup(&app, "ada@example.com").await;
    let id = submit_visa(&app, &ada).await;

    let (status, headers, bytes) = send(
        &app,
        Method::GET,
        &format!("/api/visa-applications/{id}/pdf"),
        Some(&ada),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/pdf");
    assert!(
        headers[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .contains(&format!("visa-application-{id}.pdf"))
    );
    assert!(bytes.starts_with(b"%PDF"));
}

#[tokio::test]
async fn chat_conversation_is_idempotent_per_session() {
    let app = app();

    let (status, first) = json_call(
        &app,
        Method::POST,
        "/api/chat/conversations",
        None,
        Some(json!({ "sessionId": "sess-42", "visitorName": "Ada" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, second) = json_call(
        &app,
        Method::POST,
        "/api/chat/conversations",
        None,
        Some(json!({ "sessionId": "sess-42" })),
    )
    .await;
    assert_eq!(first["id"], second["id"]);
    assert_eq!(second["visitorName"], "Ada");

    let (_, generated) =
        json_call(&app, Method::POST, "/api/chat/conversations", None, Some(json!({}))).await;
    assert_ne!(generated["sessionId"], "sess-42");
    assert!(!generated["sessionId"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn chat_flow_with_admin_reply_and_close() {
    let app = app();
    let admin = signup(&app, ADMIN).await;

    let message = |text: &str| json!({ "sessionId": "sess-7", "message": text });

    let (status, thread) =
        json_call(&app, Method::POST, "/api/chat/messages", None, Some(message("hi"))).await;
    assert_eq!(status, StatusCode::OK);
    let messages = thread["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["senderType"], "user");
    assert_eq!(messages[1]["senderType"], "bot");

    let (_, thread) =
        json_call(&app, Method::POST, "/api/chat/messages", None, Some(message("anyone?"))).await;
    assert_eq!(thread["messages"].as_array().unwrap().len(), 3);

    let id = thread["conversation"]["id"].as_i64().unwrap();
    let (status, thread) = json_call(
        &app,
        Method::POST,
        &format!("/api/admin/chat/conversations/{id}/messages"),
        Some(&admin),
        Some(json!({ "message": "How can we help?" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(thread["messages"][3]["senderType"], "admin");
    assert_eq!(thread["messages"][3]["senderName"], ADMIN);

    let (status, inbox) =
        json_call(&app, Method::GET, "/api/admin/chat/conversations", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(inbox.as_array().unwrap().len(), 1);

    let (status, closed) = json_call(
        &app,
        Method::PUT,
        &format!("/api/admin/chat/conversations/{id}/close"),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(closed["status"], "closed");

    let (status, _) =
        json_call(&app, Method::POST, "/api/chat/messages", None, Some(message("hello?"))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, polled) = json_call(
        &app,
        Method::GET,
        "/api/chat/conversations/sess-7/messages",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(polled["messages"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn visitor_tracking_and_stats() {
    let app = app();
    let admin = signup(&app, ADMIN).await;

    for (session, path) in [("a", "/"), ("a", "/visa"), ("b", "/")] {
        let (status, _) = json_call(
            &app,
            Method::POST,
            "/api/visitors/track",
            None,
            Some(json!({ "pagePath": path, "sessionId": session })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, stats) =
        json_call(&app, Method::GET, "/api/admin/visitors/stats", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["totalViews"], 3);
    assert_eq!(stats["uniqueSessions"], 2);
    assert_eq!(stats["viewsToday"], 3);
    assert_eq!(stats["topPages"][0], json!({ "pagePath": "/", "views": 2 }));

    let (_, recent) =
        json_call(&app, Method::GET, "/api/admin/visitors/recent", Some(&admin), None).await;
    assert_eq!(recent.as_array().unwrap().len(), 3);

    let (_, dashboard) =
        json_call(&app, Method::GET, "/api/admin/dashboard", Some(&admin), None).await;
    assert_eq!(dashboard["viewsToday"], 3);
    assert_eq!(dashboard["totalUsers"], 1);
    assert_eq!(dashboard["applications"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn contact_form_notifies_the_desk() {
    let app = app();
    let (status, body) = json_call(
        &app,
        Method::POST,
        "/api/contact",
        None,
        Some(json!({
            "name": "Ada",
            "email": "ada@example.com",
            "message": "When are you open?"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true, "notified": true }));

    let sent = app.notifier.sent.lock().unwrap();
    assert_eq!(sent[0].recipient(), "desk@consulate.local");
}
