use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{ApplicationKind, ApplicationStatus, ChatConversation, ChatMessage, User};

// -- JWT Claims --

/// Identity carried by every signed token. `is_admin` mirrors the user's
/// role column at the time the token was issued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub id: i64,
    pub username: String,
    pub is_admin: bool,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SignupRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub full_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub token: String,
    pub user: User,
}

// -- Applications --

/// Submitted form body; keys are validated against the kind's catalogue.
pub type ApplicationForm = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedResponse {
    pub success: bool,
    pub id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusUpdateRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TrackingRequest {
    pub tracking_number: String,
    #[serde(default)]
    pub shipping_carrier: Option<String>,
}

/// Outcome of a status transition. `applied` is always true when returned;
/// `notified` reports whether the applicant email went out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub application_id: i64,
    pub kind: ApplicationKind,
    pub previous_status: String,
    pub status: ApplicationStatus,
    pub applied: bool,
    pub notified: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingAssignment {
    pub application_id: i64,
    pub kind: ApplicationKind,
    pub tracking_number: String,
    pub shipping_carrier: Option<String>,
    pub applied: bool,
    pub notified: bool,
}

// -- Chat --

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StartConversationRequest {
    pub session_id: Option<String>,
    pub visitor_name: Option<String>,
    pub visitor_email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SendChatMessageRequest {
    pub session_id: String,
    pub message: String,
    pub visitor_name: Option<String>,
    pub visitor_email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdminReplyRequest {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatThread {
    pub conversation: ChatConversation,
    pub messages: Vec<ChatMessage>,
}

// -- Visitors --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TrackVisitRequest {
    pub page_path: String,
    pub referrer: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageViews {
    pub page_path: String,
    pub views: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitorStats {
    pub total_views: i64,
    pub unique_sessions: i64,
    pub views_today: i64,
    pub top_pages: Vec<PageViews>,
}

// -- Admin dashboard --

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KindSummary {
    pub kind: ApplicationKind,
    pub total: i64,
    pub by_status: BTreeMap<String, i64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardResponse {
    pub applications: Vec<KindSummary>,
    pub total_users: i64,
    pub active_chats: i64,
    pub views_today: i64,
}

// -- Contact --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContactRequest {
    pub name: String,
    pub email: String,
    pub subject: Option<String>,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NotifyResponse {
    pub success: bool,
    pub notified: bool,
}
