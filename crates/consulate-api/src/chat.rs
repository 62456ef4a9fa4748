use axum::{
    Extension, Json,
    extract::State,
};
use tracing::info;
use uuid::Uuid;

use consulate_db::Database;
use consulate_db::models::ConversationRow;
use consulate_types::api::{
    AdminReplyRequest, ChatThread, Claims, SendChatMessageRequest, StartConversationRequest,
};
use consulate_types::models::{ChatConversation, SenderType};

use crate::error::{ApiError, ApiJson, ApiPath};
use crate::state::AppState;
use crate::validation;

/// Conversations shown on the admin inbox.
pub const ADMIN_INBOX_LIMIT: u32 = 50;

const MAX_SESSION_ID_LEN: usize = 128;
const MAX_MESSAGE_LEN: usize = 2000;
const MAX_VISITOR_NAME_LEN: usize = 120;

pub const BOT_GREETING: &str = "Thanks for reaching out! A consular officer will reply here shortly. \
     For application updates, please include your reference number.";

/// Visitor identity as supplied, validated.
struct Visitor {
    name: Option<String>,
    email: Option<String>,
}

fn visitor(name: Option<&str>, email: Option<&str>) -> Result<Visitor, ApiError> {
    let name = validation::optional_text("Visitor name", name, MAX_VISITOR_NAME_LEN)?;
    let email = match email.map(str::trim).filter(|e| !e.is_empty()) {
        Some(raw) => Some(validation::email("Visitor email", raw)?),
        None => None,
    };
    Ok(Visitor { name, email })
}

pub async fn start_conversation(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<StartConversationRequest>,
) -> Result<Json<ChatConversation>, ApiError> {
    let session_id = match req.session_id.as_deref() {
        Some(raw) => validation::required_text("Session id", raw, MAX_SESSION_ID_LEN)?,
        None => Uuid::new_v4().to_string(),
    };
    let Visitor { name, email } = visitor(req.visitor_name.as_deref(), req.visitor_email.as_deref())?;

    let (row, created) = state
        .with_db(move |db| {
            db.get_or_create_conversation(&session_id, name.as_deref(), email.as_deref())
        })
        .await?;

    if created {
        info!(conversation_id = row.id, session_id = %row.session_id, "Chat conversation started");
    }
    Ok(Json(row.into_conversation()))
}

/// Visitor message. Creates the conversation on first contact and answers the
/// very first message with a canned bot greeting.
pub async fn send_message(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<SendChatMessageRequest>,
) -> Result<Json<ChatThread>, ApiError> {
    let session_id = validation::required_text("Session id", &req.session_id, MAX_SESSION_ID_LEN)?;
    let message = validation::required_text("Message", &req.message, MAX_MESSAGE_LEN)?;
    let Visitor { name, email } = visitor(req.visitor_name.as_deref(), req.visitor_email.as_deref())?;

    let thread = state
        .with_db(move |db| {
            let (conversation, _) =
                db.get_or_create_conversation(&session_id, name.as_deref(), email.as_deref())?;
            if conversation.is_closed() {
                return Ok(None);
            }

            let sender = conversation.visitor_name.clone();
            db.insert_chat_message(conversation.id, SenderType::User, sender.as_deref(), &message)?;
            if db.count_messages(conversation.id)? == 1 {
                db.insert_chat_message(conversation.id, SenderType::Bot, None, BOT_GREETING)?;
            }

            thread(db, conversation.id).map(Some)
        })
        .await?
        .ok_or_else(closed)?;

    Ok(Json(thread))
}

/// Polling endpoint for the visitor widget.
pub async fn visitor_messages(
    State(state): State<AppState>,
    ApiPath(session_id): ApiPath<String>,
) -> Result<Json<ChatThread>, ApiError> {
    let thread = state
        .with_db(move |db| match db.get_conversation_by_session(&session_id)? {
            Some(conversation) => thread(db, conversation.id).map(Some),
            None => Ok(None),
        })
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(thread))
}

// -- Admin --

pub async fn list_conversations(
    State(state): State<AppState>,
) -> Result<Json<Vec<ChatConversation>>, ApiError> {
    let rows = state
        .with_db(|db| db.recent_conversations(ADMIN_INBOX_LIMIT))
        .await?;
    Ok(Json(rows.into_iter().map(ConversationRow::into_conversation).collect()))
}

pub async fn conversation_messages(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<ChatThread>, ApiError> {
    let thread = state
        .with_db(move |db| match db.get_conversation(id)? {
            Some(_) => thread(db, id).map(Some),
            None => Ok(None),
        })
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(thread))
}

pub async fn admin_reply(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<AdminReplyRequest>,
) -> Result<Json<ChatThread>, ApiError> {
    let message = validation::required_text("Message", &req.message, MAX_MESSAGE_LEN)?;

    let outcome = state
        .with_db(move |db| {
            let Some(conversation) = db.get_conversation(id)? else {
                return Ok(Err(not_found()));
            };
            if conversation.is_closed() {
                return Ok(Err(closed()));
            }
            db.insert_chat_message(id, SenderType::Admin, Some(&claims.username), &message)?;
            thread(db, id).map(Ok)
        })
        .await?;

    Ok(Json(outcome?))
}

pub async fn close_conversation(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<ChatConversation>, ApiError> {
    let row = state
        .with_db(move |db| {
            if !db.close_conversation(id)? {
                return Ok(None);
            }
            db.get_conversation(id)
        })
        .await?
        .ok_or_else(not_found)?;

    info!(conversation_id = id, "Chat conversation closed");
    Ok(Json(row.into_conversation()))
}

fn thread(db: &Database, conversation_id: i64) -> anyhow::Result<ChatThread> {
    let conversation = db
        .get_conversation(conversation_id)?
        .ok_or_else(|| anyhow::anyhow!("conversation {conversation_id} disappeared"))?;
    let messages = db.list_messages(conversation_id)?;
    Ok(ChatThread {
        conversation: conversation.into_conversation(),
        messages: messages.into_iter().map(|m| m.into_message()).collect(),
    })
}

fn not_found() -> ApiError {
    ApiError::NotFound("Conversation not found".into())
}

fn closed() -> ApiError {
    ApiError::Conflict("This conversation has been closed".into())
}
