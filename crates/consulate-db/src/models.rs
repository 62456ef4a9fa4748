//! Database row types. These map directly to SQLite rows; conversion to the
//! wire models in consulate-types happens through the `into_*` helpers.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use tracing::warn;

use consulate_types::models::{
    Application, ApplicationKind, ChatConversation, ChatMessage, ChatStatus, SenderType,
    StatusHistoryEntry, User, VisitorLog,
};

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub full_name: String,
    pub is_admin: bool,
    pub created_at: String,
}

impl UserRow {
    pub fn into_user(self) -> User {
        User {
            id: self.id,
            created_at: parse_timestamp(&self.created_at),
            username: self.username,
            full_name: self.full_name,
            is_admin: self.is_admin,
        }
    }
}

pub struct ApplicationRow {
    pub id: i64,
    pub kind: ApplicationKind,
    pub user_name: String,
    pub status: String,
    pub tracking_number: Option<String>,
    pub shipping_carrier: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    /// Form values in catalogue order, keyed by wire name.
    pub fields: Vec<(&'static str, Option<String>)>,
}

impl ApplicationRow {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| *k == key)
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn into_application(self, history: Vec<HistoryRow>) -> Application {
        let fields = self
            .fields
            .into_iter()
            .map(|(key, value)| {
                let value = value.map(serde_json::Value::String).unwrap_or(serde_json::Value::Null);
                (key.to_string(), value)
            })
            .collect();

        Application {
            id: self.id,
            kind: self.kind,
            user_name: self.user_name,
            status: self.status,
            tracking_number: self.tracking_number,
            shipping_carrier: self.shipping_carrier,
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
            status_history: history.into_iter().map(HistoryRow::into_entry).collect(),
            fields,
        }
    }
}

pub struct HistoryRow {
    pub id: i64,
    pub application_id: i64,
    pub status: String,
    pub previous_status: Option<String>,
    pub changed_by: String,
    pub changed_at: String,
}

impl HistoryRow {
    pub fn into_entry(self) -> StatusHistoryEntry {
        StatusHistoryEntry {
            changed_at: parse_timestamp(&self.changed_at),
            status: self.status,
            changed_by: self.changed_by,
            previous_status: self.previous_status,
        }
    }
}

pub struct ConversationRow {
    pub id: i64,
    pub session_id: String,
    pub visitor_name: Option<String>,
    pub visitor_email: Option<String>,
    pub status: String,
    pub created_at: String,
    pub last_message_at: String,
}

impl ConversationRow {
    pub fn is_closed(&self) -> bool {
        self.status == ChatStatus::Closed.as_str()
    }

    pub fn into_conversation(self) -> ChatConversation {
        let status = self.status.parse().unwrap_or_else(|e| {
            warn!("Corrupt status on conversation {}: {}", self.id, e);
            ChatStatus::Active
        });

        ChatConversation {
            id: self.id,
            status,
            created_at: parse_timestamp(&self.created_at),
            last_message_at: parse_timestamp(&self.last_message_at),
            session_id: self.session_id,
            visitor_name: self.visitor_name,
            visitor_email: self.visitor_email,
        }
    }
}

pub struct ChatMessageRow {
    pub id: i64,
    pub conversation_id: i64,
    pub sender_type: String,
    pub sender_name: Option<String>,
    pub message: String,
    pub created_at: String,
}

impl ChatMessageRow {
    pub fn into_message(self) -> ChatMessage {
        let sender_type = self.sender_type.parse().unwrap_or_else(|e| {
            warn!("Corrupt sender_type on chat message {}: {}", self.id, e);
            SenderType::User
        });

        ChatMessage {
            id: self.id,
            conversation_id: self.conversation_id,
            sender_type,
            sender_name: self.sender_name,
            created_at: parse_timestamp(&self.created_at),
            message: self.message,
        }
    }
}

pub struct VisitRow {
    pub id: i64,
    pub session_id: Option<String>,
    pub page_path: String,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
    pub ip_hash: Option<String>,
    pub user_id: Option<i64>,
    pub created_at: String,
}

impl VisitRow {
    pub fn into_visitor_log(self) -> VisitorLog {
        VisitorLog {
            id: self.id,
            session_id: self.session_id,
            page_path: self.page_path,
            referrer: self.referrer,
            user_agent: self.user_agent,
            user_id: self.user_id,
            created_at: parse_timestamp(&self.created_at),
        }
    }
}

/// Current time in the stored timestamp format.
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp. Accepts RFC 3339 and SQLite's
/// `datetime('now')` shape; anything else logs and yields the epoch.
pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}
