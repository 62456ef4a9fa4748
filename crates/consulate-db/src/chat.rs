use anyhow::Result;
use rusqlite::{OptionalExtension, Row};

use consulate_types::models::{ChatStatus, SenderType};

use crate::Database;
use crate::models::{ChatMessageRow, ConversationRow, now_timestamp};

const CONVERSATION_COLUMNS: &str =
    "id, session_id, visitor_name, visitor_email, status, created_at, last_message_at";

impl Database {
    /// Fetch the conversation for `session_id`, creating it on first contact.
    /// Visitor details fill in blanks on an existing row but never overwrite.
    /// Returns the row and whether it was created by this call.
    pub fn get_or_create_conversation(
        &self,
        session_id: &str,
        visitor_name: Option<&str>,
        visitor_email: Option<&str>,
    ) -> Result<(ConversationRow, bool)> {
        self.with_conn(|conn| {
            let now = now_timestamp();
            let inserted = conn.execute(
                "INSERT INTO chat_conversations
                    (session_id, visitor_name, visitor_email, status, created_at, last_message_at)
                 VALUES (?1, ?2, ?3, 'active', ?4, ?4)
                 ON CONFLICT(session_id) DO NOTHING",
                rusqlite::params![session_id, visitor_name, visitor_email, now],
            )?;

            if inserted == 0 {
                conn.execute(
                    "UPDATE chat_conversations
                     SET visitor_name = COALESCE(visitor_name, ?2),
                         visitor_email = COALESCE(visitor_email, ?3)
                     WHERE session_id = ?1",
                    rusqlite::params![session_id, visitor_name, visitor_email],
                )?;
            }

            let row = conn.query_row(
                &format!("SELECT {CONVERSATION_COLUMNS} FROM chat_conversations WHERE session_id = ?1"),
                [session_id],
                read_conversation,
            )?;
            Ok((row, inserted > 0))
        })
    }

    pub fn get_conversation(&self, id: i64) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {CONVERSATION_COLUMNS} FROM chat_conversations WHERE id = ?1"),
                    [id],
                    read_conversation,
                )
                .optional()?)
        })
    }

    pub fn get_conversation_by_session(&self, session_id: &str) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {CONVERSATION_COLUMNS} FROM chat_conversations WHERE session_id = ?1"),
                    [session_id],
                    read_conversation,
                )
                .optional()?)
        })
    }

    /// Append a message and bump the conversation's `last_message_at`.
    pub fn insert_chat_message(
        &self,
        conversation_id: i64,
        sender_type: SenderType,
        sender_name: Option<&str>,
        message: &str,
    ) -> Result<i64> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let now = now_timestamp();
            tx.execute(
                "INSERT INTO chat_messages (conversation_id, sender_type, sender_name, message, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![conversation_id, sender_type.as_str(), sender_name, message, &now],
            )?;
            let id = tx.last_insert_rowid();
            tx.execute(
                "UPDATE chat_conversations SET last_message_at = ?1 WHERE id = ?2",
                rusqlite::params![&now, conversation_id],
            )?;
            tx.commit()?;
            Ok(id)
        })
    }

    /// Messages of one conversation in the order they were sent.
    pub fn list_messages(&self, conversation_id: i64) -> Result<Vec<ChatMessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, sender_type, sender_name, message, created_at
                 FROM chat_messages
                 WHERE conversation_id = ?1
                 ORDER BY created_at ASC, id ASC",
            )?;
            let rows = stmt
                .query_map([conversation_id], read_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count_messages(&self, conversation_id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM chat_messages WHERE conversation_id = ?1",
                [conversation_id],
                |r| r.get(0),
            )?)
        })
    }

    /// Most recently active conversations first.
    pub fn recent_conversations(&self, limit: u32) -> Result<Vec<ConversationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONVERSATION_COLUMNS} FROM chat_conversations
                 ORDER BY last_message_at DESC, id DESC
                 LIMIT ?1"
            ))?;
            let rows = stmt
                .query_map([limit], read_conversation)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Flip a conversation to closed. Messages are kept. Returns false if the
    /// conversation is absent.
    pub fn close_conversation(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE chat_conversations SET status = ?1 WHERE id = ?2",
                rusqlite::params![ChatStatus::Closed.as_str(), id],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn count_active_conversations(&self) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM chat_conversations WHERE status = ?1",
                [ChatStatus::Active.as_str()],
                |r| r.get(0),
            )?)
        })
    }
}

fn read_conversation(row: &Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        session_id: row.get(1)?,
        visitor_name: row.get(2)?,
        visitor_email: row.get(3)?,
        status: row.get(4)?,
        created_at: row.get(5)?,
        last_message_at: row.get(6)?,
    })
}

fn read_message(row: &Row<'_>) -> rusqlite::Result<ChatMessageRow> {
    Ok(ChatMessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_type: row.get(2)?,
        sender_name: row.get(3)?,
        message: row.get(4)?,
        created_at: row.get(5)?,
    })
}
