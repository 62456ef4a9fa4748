use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

use consulate_types::models::ApplicationKind;

/// Default for timestamp columns: RFC 3339 UTC with fractional seconds, the
/// same shape `models::now_timestamp` produces, so text ordering is
/// chronological.
const NOW: &str = "(strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))";

/// Create every table and index if absent. Safe to run on every start.
pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(&format!(
        "
        CREATE TABLE IF NOT EXISTS users (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            username        TEXT NOT NULL UNIQUE,
            password_hash   TEXT NOT NULL,
            full_name       TEXT NOT NULL DEFAULT '',
            is_admin        INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL DEFAULT {NOW}
        );

        CREATE TABLE IF NOT EXISTS application_status_history (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            application_kind    TEXT NOT NULL,
            application_id      INTEGER NOT NULL,
            status              TEXT NOT NULL,
            previous_status     TEXT,
            changed_by          TEXT NOT NULL,
            changed_at          TEXT NOT NULL DEFAULT {NOW}
        );

        CREATE INDEX IF NOT EXISTS idx_status_history_application
            ON application_status_history(application_kind, application_id);

        CREATE TABLE IF NOT EXISTS chat_conversations (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id          TEXT NOT NULL UNIQUE,
            visitor_name        TEXT,
            visitor_email       TEXT,
            status              TEXT NOT NULL DEFAULT 'active'
                                CHECK (status IN ('active', 'closed')),
            created_at          TEXT NOT NULL DEFAULT {NOW},
            last_message_at     TEXT NOT NULL DEFAULT {NOW}
        );

        CREATE INDEX IF NOT EXISTS idx_chat_conversations_last_message
            ON chat_conversations(last_message_at);

        CREATE TABLE IF NOT EXISTS chat_messages (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            conversation_id     INTEGER NOT NULL REFERENCES chat_conversations(id),
            sender_type         TEXT NOT NULL CHECK (sender_type IN ('user', 'bot', 'admin')),
            sender_name         TEXT,
            message             TEXT NOT NULL,
            created_at          TEXT NOT NULL DEFAULT {NOW}
        );

        CREATE INDEX IF NOT EXISTS idx_chat_messages_conversation
            ON chat_messages(conversation_id, created_at);

        CREATE TABLE IF NOT EXISTS visitor_logs (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id      TEXT,
            page_path       TEXT NOT NULL,
            referrer        TEXT,
            user_agent      TEXT,
            ip_hash         TEXT,
            user_id         INTEGER,
            created_at      TEXT NOT NULL DEFAULT {NOW}
        );

        CREATE INDEX IF NOT EXISTS idx_visitor_logs_created
            ON visitor_logs(created_at);
        "
    ))?;

    for kind in ApplicationKind::ALL {
        conn.execute_batch(&application_table_sql(kind))?;
    }

    info!("Database migrations complete");
    Ok(())
}

/// One table per kind: shared workflow columns plus the kind's form columns.
fn application_table_sql(kind: ApplicationKind) -> String {
    let table = kind.table();
    let form_columns: String = kind
        .form_fields()
        .iter()
        .map(|f| format!("            {} TEXT,\n", f.column))
        .collect();

    format!(
        "
        CREATE TABLE IF NOT EXISTS {table} (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            user_name           TEXT NOT NULL REFERENCES users(username),
{form_columns}            status              TEXT NOT NULL DEFAULT 'pending',
            tracking_number     TEXT,
            shipping_carrier    TEXT,
            created_at          TEXT NOT NULL DEFAULT {NOW},
            updated_at          TEXT NOT NULL DEFAULT {NOW}
        );

        CREATE INDEX IF NOT EXISTS idx_{table}_user
            ON {table}(user_name, created_at);
        "
    )
}
