use std::sync::Arc;

use consulate_db::Database;

use crate::error::{ApiError, blocking};
use crate::notify::Notifier;

pub type AppState = Arc<AppStateInner>;

/// Process-wide state, built once by the entry point and shared by every
/// handler. Nothing in here is mutated after startup.
pub struct AppStateInner {
    pub db: Database,
    pub notifier: Arc<dyn Notifier>,
    pub auth: AuthSettings,
    /// Recipient of contact-form messages.
    pub contact_email: String,
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub token_ttl_days: i64,
    /// Usernames that receive the administrator role at signup. Lowercase.
    pub admin_emails: Vec<String>,
}

impl AuthSettings {
    pub fn is_admin_email(&self, username: &str) -> bool {
        self.admin_emails.iter().any(|e| e.eq_ignore_ascii_case(username))
    }
}

impl AppStateInner {
    /// Run `f` against the store on the blocking pool.
    pub async fn with_db<F, T>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        blocking(move || f(&db)).await
    }
}
