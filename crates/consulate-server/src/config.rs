use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use anyhow::{Context, Result, anyhow};
use tracing::{info, warn};

/// Signing secrets that must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &["dev-secret-change-me", "change-me-to-a-random-string"];

/// Accepted range for `JWT_EXPIRES_DAYS`.
const TOKEN_DAYS: std::ops::RangeInclusive<i64> = 1..=365;

pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub db_pool_size: usize,
    pub jwt_secret: String,
    pub jwt_expires_days: i64,
    pub frontend_url: String,
    pub email_api_url: String,
    pub email_api_key: Option<String>,
    pub email_from: String,
    pub contact_email: String,
    pub admin_emails: Vec<String>,
    /// Administrator created at startup when both are set.
    pub seed_admin: Option<(String, String)>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let jwt_secret: String = try_load("JWT_SECRET", "dev-secret-change-me")?;
        if PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            warn!("JWT_SECRET is a placeholder; set a random secret before deploying");
        }

        let db_pool_size: usize = try_load("CONSULATE_DB_POOL_SIZE", "10")?;
        if db_pool_size == 0 {
            return Err(anyhow!("CONSULATE_DB_POOL_SIZE must be at least 1"));
        }

        let jwt_expires_days: i64 = try_load("JWT_EXPIRES_DAYS", "7")?;
        check_token_days(jwt_expires_days)?;

        let admin_emails = optional("ADMIN_EMAILS")
            .map(|raw| {
                raw.split(',')
                    .map(|e| e.trim().to_ascii_lowercase())
                    .filter(|e| !e.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let seed_admin = match (optional("ADMIN_EMAIL"), optional("ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some((email, password)),
            (Some(_), None) | (None, Some(_)) => {
                warn!("ADMIN_EMAIL and ADMIN_PASSWORD must both be set to seed an administrator");
                None
            }
            (None, None) => None,
        };

        Ok(Self {
            host: try_load("CONSULATE_HOST", "0.0.0.0")?,
            port: try_load("CONSULATE_PORT", "5000")?,
            db_path: try_load("CONSULATE_DB_PATH", "consulate.db")?,
            db_pool_size,
            jwt_secret,
            jwt_expires_days,
            frontend_url: try_load("FRONTEND_URL", "http://localhost:3000")?,
            email_api_url: try_load("EMAIL_API_URL", "https://api.resend.com/emails")?,
            email_api_key: optional("EMAIL_API_KEY"),
            email_from: try_load("EMAIL_FROM", "Consulate <no-reply@consulate.local>")?,
            contact_email: try_load("CONTACT_EMAIL", "contact@consulate.local")?,
            admin_emails,
            seed_admin,
        })
    }
}

fn check_token_days(days: i64) -> Result<()> {
    if TOKEN_DAYS.contains(&days) {
        Ok(())
    } else {
        Err(anyhow!(
            "JWT_EXPIRES_DAYS must be between {} and {}, got {days}",
            TOKEN_DAYS.start(),
            TOKEN_DAYS.end()
        ))
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    optional(key)
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| anyhow!("{e}"))
        .with_context(|| format!("invalid {key} value"))
}
