//! Declarative request validation.
//!
//! Application forms are checked against the kind's catalogue in
//! `consulate_types::forms`; other bodies use the same rule helpers. The
//! first violation rejects the whole request with a single message.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde_json::Value;

use consulate_types::api::ApplicationForm;
use consulate_types::forms::{FieldRule, FieldSpec};
use consulate_types::models::ApplicationKind;

use crate::error::ApiError;

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 128;
const MAX_EMAIL_LEN: usize = 254;

/// Validate a submitted form for `kind`. Returns the non-empty values keyed
/// by wire name, trimmed.
pub fn validate_form(
    kind: ApplicationKind,
    form: &ApplicationForm,
) -> Result<BTreeMap<&'static str, String>, ApiError> {
    let fields = kind.form_fields();

    if let Some(unknown) = form.keys().find(|k| !fields.iter().any(|f| f.key == k.as_str())) {
        return Err(ApiError::Validation(format!(
            "Unknown field '{}' for {} applications",
            unknown,
            kind.slug()
        )));
    }

    let mut values = BTreeMap::new();
    for spec in fields {
        let raw = match form.get(spec.key) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.trim()),
            Some(_) => {
                return Err(ApiError::Validation(format!("{} must be text", spec.label)));
            }
        };

        match raw.filter(|s| !s.is_empty()) {
            Some(value) => {
                check_rule(spec, value)?;
                values.insert(spec.key, value.to_string());
            }
            None if spec.required => {
                return Err(ApiError::Validation(format!("{} is required", spec.label)));
            }
            None => {}
        }
    }

    Ok(values)
}

fn check_rule(spec: &FieldSpec, value: &str) -> Result<(), ApiError> {
    let ok = match spec.rule {
        FieldRule::Text { max } => {
            if value.chars().count() > max {
                return Err(ApiError::Validation(format!(
                    "{} must be at most {} characters",
                    spec.label, max
                )));
            }
            true
        }
        FieldRule::Email => is_email(value),
        FieldRule::Date => is_date(value),
        FieldRule::Phone => is_phone(value),
        FieldRule::OneOf(options) => {
            if !options.contains(&value) {
                return Err(ApiError::Validation(format!(
                    "{} must be one of: {}",
                    spec.label,
                    options.join(", ")
                )));
            }
            true
        }
    };

    if ok {
        Ok(())
    } else {
        let expected = match spec.rule {
            FieldRule::Email => "a valid email address",
            FieldRule::Date => "a date in YYYY-MM-DD format",
            FieldRule::Phone => "a valid phone number",
            _ => "valid",
        };
        Err(ApiError::Validation(format!("{} must be {}", spec.label, expected)))
    }
}

pub fn is_email(value: &str) -> bool {
    if value.len() > MAX_EMAIL_LEN || value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

pub fn is_date(value: &str) -> bool {
    value.len() == 10 && NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
}

pub fn is_phone(value: &str) -> bool {
    let digits = value.chars().filter(char::is_ascii_digit).count();
    (7..=15).contains(&digits)
        && value.len() <= 24
        && value
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')' | '.'))
}

/// Required free text: trimmed, non-empty, at most `max` characters.
pub fn required_text(label: &str, value: &str, max: usize) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::Validation(format!("{label} is required")));
    }
    if value.chars().count() > max {
        return Err(ApiError::Validation(format!(
            "{label} must be at most {max} characters"
        )));
    }
    Ok(value.to_string())
}

/// Optional free text: blank becomes `None`.
pub fn optional_text(label: &str, value: Option<&str>, max: usize) -> Result<Option<String>, ApiError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => required_text(label, v, max).map(Some),
        None => Ok(None),
    }
}

/// Email address, normalized to lowercase.
pub fn email(label: &str, value: &str) -> Result<String, ApiError> {
    let value = value.trim().to_ascii_lowercase();
    if value.is_empty() {
        return Err(ApiError::Validation(format!("{label} is required")));
    }
    if !is_email(&value) {
        return Err(ApiError::Validation(format!(
            "{label} must be a valid email address"
        )));
    }
    Ok(value)
}

pub fn password(value: &str) -> Result<(), ApiError> {
    let len = value.chars().count();
    if len < MIN_PASSWORD_LEN {
        return Err(ApiError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if len > MAX_PASSWORD_LEN {
        return Err(ApiError::Validation(format!(
            "Password must be at most {MAX_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}
