use axum::{Json, extract::State};
use tracing::info;

use consulate_types::api::{ContactRequest, NotifyResponse};
use consulate_types::events::NotificationEvent;

use crate::error::{ApiError, ApiJson};
use crate::notify::deliver;
use crate::state::AppState;
use crate::validation;

const DEFAULT_SUBJECT: &str = "Website enquiry";

/// Public contact form. Forwarded to the consulate's inbox by email; nothing
/// is stored.
pub async fn submit(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ContactRequest>,
) -> Result<Json<NotifyResponse>, ApiError> {
    let name = validation::required_text("Name", &req.name, 120)?;
    let reply_to = validation::email("Email", &req.email)?;
    let subject = validation::optional_text("Subject", req.subject.as_deref(), 200)?
        .unwrap_or_else(|| DEFAULT_SUBJECT.to_string());
    let message = validation::required_text("Message", &req.message, 5000)?;

    let event = NotificationEvent::ContactMessage {
        recipient: state.contact_email.clone(),
        name,
        reply_to,
        subject,
        message,
    };
    let notified = deliver(state.notifier.as_ref(), &event).await;

    info!(notified, "Contact form submitted");
    Ok(Json(NotifyResponse {
        success: true,
        notified,
    }))
}
