use anyhow::{Context, Result, bail};
use futures_util::future::BoxFuture;
use serde::Serialize;
use tracing::{info, warn};

use consulate_types::events::NotificationEvent;

/// Outbound notification channel. Implementations deliver one event or
/// report why they could not; callers decide whether that matters.
pub trait Notifier: Send + Sync {
    fn notify<'a>(&'a self, event: &'a NotificationEvent) -> BoxFuture<'a, Result<()>>;
}

/// Deliver `event`, logging and swallowing any failure. Returns whether the
/// notification went out.
pub async fn deliver(notifier: &dyn Notifier, event: &NotificationEvent) -> bool {
    match notifier.notify(event).await {
        Ok(()) => {
            info!(recipient = event.recipient(), "Notification sent");
            true
        }
        Err(e) => {
            warn!(
                recipient = event.recipient(),
                application = ?event.application(),
                "Notification failed: {:#}",
                e
            );
            false
        }
    }
}

#[derive(Debug, Clone)]
pub struct MailerConfig {
    pub api_url: String,
    /// Delivery is disabled when unset.
    pub api_key: Option<String>,
    pub from: String,
}

/// Sends notifications through an HTTP email API (Resend-compatible JSON).
pub struct Mailer {
    client: reqwest::Client,
    config: MailerConfig,
}

#[derive(Serialize)]
struct OutgoingEmail<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
}

impl Mailer {
    pub fn new(config: MailerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("failed to build email HTTP client")?;
        if config.api_key.is_none() {
            warn!("EMAIL_API_KEY not set; notifications will be logged but not delivered");
        }
        Ok(Self { client, config })
    }

    async fn send(&self, event: &NotificationEvent) -> Result<()> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            bail!("email delivery is not configured");
        };

        let email = render(event);
        let reply_to = match event {
            NotificationEvent::ContactMessage { reply_to, .. } => Some(reply_to.as_str()),
            _ => None,
        };

        let body = OutgoingEmail {
            from: &self.config.from,
            to: [event.recipient()],
            subject: &email.subject,
            html: &email.html,
            reply_to,
        };

        self.client
            .post(&self.config.api_url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .context("email provider unreachable")?
            .error_for_status()
            .context("email provider rejected the message")?;

        Ok(())
    }
}

impl Notifier for Mailer {
    fn notify<'a>(&'a self, event: &'a NotificationEvent) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.send(event))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
}

/// Subject and HTML body for an event.
pub fn render(event: &NotificationEvent) -> RenderedEmail {
    match event {
        NotificationEvent::StatusChanged {
            kind,
            application_id,
            applicant_name,
            status,
            ..
        } => RenderedEmail {
            subject: format!("{} #{}: {}", kind.title(), application_id, status.label()),
            html: format!(
                "<p>Dear {},</p>\
                 <p>The status of your {} (reference #{}) is now <strong>{}</strong>.</p>\
                 <p>You can follow your application from your account dashboard.</p>",
                escape_html(applicant_name.as_deref().unwrap_or("applicant")),
                kind.title().to_lowercase(),
                application_id,
                status.label()
            ),
        },
        NotificationEvent::TrackingAssigned {
            kind,
            application_id,
            applicant_name,
            tracking_number,
            carrier,
            ..
        } => {
            let carrier_line = match carrier {
                Some(c) => format!(
                    "<p>Carrier: {}. Track it at <a href=\"{url}\">{url}</a>.</p>",
                    c.display_name(),
                    url = escape_html(&c.tracking_url(tracking_number)),
                ),
                None => String::new(),
            };
            RenderedEmail {
                subject: format!("{} #{} has shipped", kind.title(), application_id),
                html: format!(
                    "<p>Dear {},</p>\
                     <p>Your documents for {} #{} are on their way. \
                     Tracking number: <strong>{}</strong>.</p>{}",
                    escape_html(applicant_name.as_deref().unwrap_or("applicant")),
                    kind.title().to_lowercase(),
                    application_id,
                    escape_html(tracking_number),
                    carrier_line
                ),
            }
        }
        NotificationEvent::ContactMessage {
            name,
            reply_to,
            subject,
            message,
            ..
        } => RenderedEmail {
            subject: format!("[Contact] {subject}"),
            html: format!(
                "<p><strong>From:</strong> {} &lt;{}&gt;</p><p>{}</p>",
                escape_html(name),
                escape_html(reply_to),
                escape_html(message).replace('\n', "<br>")
            ),
        },
    }
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
