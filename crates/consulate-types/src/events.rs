use serde::{Deserialize, Serialize};

use crate::models::{ApplicationKind, ApplicationStatus, Carrier};

/// Outbound notifications. The API crate renders each one into an email;
/// delivery is best-effort and never affects the triggering operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum NotificationEvent {
    /// An administrator moved an application to a new status
    StatusChanged {
        kind: ApplicationKind,
        application_id: i64,
        recipient: String,
        applicant_name: Option<String>,
        previous_status: String,
        status: ApplicationStatus,
    },

    /// A shipment was attached to an application
    TrackingAssigned {
        kind: ApplicationKind,
        application_id: i64,
        recipient: String,
        applicant_name: Option<String>,
        tracking_number: String,
        carrier: Option<Carrier>,
    },

    /// A visitor used the contact form
    ContactMessage {
        recipient: String,
        name: String,
        reply_to: String,
        subject: String,
        message: String,
    },
}

impl NotificationEvent {
    /// Address the notification is delivered to.
    pub fn recipient(&self) -> &str {
        match self {
            Self::StatusChanged { recipient, .. } => recipient,
            Self::TrackingAssigned { recipient, .. } => recipient,
            Self::ContactMessage { recipient, .. } => recipient,
        }
    }

    /// Application the notification concerns, if any.
    pub fn application(&self) -> Option<(ApplicationKind, i64)> {
        match self {
            Self::StatusChanged {
                kind,
                application_id,
                ..
            }
            | Self::TrackingAssigned {
                kind,
                application_id,
                ..
            } => Some((*kind, *application_id)),
            Self::ContactMessage { .. } => None,
        }
    }
}
