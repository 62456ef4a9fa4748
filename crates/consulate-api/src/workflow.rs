//! Status transitions and shipment assignment, shared by every application
//! kind.
//!
//! The workflow only talks to an [`ApplicationStore`] and a [`Notifier`], so
//! handlers, tests and background jobs all drive the same code path. A
//! transition is persisted (status + one history row) before the applicant
//! is notified; notification failures never undo or fail the transition.

use thiserror::Error;
use tracing::{info, warn};

use consulate_db::Database;
use consulate_db::models::ApplicationRow;
use consulate_types::api::{StatusChange, TrackingAssignment};
use consulate_types::events::NotificationEvent;
use consulate_types::models::{ApplicationKind, ApplicationStatus, Carrier};

use crate::error::ApiError;
use crate::notify::{Notifier, deliver};

pub const MAX_TRACKING_LEN: usize = 64;

/// The persistence capability the workflow needs.
pub trait ApplicationStore: Clone + Send + Sync + 'static {
    fn load(&self, kind: ApplicationKind, id: i64) -> anyhow::Result<Option<ApplicationRow>>;

    /// Persist a transition and its history row atomically. Returns the
    /// previous status, or `None` when the application does not exist.
    fn record_status_change(
        &self,
        kind: ApplicationKind,
        id: i64,
        status: ApplicationStatus,
        changed_by: &str,
    ) -> anyhow::Result<Option<String>>;

    fn assign_tracking(
        &self,
        kind: ApplicationKind,
        id: i64,
        tracking_number: &str,
        carrier: Option<&str>,
    ) -> anyhow::Result<bool>;
}

impl ApplicationStore for Database {
    fn load(&self, kind: ApplicationKind, id: i64) -> anyhow::Result<Option<ApplicationRow>> {
        self.get_application(kind, id)
    }

    fn record_status_change(
        &self,
        kind: ApplicationKind,
        id: i64,
        status: ApplicationStatus,
        changed_by: &str,
    ) -> anyhow::Result<Option<String>> {
        Database::record_status_change(self, kind, id, status, changed_by)
    }

    fn assign_tracking(
        &self,
        kind: ApplicationKind,
        id: i64,
        tracking_number: &str,
        carrier: Option<&str>,
    ) -> anyhow::Result<bool> {
        Database::assign_tracking(self, kind, id, tracking_number, carrier)
    }
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Invalid status '{status}' for {kind} applications")]
    InvalidStatus {
        kind: ApplicationKind,
        status: String,
    },

    #[error("{0}")]
    InvalidTracking(String),

    #[error("Application not found")]
    NotFound { kind: ApplicationKind, id: i64 },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::InvalidStatus { .. } | WorkflowError::InvalidTracking(_) => {
                ApiError::Validation(err.to_string())
            }
            WorkflowError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            WorkflowError::Store(e) => ApiError::Internal(e),
        }
    }
}

/// Move application `id` of `kind` to `requested`, recording who did it.
///
/// The status is checked against the kind's allowed set before the store is
/// touched. Any allowed status may follow any other.
pub async fn update_status<S: ApplicationStore>(
    store: &S,
    notifier: &dyn Notifier,
    kind: ApplicationKind,
    id: i64,
    requested: &str,
    actor: &str,
) -> Result<StatusChange, WorkflowError> {
    let status = requested
        .trim()
        .parse::<ApplicationStatus>()
        .ok()
        .filter(|s| kind.allows(*s))
        .ok_or_else(|| WorkflowError::InvalidStatus {
            kind,
            status: requested.to_string(),
        })?;

    let application = load(store, kind, id).await?;

    let actor = actor.to_string();
    let previous = run_store(store, move |s| s.record_status_change(kind, id, status, &actor))
        .await?
        .ok_or(WorkflowError::NotFound { kind, id })?;

    info!(
        kind = %kind,
        application_id = id,
        from = %previous,
        to = %status,
        "Application status changed"
    );

    let event = NotificationEvent::StatusChanged {
        kind,
        application_id: id,
        recipient: recipient_of(&application),
        applicant_name: application.field("fullName").map(str::to_string),
        previous_status: previous.clone(),
        status,
    };
    let notified = deliver(notifier, &event).await;

    Ok(StatusChange {
        application_id: id,
        kind,
        previous_status: previous,
        status,
        applied: true,
        notified,
    })
}

/// Attach a tracking number (and optionally a carrier) to an application.
/// Does not touch the status history.
pub async fn assign_tracking<S: ApplicationStore>(
    store: &S,
    notifier: &dyn Notifier,
    kind: ApplicationKind,
    id: i64,
    tracking_number: &str,
    carrier: Option<&str>,
) -> Result<TrackingAssignment, WorkflowError> {
    let tracking_number = tracking_number.trim().to_string();
    if tracking_number.is_empty() {
        return Err(WorkflowError::InvalidTracking(
            "Tracking number is required".into(),
        ));
    }
    if tracking_number.chars().count() > MAX_TRACKING_LEN {
        return Err(WorkflowError::InvalidTracking(format!(
            "Tracking number must be at most {MAX_TRACKING_LEN} characters"
        )));
    }

    let carrier = match carrier.map(str::trim).filter(|c| !c.is_empty()) {
        Some(raw) => Some(raw.parse::<Carrier>().map_err(|_| {
            let known: Vec<&str> = Carrier::ALL.iter().map(|c| c.as_str()).collect();
            WorkflowError::InvalidTracking(format!(
                "Shipping carrier must be one of: {}",
                known.join(", ")
            ))
        })?),
        None => None,
    };

    let application = load(store, kind, id).await?;

    let number = tracking_number.clone();
    let applied = run_store(store, move |s| {
        s.assign_tracking(kind, id, &number, carrier.map(Carrier::as_str))
    })
    .await?;
    if !applied {
        return Err(WorkflowError::NotFound { kind, id });
    }

    info!(kind = %kind, application_id = id, "Tracking number assigned");

    let event = NotificationEvent::TrackingAssigned {
        kind,
        application_id: id,
        recipient: recipient_of(&application),
        applicant_name: application.field("fullName").map(str::to_string),
        tracking_number: tracking_number.clone(),
        carrier,
    };
    let notified = deliver(notifier, &event).await;

    Ok(TrackingAssignment {
        application_id: id,
        kind,
        tracking_number,
        shipping_carrier: carrier.map(|c| c.as_str().to_string()),
        applied: true,
        notified,
    })
}

/// Applicant address: the form's email, else the owning username (which is
/// an email address too).
fn recipient_of(application: &ApplicationRow) -> String {
    application
        .field("email")
        .unwrap_or(&application.user_name)
        .to_string()
}

async fn load<S: ApplicationStore>(
    store: &S,
    kind: ApplicationKind,
    id: i64,
) -> Result<ApplicationRow, WorkflowError> {
    run_store(store, move |s| s.load(kind, id))
        .await?
        .ok_or(WorkflowError::NotFound { kind, id })
}

async fn run_store<S, F, T>(store: &S, f: F) -> Result<T, WorkflowError>
where
    S: ApplicationStore,
    F: FnOnce(&S) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || f(&store))
        .await
        .map_err(|e| {
            warn!("store task failed to complete: {}", e);
            WorkflowError::Store(anyhow::anyhow!("blocking task failed: {e}"))
        })?
        .map_err(WorkflowError::Store)
}
