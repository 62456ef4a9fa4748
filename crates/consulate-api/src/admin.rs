use axum::{Json, extract::State};

use consulate_types::api::{DashboardResponse, KindSummary};
use consulate_types::models::ApplicationKind;

use crate::error::ApiError;
use crate::state::AppState;
use crate::visitors::start_of_today;

/// Headline counters for the admin landing page.
pub async fn dashboard(State(state): State<AppState>) -> Result<Json<DashboardResponse>, ApiError> {
    let since = start_of_today();

    let dashboard = state
        .with_db(move |db| {
            let mut applications = Vec::with_capacity(ApplicationKind::ALL.len());
            for kind in ApplicationKind::ALL {
                let by_status: std::collections::BTreeMap<String, i64> =
                    db.count_by_status(kind)?.into_iter().collect();
                applications.push(KindSummary {
                    kind,
                    total: by_status.values().sum(),
                    by_status,
                });
            }

            Ok(DashboardResponse {
                applications,
                total_users: db.count_users()?,
                active_chats: db.count_active_conversations()?,
                views_today: db.visitor_totals(&since, 0)?.views_since,
            })
        })
        .await?;

    Ok(Json(dashboard))
}
