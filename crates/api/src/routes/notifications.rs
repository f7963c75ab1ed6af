//! Notification dismissal routes.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use orbit_shared::NotificationKind;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct NotificationsResponse {
    pub dismissed: DismissedKinds,
    /// One-shot: true at most once after a trial converts to paid.
    pub show_conversion_success: bool,
}

#[derive(Debug, Serialize)]
pub struct DismissedKinds {
    pub trial_ending_soon: bool,
    pub trial_ended: bool,
    pub payment_failed: bool,
}

pub async fn list(
    State(state): State<AppState>,
    Path(org_id): Path<Uuid>,
) -> Json<NotificationsResponse> {
    let d = &state.dismissals;
    Json(NotificationsResponse {
        dismissed: DismissedKinds {
            trial_ending_soon: d.is_dismissed(org_id, NotificationKind::TrialEndingSoon),
            trial_ended: d.is_dismissed(org_id, NotificationKind::TrialEnded),
            payment_failed: d.is_dismissed(org_id, NotificationKind::PaymentFailed),
        },
        show_conversion_success: d.take_conversion_success(org_id),
    })
}

pub async fn dismiss(
    State(state): State<AppState>,
    Path((org_id, kind)): Path<(Uuid, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let kind = NotificationKind::parse(&kind)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown notification kind: {kind}")))?;
    state.dismissals.dismiss(org_id, kind);
    Ok(Json(serde_json::json!({"success": true})))
}
