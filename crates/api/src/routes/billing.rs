//! Billing projections.

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use orbit_shared::Gateway;

use crate::error::ApiError;
use crate::state::AppState;

/// Derived trial projection for an organization. Computed at query time
/// from the stored subscription row.
pub async fn trial(
    State(state): State<AppState>,
    Path(org_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let status = state
        .subscriptions
        .trial_status(org_id)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(json!({
        "is_in_trial": status.is_in_trial,
        "has_used_trial": status.has_used_trial,
        "days_remaining": status.days_remaining,
    })))
}

#[derive(Debug, Deserialize)]
pub struct RegisterBillingRequest {
    pub billing_ref: String,
}

/// Bind a payment-provider customer ref to an organization so incoming
/// webhook events can be resolved. Called during provisioning.
pub async fn register(
    State(state): State<AppState>,
    Path(org_id): Path<Uuid>,
    Json(req): Json<RegisterBillingRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let billing_ref = req.billing_ref.trim();
    if billing_ref.is_empty() {
        return Err(ApiError::BadRequest("billing_ref must not be empty".into()));
    }
    state
        .gateway
        .register_org(org_id, billing_ref)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, org_id = %org_id, "failed to register billing ref");
            ApiError::Internal
        })?;
    Ok(Json(json!({"registered": true})))
}
