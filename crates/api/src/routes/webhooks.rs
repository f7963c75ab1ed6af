//! Billing webhook intake.
//!
//! The body is taken as raw bytes; verification must run over exactly what
//! the provider signed. Every acknowledged outcome (applied, duplicate,
//! stale, unknown kind, unknown org, no transition) answers 200 so the
//! provider does not redeliver; only transient failures answer 5xx.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::json;

use orbit_billing::DispatchOutcome;
use orbit_shared::SubscriptionStatus;

use crate::error::ApiError;
use crate::state::AppState;

pub const SIGNATURE_HEADER: &str = "orbit-signature";

pub async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let outcome = state.webhooks.process(&body, signature).await?;

    // Trial converted to a paid subscription: raise the one-shot success
    // flag and clear any stale trial dismissals that would suppress it.
    if let DispatchOutcome::Applied {
        org_id,
        status: SubscriptionStatus::Active,
        previous: Some(SubscriptionStatus::Trialing),
    } = outcome
    {
        state.dismissals.raise_conversion_success(org_id);
    }

    Ok(Json(json!({"received": true})))
}
