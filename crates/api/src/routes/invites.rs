//! Invite action interface.
//!
//! Every operation returns a discriminated value: `{"success": true, ...}`
//! or `{"success": false, "error": "..."}` with HTTP 200. Failures never
//! throw across this boundary; only store failures (which the caller should
//! retry) surface as 5xx.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use orbit_invites::InviteError;
use orbit_shared::InviteRole;

use crate::error::ApiError;
use crate::routes::{caller_from_headers, identity_from_headers};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateInviteRequest {
    pub email: String,
    pub role: InviteRole,
}

/// Map an invite outcome to the discriminated response shape. Store
/// failures escape as `ApiError::Internal`; everything else is a value.
fn respond<T>(
    result: Result<T, InviteError>,
    success_body: impl FnOnce(T) -> serde_json::Value,
) -> Result<Response, ApiError> {
    match result {
        Ok(value) => Ok(Json(success_body(value)).into_response()),
        Err(InviteError::Store(e)) => {
            tracing::error!(error = %e, "store failure during invite action");
            Err(ApiError::Internal)
        }
        Err(e) => Ok(Json(json!({
            "success": false,
            "error": e.user_message(),
        }))
        .into_response()),
    }
}

pub async fn create(
    State(state): State<AppState>,
    Path(org_id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<CreateInviteRequest>,
) -> Result<Response, ApiError> {
    let caller = caller_from_headers(&headers, org_id)?;
    let result = state.invites.create_invite(&caller, &req.email, req.role).await;
    respond(result, |invite_id| {
        json!({"success": true, "invite_id": invite_id})
    })
}

pub async fn resend(
    State(state): State<AppState>,
    Path((org_id, invite_id)): Path<(Uuid, Uuid)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let caller = caller_from_headers(&headers, org_id)?;
    let result = state.invites.resend_invite(&caller, invite_id).await;
    respond(result, |expires_at| {
        json!({
            "success": true,
            "expires_at": expires_at.unix_timestamp(),
        })
    })
}

pub async fn remove(
    State(state): State<AppState>,
    Path((org_id, invite_id)): Path<(Uuid, Uuid)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let caller = caller_from_headers(&headers, org_id)?;
    let result = state.invites.delete_invite(&caller, invite_id).await;
    respond(result, |()| json!({"success": true}))
}

pub async fn accept(
    State(state): State<AppState>,
    Path(invite_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let identity = identity_from_headers(&headers)?;
    let result = state.invites.accept_invite(&identity, invite_id).await;
    respond(result, |accepted| {
        json!({
            "success": true,
            "org_id": accepted.org_id,
            "role": accepted.role,
        })
    })
}

pub async fn pending(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let identity = identity_from_headers(&headers)?;
    let email = identity.email.clone();
    let result = state.invites.list_pending_for_user(&identity, &email).await;
    let poll_interval_secs = state.config.poll_interval_secs;
    let poll_jitter_secs = state.config.poll_jitter_secs;
    respond(result, move |invites| {
        json!({
            "success": true,
            "invites": invites,
            "poll_interval_secs": poll_interval_secs,
            "poll_jitter_secs": poll_jitter_secs,
        })
    })
}
