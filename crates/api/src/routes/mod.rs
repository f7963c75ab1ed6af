//! Route table and shared extractors.

pub mod billing;
pub mod invites;
pub mod notifications;
pub mod webhooks;


use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::json;
use uuid::Uuid;

use orbit_invites::{Caller, Identity};
use orbit_shared::OrgRole;

use crate::error::ApiError;
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhooks/billing", post(webhooks::receive))
        .route("/api/orgs/{org_id}/invites", post(invites::create))
        .route(
            "/api/orgs/{org_id}/invites/{invite_id}/resend",
            post(invites::resend),
        )
        .route(
            "/api/orgs/{org_id}/invites/{invite_id}",
            delete(invites::remove),
        )
        .route("/api/invites/{invite_id}/accept", post(invites::accept))
        .route("/api/invites/pending", get(invites::pending))
        .route("/api/orgs/{org_id}/billing/trial", get(billing::trial))
        .route(
            "/api/orgs/{org_id}/billing/register",
            post(billing::register),
        )
        .route(
            "/api/orgs/{org_id}/notifications",
            get(notifications::list),
        )
        .route(
            "/api/orgs/{org_id}/notifications/{kind}/dismiss",
            post(notifications::dismiss),
        )
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "sweep_interval_secs": state.config.sweep_interval_secs,
    }))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, ApiError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthenticated)
}

/// Authenticated principal, as stamped onto the request by the upstream
/// auth layer. Authentication itself is outside this service.
pub(crate) fn identity_from_headers(headers: &HeaderMap) -> Result<Identity, ApiError> {
    let user_id = header_str(headers, "x-user-id")?
        .parse::<Uuid>()
        .map_err(|_| ApiError::Unauthenticated)?;
    let email = header_str(headers, "x-user-email")?.to_string();
    Ok(Identity { user_id, email })
}

/// Identity plus the caller's role within the organization in the path.
pub(crate) fn caller_from_headers(
    headers: &HeaderMap,
    org_id: Uuid,
) -> Result<Caller, ApiError> {
    let identity = identity_from_headers(headers)?;
    let role = match header_str(headers, "x-org-role")? {
        "owner" => OrgRole::Owner,
        "admin" => OrgRole::Admin,
        "member" => OrgRole::Member,
        _ => return Err(ApiError::Unauthenticated),
    };
    Ok(Caller {
        user_id: identity.user_id,
        email: identity.email,
        org_id,
        role,
    })
}
