//! HTTP error mapping.
//!
//! Invite action failures are values (`{"success": false, ...}` with HTTP
//! 200) and never pass through here; this type covers the webhook trust
//! boundary, authentication headers, and transient store failures.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use orbit_billing::BillingError;

#[derive(Debug)]
pub enum ApiError {
    /// Missing or malformed identity headers from the upstream auth layer.
    Unauthenticated,
    /// Malformed request input (bad path parameter, bad JSON).
    BadRequest(String),
    /// Webhook signature rejected. 4xx so the provider does not redeliver.
    SignatureInvalid,
    /// Verified but unparseable webhook body.
    MalformedWebhook(String),
    /// Server-side misconfiguration or transient store failure. 5xx so the
    /// caller (or the provider's redelivery) retries.
    Internal,
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::SignatureInvalid => ApiError::SignatureInvalid,
            BillingError::Malformed(details) => ApiError::MalformedWebhook(details),
            BillingError::Configuration => {
                tracing::error!("webhook secret not configured");
                ApiError::Internal
            }
            BillingError::Store(e) => {
                tracing::error!(error = %e, "store failure during webhook processing");
                ApiError::Internal
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                json!({"error": "unauthenticated"}),
            ),
            ApiError::BadRequest(details) => (
                StatusCode::BAD_REQUEST,
                json!({"error": "bad request", "details": details}),
            ),
            ApiError::SignatureInvalid => (
                StatusCode::BAD_REQUEST,
                json!({"error": "invalid signature"}),
            ),
            ApiError::MalformedWebhook(details) => (
                StatusCode::BAD_REQUEST,
                json!({"error": "malformed payload", "details": details}),
            ),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": "internal error"}),
            ),
        };
        (status, Json(body)).into_response()
    }
}
