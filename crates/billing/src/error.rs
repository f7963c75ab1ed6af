//! Billing error taxonomy.

use orbit_shared::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    /// Signature header missing, malformed, stale, or not matching the raw
    /// body. Fails closed; the provider will not be asked to retry.
    #[error("webhook signature invalid")]
    SignatureInvalid,

    /// No webhook secret configured. A server misconfiguration, never a
    /// client error, and surfaced as such.
    #[error("webhook secret not configured")]
    Configuration,

    /// Verified body that does not parse into an event.
    #[error("malformed webhook payload: {0}")]
    Malformed(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type BillingResult<T> = Result<T, BillingError>;
