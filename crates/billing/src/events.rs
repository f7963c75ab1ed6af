//! Typed webhook events.
//!
//! The provider's wire format is a flat JSON envelope; event types arrive as
//! dotted strings. Kinds are a tagged union so dispatch is an exhaustive
//! match — a new kind forces a visible decision between handling and
//! ignoring it.

use serde::Deserialize;
use serde_json::Value;
use time::OffsetDateTime;

use crate::error::{BillingError, BillingResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    TrialStarted,
    TrialWillEnd,
    TrialEnded,
    PaymentSucceeded,
    PaymentFailed,
    SubscriptionCanceled,
    /// Acknowledged but never applied. Carries the wire string for logging.
    Unknown(String),
}

impl EventKind {
    pub fn parse(wire: &str) -> Self {
        match wire {
            "trial.started" => EventKind::TrialStarted,
            "trial.will_end" => EventKind::TrialWillEnd,
            "trial.ended" => EventKind::TrialEnded,
            "payment.succeeded" => EventKind::PaymentSucceeded,
            "payment.failed" => EventKind::PaymentFailed,
            "subscription.canceled" => EventKind::SubscriptionCanceled,
            other => EventKind::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventKind::TrialStarted => "trial.started",
            EventKind::TrialWillEnd => "trial.will_end",
            EventKind::TrialEnded => "trial.ended",
            EventKind::PaymentSucceeded => "payment.succeeded",
            EventKind::PaymentFailed => "payment.failed",
            EventKind::SubscriptionCanceled => "subscription.canceled",
            EventKind::Unknown(other) => other,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire envelope, deserialized only after signature verification.
#[derive(Debug, Deserialize)]
struct WireEvent {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    /// Payment-provider customer ref identifying the organization.
    customer: String,
    /// Unix seconds.
    created: i64,
    #[serde(default)]
    subscription: Option<String>,
    #[serde(default)]
    data: Value,
}

/// A verified billing event.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub id: String,
    pub kind: EventKind,
    pub org_ref: String,
    pub subscription_ref: Option<String>,
    pub timestamp: OffsetDateTime,
    pub payload: Value,
}

impl WebhookEvent {
    /// Parse a verified raw body.
    pub fn from_json(raw: &[u8]) -> BillingResult<Self> {
        let wire: WireEvent =
            serde_json::from_slice(raw).map_err(|e| BillingError::Malformed(e.to_string()))?;
        if wire.id.is_empty() {
            return Err(BillingError::Malformed("empty event id".into()));
        }
        if wire.customer.is_empty() {
            return Err(BillingError::Malformed("empty customer ref".into()));
        }
        let timestamp = OffsetDateTime::from_unix_timestamp(wire.created)
            .map_err(|_| BillingError::Malformed("timestamp out of range".into()))?;
        Ok(Self {
            id: wire.id,
            kind: EventKind::parse(&wire.kind),
            org_ref: wire.customer,
            subscription_ref: wire.subscription,
            timestamp,
            payload: wire.data,
        })
    }
}
