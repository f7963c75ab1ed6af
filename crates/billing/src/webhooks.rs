//! Webhook intake: signature verification and idempotent dispatch.
//!
//! Verification runs over the raw request bytes. Any re-serialization of
//! the body would change the bytes and break the signature, so parsing
//! happens strictly after the HMAC check passes.
//!
//! Dispatch runs in a single transaction: the applied-event marker and the
//! subscription row commit together or not at all. The ledger is checked
//! inside the same transaction, so concurrent redeliveries of one event id
//! resolve to exactly one application.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};
use uuid::Uuid;

use orbit_shared::{Clock, Gateway, SubscriptionStatus};

use crate::error::{BillingError, BillingResult};
use crate::events::{EventKind, WebhookEvent};
use crate::subscriptions::{apply_event, Applied};

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a signature timestamp before the delivery is refused.
/// Bounds the replay window for a captured request.
pub const SIGNATURE_TOLERANCE: Duration = Duration::minutes(5);

/// How a verified event was resolved. Every variant except a store error
/// is an acknowledgment; the provider must not redeliver any of these.
#[derive(Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Transition applied (or initial record created). Carries the prior
    /// status so callers can react to specific edges (trial conversion).
    Applied {
        org_id: Uuid,
        status: SubscriptionStatus,
        previous: Option<SubscriptionStatus>,
    },
    /// Event id already in the applied ledger.
    Duplicate,
    /// Timestamp at or before the last applied event for the organization.
    /// Marked in the ledger so a redelivery short-circuits as Duplicate.
    Stale,
    /// Event kind we do not handle. Acknowledged, never retried.
    UnknownKind,
    /// Customer ref resolves to no known organization. Acknowledged and
    /// logged loudly; retrying would not help until the org is registered.
    UnknownOrg,
    /// Known kind, known org, but no edge in the transition table.
    NoTransition,
}

/// Verifies and applies billing webhooks.
pub struct WebhookProcessor<G> {
    gateway: Arc<G>,
    clock: Arc<dyn Clock>,
    secret: String,
    trial_length: Duration,
}

impl<G: Gateway> WebhookProcessor<G> {
    pub fn new(
        gateway: Arc<G>,
        clock: Arc<dyn Clock>,
        secret: &str,
        trial_length: Duration,
    ) -> Self {
        Self {
            gateway,
            clock,
            // Secrets pasted into env files pick up stray whitespace.
            secret: secret.trim().to_string(),
            trial_length,
        }
    }

    /// Verify the signature header against the raw body, then parse.
    ///
    /// Header format: `t=<unix seconds>,v1=<hex hmac>`. The MAC covers
    /// `"{t}.{raw body}"` so the timestamp cannot be swapped onto an old
    /// payload. Comparison is constant-time via [`Mac::verify_slice`].
    pub fn verify_and_parse(
        &self,
        raw_body: &[u8],
        signature_header: Option<&str>,
    ) -> BillingResult<WebhookEvent> {
        if self.secret.is_empty() {
            return Err(BillingError::Configuration);
        }
        let header = signature_header.ok_or(BillingError::SignatureInvalid)?;

        let (timestamp, signature) = parse_signature_header(header)?;

        let age = self.clock.now() - OffsetDateTime::from_unix_timestamp(timestamp)
            .map_err(|_| BillingError::SignatureInvalid)?;
        if age > SIGNATURE_TOLERANCE || age < -SIGNATURE_TOLERANCE {
            warn!(age_secs = age.whole_seconds(), "webhook signature timestamp outside tolerance");
            return Err(BillingError::SignatureInvalid);
        }

        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| BillingError::Configuration)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(raw_body);
        mac.verify_slice(&signature)
            .map_err(|_| BillingError::SignatureInvalid)?;

        WebhookEvent::from_json(raw_body)
    }

    /// Apply a verified event. One transaction covers the ledger check, the
    /// staleness check, the state transition and the applied marker.
    pub async fn dispatch(&self, event: WebhookEvent) -> BillingResult<DispatchOutcome> {
        let trial_length = self.trial_length;
        let now = self.clock.now();

        let outcome = self
            .gateway
            .run_in_transaction(move |tx| -> BillingResult<DispatchOutcome> {
                if tx.event_applied(&event.id) {
                    return Ok(DispatchOutcome::Duplicate);
                }
                if let EventKind::Unknown(kind) = &event.kind {
                    // Deliberately not marked applied: if we start handling
                    // this kind later, a redelivery should go through.
                    info!(event_id = %event.id, kind = %kind, "ignoring unknown webhook kind");
                    return Ok(DispatchOutcome::UnknownKind);
                }
                let Some(org_id) = tx.org_by_billing_ref(&event.org_ref) else {
                    warn!(
                        event_id = %event.id,
                        customer_ref = %event.org_ref,
                        "webhook customer ref resolves to no organization"
                    );
                    return Ok(DispatchOutcome::UnknownOrg);
                };

                let existing = tx.subscription(org_id);
                let previous = existing.as_ref().map(|s| s.status);
                if let Some(last) = existing.as_ref().and_then(|s| s.last_applied_event_at) {
                    if event.timestamp <= last {
                        info!(
                            event_id = %event.id,
                            org_id = %org_id,
                            "dropping stale webhook event"
                        );
                        tx.mark_event_applied(&event.id, org_id, now);
                        return Ok(DispatchOutcome::Stale);
                    }
                }

                match apply_event(existing, &event, org_id, trial_length) {
                    Applied::Created(mut sub) | Applied::Updated(mut sub) => {
                        sub.last_applied_event_id = Some(event.id.clone());
                        sub.last_applied_event_at = Some(event.timestamp);
                        let status = sub.status;
                        tx.put_subscription(sub);
                        tx.mark_event_applied(&event.id, org_id, now);
                        Ok(DispatchOutcome::Applied {
                            org_id,
                            status,
                            previous,
                        })
                    }
                    Applied::NoTransition(reason) => {
                        info!(
                            event_id = %event.id,
                            org_id = %org_id,
                            kind = %event.kind,
                            reason,
                            "webhook event produced no transition"
                        );
                        tx.mark_event_applied(&event.id, org_id, now);
                        Ok(DispatchOutcome::NoTransition)
                    }
                }
            })
            .await?;

        if let DispatchOutcome::Applied { org_id, status, .. } = &outcome {
            info!(org_id = %org_id, status = ?status, "subscription state applied");
        }
        Ok(outcome)
    }

    /// Full intake path for the HTTP handler.
    pub async fn process(
        &self,
        raw_body: &[u8],
        signature_header: Option<&str>,
    ) -> BillingResult<DispatchOutcome> {
        let event = self.verify_and_parse(raw_body, signature_header)?;
        self.dispatch(event).await
    }
}

fn parse_signature_header(header: &str) -> BillingResult<(i64, Vec<u8>)> {
    let mut timestamp = None;
    let mut signature = None;
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => timestamp = v.parse::<i64>().ok(),
            Some(("v1", v)) => signature = hex::decode(v).ok(),
            _ => {}
        }
    }
    match (timestamp, signature) {
        (Some(t), Some(s)) => Ok((t, s)),
        _ => Err(BillingError::SignatureInvalid),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orbit_shared::{ManualClock, MemoryGateway};

    const SECRET: &str = "whsec_test_secret";

    fn sign(secret: &str, timestamp: i64, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        let sig = hex::encode(mac.finalize().into_bytes());
        format!("t={timestamp},v1={sig}")
    }

    fn processor(secret: &str) -> (WebhookProcessor<MemoryGateway>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_epoch());
        let gateway = Arc::new(MemoryGateway::new());
        let processor = WebhookProcessor::new(
            gateway,
            clock.clone(),
            secret,
            Duration::days(14),
        );
        (processor, clock)
    }

    fn body(id: &str, kind: &str, created: i64) -> Vec<u8> {
        format!(
            r#"{{"id":"{id}","type":"{kind}","customer":"cus_1","created":{created}}}"#
        )
        .into_bytes()
    }

    // === Signature verification ===

    #[test]
    fn accepts_valid_signature() {
        let (processor, clock) = processor(SECRET);
        let now = clock.now().unix_timestamp();
        let raw = body("evt_1", "trial.started", now);
        let header = sign(SECRET, now, &raw);
        let event = processor.verify_and_parse(&raw, Some(&header)).unwrap();
        assert_eq!(event.id, "evt_1");
    }

    #[test]
    fn rejects_missing_header() {
        let (processor, clock) = processor(SECRET);
        let raw = body("evt_1", "trial.started", clock.now().unix_timestamp());
        assert!(matches!(
            processor.verify_and_parse(&raw, None),
            Err(BillingError::SignatureInvalid)
        ));
    }

    #[test]
    fn rejects_tampered_body() {
        let (processor, clock) = processor(SECRET);
        let now = clock.now().unix_timestamp();
        let raw = body("evt_1", "trial.started", now);
        let header = sign(SECRET, now, &raw);
        let tampered = body("evt_1", "payment.succeeded", now);
        assert!(matches!(
            processor.verify_and_parse(&tampered, Some(&header)),
            Err(BillingError::SignatureInvalid)
        ));
    }

    #[test]
    fn rejects_wrong_secret() {
        let (processor, clock) = processor(SECRET);
        let now = clock.now().unix_timestamp();
        let raw = body("evt_1", "trial.started", now);
        let header = sign("whsec_other", now, &raw);
        assert!(matches!(
            processor.verify_and_parse(&raw, Some(&header)),
            Err(BillingError::SignatureInvalid)
        ));
    }

    #[test]
    fn rejects_stale_timestamp() {
        let (processor, clock) = processor(SECRET);
        let signed_at = clock.now().unix_timestamp();
        let raw = body("evt_1", "trial.started", signed_at);
        let header = sign(SECRET, signed_at, &raw);
        clock.advance(Duration::minutes(6));
        assert!(matches!(
            processor.verify_and_parse(&raw, Some(&header)),
            Err(BillingError::SignatureInvalid)
        ));
    }

    #[test]
    fn rejects_timestamp_from_the_future() {
        let (processor, clock) = processor(SECRET);
        let future = clock.now().unix_timestamp() + 600;
        let raw = body("evt_1", "trial.started", future);
        let header = sign(SECRET, future, &raw);
        assert!(matches!(
            processor.verify_and_parse(&raw, Some(&header)),
            Err(BillingError::SignatureInvalid)
        ));
    }

    #[test]
    fn empty_secret_is_a_configuration_error() {
        let (processor, clock) = processor("");
        let now = clock.now().unix_timestamp();
        let raw = body("evt_1", "trial.started", now);
        let header = sign("anything", now, &raw);
        assert!(matches!(
            processor.verify_and_parse(&raw, Some(&header)),
            Err(BillingError::Configuration)
        ));
    }

    #[test]
    fn secret_whitespace_is_trimmed() {
        let (processor, clock) = processor("  whsec_padded \n");
        let now = clock.now().unix_timestamp();
        let raw = body("evt_1", "trial.started", now);
        let header = sign("whsec_padded", now, &raw);
        assert!(processor.verify_and_parse(&raw, Some(&header)).is_ok());
    }

    #[test]
    fn rejects_garbage_headers() {
        let (processor, clock) = processor(SECRET);
        let raw = body("evt_1", "trial.started", clock.now().unix_timestamp());
        for header in ["", "t=,v1=", "v1=deadbeef", "t=123", "t=abc,v1=zz"] {
            assert!(
                matches!(
                    processor.verify_and_parse(&raw, Some(header)),
                    Err(BillingError::SignatureInvalid)
                ),
                "header {header:?} should be rejected"
            );
        }
    }
}
