//! Subscription state machine and trial projection.
//!
//! State transitions are a pure function of (current status, event kind);
//! the webhook processor owns durability and idempotency around them.

use std::sync::Arc;

use serde::Serialize;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use orbit_shared::{Clock, Gateway, Subscription, SubscriptionStatus};

use crate::error::BillingResult;
use crate::events::{EventKind, WebhookEvent};

/// Default trial length for a newly engaged organization.
pub const DEFAULT_TRIAL_LENGTH: Duration = Duration::days(14);

/// Result of applying a verified, non-duplicate event to an organization's
/// subscription state.
#[derive(Debug)]
pub enum Applied {
    /// First billing event for the organization: record created in TRIALING.
    Created(Subscription),
    /// Transition taken.
    Updated(Subscription),
    /// No edge in the transition table for this (status, kind) pair.
    NoTransition(&'static str),
}

/// The transition table. `None` means the table defines no edge and the
/// event is a logged no-op.
fn transition(current: SubscriptionStatus, kind: &EventKind) -> Option<SubscriptionStatus> {
    use EventKind::*;
    use SubscriptionStatus::*;
    match (current, kind) {
        (Trialing, TrialWillEnd | PaymentSucceeded) => Some(Active),
        (Trialing, TrialEnded) => Some(Canceled),
        // A charge can fail during the trial (card on file declined when the
        // provider attempts the first invoice), so Trialing dunning is real.
        (Trialing | Active, PaymentFailed) => Some(PastDue),
        (PastDue, PaymentSucceeded) => Some(Active),
        (Active | PastDue, SubscriptionCanceled) => Some(Canceled),
        _ => None,
    }
}

/// Apply an event to the current subscription state (or to its absence).
/// Pure; idempotency and ordering are enforced by the caller before this
/// point.
pub fn apply_event(
    existing: Option<Subscription>,
    event: &WebhookEvent,
    org_id: Uuid,
    trial_length: Duration,
) -> Applied {
    match existing {
        None => {
            if event.kind == EventKind::TrialStarted {
                Applied::Created(Subscription {
                    org_id,
                    external_customer_ref: event.org_ref.clone(),
                    external_subscription_ref: event.subscription_ref.clone(),
                    status: SubscriptionStatus::Trialing,
                    trial_ends_at: Some(event.timestamp + trial_length),
                    last_applied_event_id: None,
                    last_applied_event_at: None,
                })
            } else {
                Applied::NoTransition("no subscription record for organization")
            }
        }
        Some(mut sub) => match transition(sub.status, &event.kind) {
            Some(next) => {
                if sub.status == SubscriptionStatus::Trialing
                    && next == SubscriptionStatus::Active
                {
                    sub.trial_ends_at = None;
                }
                sub.status = next;
                if let Some(sub_ref) = &event.subscription_ref {
                    sub.external_subscription_ref = Some(sub_ref.clone());
                }
                Applied::Updated(sub)
            }
            None => Applied::NoTransition("no edge for (status, event kind)"),
        },
    }
}

/// Derived read-only trial projection. Computed at query time, never
/// stored, so stored and derived state cannot drift.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TrialStatus {
    pub is_in_trial: bool,
    /// Every subscription record is created by trial start, so a record
    /// existing at all means the organization has used its trial.
    pub has_used_trial: bool,
    /// Ceiling days until trial end; zero outside a trial.
    pub days_remaining: i64,
}

pub fn trial_status(sub: Option<&Subscription>, now: OffsetDateTime) -> TrialStatus {
    let Some(sub) = sub else {
        return TrialStatus {
            is_in_trial: false,
            has_used_trial: false,
            days_remaining: 0,
        };
    };
    let remaining_secs = sub
        .trial_ends_at
        .map(|ends| (ends - now).whole_seconds())
        .unwrap_or(0);
    let is_in_trial = sub.status == SubscriptionStatus::Trialing && remaining_secs > 0;
    TrialStatus {
        is_in_trial,
        has_used_trial: true,
        days_remaining: if is_in_trial {
            (remaining_secs + 86_399) / 86_400
        } else {
            0
        },
    }
}

/// Read-side service over subscription state.
pub struct SubscriptionService<G> {
    gateway: Arc<G>,
    clock: Arc<dyn Clock>,
}

impl<G: Gateway> SubscriptionService<G> {
    pub fn new(gateway: Arc<G>, clock: Arc<dyn Clock>) -> Self {
        Self { gateway, clock }
    }

    pub async fn trial_status(&self, org_id: Uuid) -> BillingResult<TrialStatus> {
        let sub = self.gateway.find_subscription(org_id).await?;
        Ok(trial_status(sub.as_ref(), self.clock.now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn event(kind: &str, ts: i64) -> WebhookEvent {
        WebhookEvent {
            id: format!("evt_{kind}_{ts}"),
            kind: EventKind::parse(kind),
            org_ref: "cus_1".into(),
            subscription_ref: None,
            timestamp: OffsetDateTime::from_unix_timestamp(ts).unwrap(),
            payload: Value::Null,
        }
    }

    fn sub(status: SubscriptionStatus, trial_ends_at: Option<OffsetDateTime>) -> Subscription {
        Subscription {
            org_id: Uuid::new_v4(),
            external_customer_ref: "cus_1".into(),
            external_subscription_ref: None,
            status,
            trial_ends_at,
            last_applied_event_id: None,
            last_applied_event_at: None,
        }
    }

    #[test]
    fn transition_table_matches_design() {
        use EventKind::*;
        use SubscriptionStatus::*;
        assert_eq!(transition(Trialing, &TrialWillEnd), Some(Active));
        assert_eq!(transition(Trialing, &PaymentSucceeded), Some(Active));
        assert_eq!(transition(Trialing, &TrialEnded), Some(Canceled));
        assert_eq!(transition(Trialing, &PaymentFailed), Some(PastDue));
        assert_eq!(transition(Active, &PaymentFailed), Some(PastDue));
        assert_eq!(transition(PastDue, &PaymentSucceeded), Some(Active));
        assert_eq!(transition(PastDue, &SubscriptionCanceled), Some(Canceled));
        assert_eq!(transition(Active, &SubscriptionCanceled), Some(Canceled));
        // No edges out of terminal state.
        assert_eq!(transition(Canceled, &PaymentSucceeded), None);
        assert_eq!(transition(Canceled, &TrialStarted), None);
        // Undefined pairs stay put.
        assert_eq!(transition(Active, &PaymentSucceeded), None);
        assert_eq!(transition(PastDue, &PaymentFailed), None);
    }

    #[test]
    fn trial_start_creates_trialing_record() {
        let e = event("trial.started", 1_700_000_000);
        let org = Uuid::new_v4();
        match apply_event(None, &e, org, DEFAULT_TRIAL_LENGTH) {
            Applied::Created(sub) => {
                assert_eq!(sub.org_id, org);
                assert_eq!(sub.status, SubscriptionStatus::Trialing);
                assert_eq!(sub.trial_ends_at, Some(e.timestamp + Duration::days(14)));
                assert_eq!(sub.external_customer_ref, "cus_1");
            }
            other => panic!("expected Created, got {other:?}"),
        }
    }

    #[test]
    fn non_trial_event_without_record_is_a_no_op() {
        let e = event("payment.failed", 1_700_000_000);
        assert!(matches!(
            apply_event(None, &e, Uuid::new_v4(), DEFAULT_TRIAL_LENGTH),
            Applied::NoTransition(_)
        ));
    }

    #[test]
    fn activation_clears_trial_end() {
        let ends = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let existing = sub(SubscriptionStatus::Trialing, Some(ends));
        let e = event("payment.succeeded", 1_699_999_000);
        match apply_event(Some(existing), &e, Uuid::new_v4(), DEFAULT_TRIAL_LENGTH) {
            Applied::Updated(updated) => {
                assert_eq!(updated.status, SubscriptionStatus::Active);
                assert_eq!(updated.trial_ends_at, None);
            }
            other => panic!("expected Updated, got {other:?}"),
        }
    }

    #[test]
    fn trial_started_replay_on_existing_record_does_not_regress() {
        let existing = sub(SubscriptionStatus::PastDue, None);
        let e = event("trial.started", 1_700_000_000);
        assert!(matches!(
            apply_event(Some(existing), &e, Uuid::new_v4(), DEFAULT_TRIAL_LENGTH),
            Applied::NoTransition(_)
        ));
    }

    #[test]
    fn trial_status_without_record() {
        let now = OffsetDateTime::UNIX_EPOCH;
        let status = trial_status(None, now);
        assert!(!status.is_in_trial);
        assert!(!status.has_used_trial);
        assert_eq!(status.days_remaining, 0);
    }

    #[test]
    fn trial_status_days_remaining_rounds_up() {
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let s = sub(
            SubscriptionStatus::Trialing,
            Some(now + Duration::days(13) + Duration::hours(12)),
        );
        let status = trial_status(Some(&s), now);
        assert!(status.is_in_trial);
        assert!(status.has_used_trial);
        assert_eq!(status.days_remaining, 14, "13.5 days left reads as 14");
    }

    #[test]
    fn trial_status_after_activation() {
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let s = sub(SubscriptionStatus::Active, None);
        let status = trial_status(Some(&s), now);
        assert!(!status.is_in_trial);
        assert!(status.has_used_trial);
        assert_eq!(status.days_remaining, 0);
    }

    #[test]
    fn trial_status_when_trial_lapsed_but_unswept() {
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let s = sub(SubscriptionStatus::Trialing, Some(now - Duration::hours(1)));
        let status = trial_status(Some(&s), now);
        assert!(!status.is_in_trial);
        assert_eq!(status.days_remaining, 0);
    }
}
