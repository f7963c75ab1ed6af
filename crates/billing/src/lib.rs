#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Orbit Billing Module
//!
//! Reconciles subscription and trial state against payment-provider
//! webhooks. Delivery is at-least-once and unordered by contract, so the
//! processor verifies signatures over the raw body, deduplicates by event
//! id, drops events older than the last applied timestamp, and applies
//! state transitions in the same transaction as the applied-event marker.
//!
//! Also hosts the notification-dismissal policy (24h TTL behind a key-value
//! interface) because its clock handling is part of the same design.

pub mod dismissals;
pub mod error;
pub mod events;
pub mod subscriptions;
pub mod webhooks;


pub use dismissals::{DismissalStore, KvStore, MemoryKv, DISMISSAL_TTL};
pub use error::{BillingError, BillingResult};
pub use events::{EventKind, WebhookEvent};
pub use subscriptions::{apply_event, trial_status, Applied, SubscriptionService, TrialStatus};
pub use webhooks::{DispatchOutcome, WebhookProcessor, SIGNATURE_TOLERANCE};
