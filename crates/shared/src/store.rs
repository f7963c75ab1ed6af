//! Data store gateway.
//!
//! The gateway is the sole serialization point for durable state. Mutations
//! happen inside [`Gateway::run_in_transaction`]: the closure sees a
//! [`StoreTx`] view and every write commits or rolls back as a unit, so
//! partial application (membership created but invite left PENDING, a
//! subscription row updated without its event marker) is never observable.
//!
//! Conditional primitives (`set_invite_status_if`, `expire_pending_before`,
//! the applied-event ledger) are the concurrency guards: callers key
//! mutations on the current status or event id instead of read-modify-write.

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::records::{Invite, InviteStatus, Membership, Subscription};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Gateway I/O failure. Safe for the caller (or the webhook provider's
    /// redelivery) to retry; never silently swallowed.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A record failed an internal consistency check.
    #[error("store corrupted: {0}")]
    Corrupted(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Transactional view handed to `run_in_transaction` closures.
pub trait StoreTx {
    fn invite(&self, invite_id: Uuid) -> Option<Invite>;

    /// The single PENDING invite for (org, email), if any. Email must be
    /// normalized by the caller.
    fn pending_invite_for(&self, org_id: Uuid, email: &str) -> Option<Invite>;

    fn put_invite(&mut self, invite: Invite);

    /// Returns false when the row is absent.
    fn remove_invite(&mut self, invite_id: Uuid) -> bool;

    /// Conditional update keyed on the current status. Returns false when
    /// the row is missing or no longer in `expected`, which is how
    /// concurrent losers observe the race instead of double-applying.
    fn set_invite_status_if(
        &mut self,
        invite_id: Uuid,
        expected: InviteStatus,
        new: InviteStatus,
    ) -> bool;

    /// Bulk conditional update: flips PENDING invites with
    /// `expires_at <= cutoff` to EXPIRED. Returns the number flipped.
    fn expire_pending_before(&mut self, cutoff: OffsetDateTime) -> u64;

    fn membership(&self, org_id: Uuid, user_id: Uuid) -> Option<Membership>;
    fn upsert_membership(&mut self, membership: Membership);

    fn subscription(&self, org_id: Uuid) -> Option<Subscription>;
    fn put_subscription(&mut self, subscription: Subscription);

    /// Applied-event ledger, the webhook idempotency gate.
    fn event_applied(&self, event_id: &str) -> bool;
    fn mark_event_applied(&mut self, event_id: &str, org_id: Uuid, at: OffsetDateTime);

    /// Resolve a payment-provider customer ref to an organization.
    fn org_by_billing_ref(&self, external_ref: &str) -> Option<Uuid>;
}

/// Transactional CRUD over invites, subscriptions and memberships.
///
/// Constructed explicitly by the host process and injected into each
/// component; components never reach for module-level state.
#[async_trait]
pub trait Gateway: Send + Sync + 'static {
    /// Run `f` against a transactional view. All mutations commit iff `f`
    /// returns `Ok`; any `Err` rolls the whole transaction back.
    async fn run_in_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<StoreError> + Send + 'static,
        F: FnOnce(&mut dyn StoreTx) -> Result<T, E> + Send + 'static;

    async fn find_invite(&self, invite_id: Uuid) -> StoreResult<Option<Invite>>;

    async fn find_subscription(&self, org_id: Uuid) -> StoreResult<Option<Subscription>>;

    /// Read-only projection: all invites addressed to a normalized email,
    /// across organizations.
    async fn list_invites_for_email(&self, email: &str) -> StoreResult<Vec<Invite>>;

    /// Register the payment-provider customer ref for an organization.
    async fn register_org(&self, org_id: Uuid, billing_ref: &str) -> StoreResult<()>;
}
