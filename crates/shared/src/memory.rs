//! In-memory reference gateway.
//!
//! Transactions run against a staged copy of the whole store under one
//! mutex: commit replaces the live state, an `Err` from the closure simply
//! drops the copy. The mutex makes the gateway the serialization point the
//! concurrency model requires — conditional updates observed inside a
//! transaction cannot be invalidated by a concurrent writer.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::records::{Invite, InviteStatus, Membership, Subscription};
use crate::store::{Gateway, StoreError, StoreResult, StoreTx};

#[derive(Debug, Clone, Default)]
struct StoreState {
    invites: HashMap<Uuid, Invite>,
    memberships: HashMap<(Uuid, Uuid), Membership>,
    subscriptions: HashMap<Uuid, Subscription>,
    /// event id -> (org, applied at); the webhook idempotency ledger.
    applied_events: HashMap<String, (Uuid, OffsetDateTime)>,
    /// payment-provider customer ref -> org id.
    org_billing_refs: HashMap<String, Uuid>,
}

#[derive(Debug, Default)]
pub struct MemoryGateway {
    state: Mutex<StoreState>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        // A poisoned lock means a panicking test, not torn data: state is
        // only replaced wholesale after the closure returns.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

struct MemoryTx<'a> {
    staged: &'a mut StoreState,
}

impl StoreTx for MemoryTx<'_> {
    fn invite(&self, invite_id: Uuid) -> Option<Invite> {
        self.staged.invites.get(&invite_id).cloned()
    }

    fn pending_invite_for(&self, org_id: Uuid, email: &str) -> Option<Invite> {
        self.staged
            .invites
            .values()
            .find(|i| {
                i.org_id == org_id && i.email == email && i.status == InviteStatus::Pending
            })
            .cloned()
    }

    fn put_invite(&mut self, invite: Invite) {
        self.staged.invites.insert(invite.id, invite);
    }

    fn remove_invite(&mut self, invite_id: Uuid) -> bool {
        self.staged.invites.remove(&invite_id).is_some()
    }

    fn set_invite_status_if(
        &mut self,
        invite_id: Uuid,
        expected: InviteStatus,
        new: InviteStatus,
    ) -> bool {
        match self.staged.invites.get_mut(&invite_id) {
            Some(invite) if invite.status == expected => {
                invite.status = new;
                true
            }
            _ => false,
        }
    }

    fn expire_pending_before(&mut self, cutoff: OffsetDateTime) -> u64 {
        let mut flipped = 0;
        for invite in self.staged.invites.values_mut() {
            if invite.status == InviteStatus::Pending && invite.expires_at <= cutoff {
                invite.status = InviteStatus::Expired;
                flipped += 1;
            }
        }
        flipped
    }

    fn membership(&self, org_id: Uuid, user_id: Uuid) -> Option<Membership> {
        self.staged.memberships.get(&(org_id, user_id)).cloned()
    }

    fn upsert_membership(&mut self, membership: Membership) {
        self.staged
            .memberships
            .insert((membership.org_id, membership.user_id), membership);
    }

    fn subscription(&self, org_id: Uuid) -> Option<Subscription> {
        self.staged.subscriptions.get(&org_id).cloned()
    }

    fn put_subscription(&mut self, subscription: Subscription) {
        self.staged
            .subscriptions
            .insert(subscription.org_id, subscription);
    }

    fn event_applied(&self, event_id: &str) -> bool {
        self.staged.applied_events.contains_key(event_id)
    }

    fn mark_event_applied(&mut self, event_id: &str, org_id: Uuid, at: OffsetDateTime) {
        self.staged
            .applied_events
            .insert(event_id.to_string(), (org_id, at));
    }

    fn org_by_billing_ref(&self, external_ref: &str) -> Option<Uuid> {
        self.staged.org_billing_refs.get(external_ref).copied()
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    async fn run_in_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<StoreError> + Send + 'static,
        F: FnOnce(&mut dyn StoreTx) -> Result<T, E> + Send + 'static,
    {
        let mut live = self.lock();
        let mut staged = live.clone();
        let out = f(&mut MemoryTx {
            staged: &mut staged,
        });
        if out.is_ok() {
            *live = staged;
        }
        out
    }

    async fn find_invite(&self, invite_id: Uuid) -> StoreResult<Option<Invite>> {
        Ok(self.lock().invites.get(&invite_id).cloned())
    }

    async fn find_subscription(&self, org_id: Uuid) -> StoreResult<Option<Subscription>> {
        Ok(self.lock().subscriptions.get(&org_id).cloned())
    }

    async fn list_invites_for_email(&self, email: &str) -> StoreResult<Vec<Invite>> {
        Ok(self
            .lock()
            .invites
            .values()
            .filter(|i| i.email == email)
            .cloned()
            .collect())
    }

    async fn register_org(&self, org_id: Uuid, billing_ref: &str) -> StoreResult<()> {
        self.lock()
            .org_billing_refs
            .insert(billing_ref.to_string(), org_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use time::Duration;

    use super::*;
    use crate::records::InviteRole;

    fn sample_invite(org_id: Uuid, email: &str, expires_at: OffsetDateTime) -> Invite {
        Invite {
            id: Uuid::new_v4(),
            org_id,
            email: email.to_string(),
            role: InviteRole::Member,
            status: InviteStatus::Pending,
            invited_by: Uuid::new_v4(),
            created_at: expires_at - Duration::days(7),
            expires_at,
        }
    }

    #[tokio::test]
    async fn commit_persists_writes() {
        let gw = MemoryGateway::new();
        let org = Uuid::new_v4();
        let invite = sample_invite(org, "a@x.com", OffsetDateTime::UNIX_EPOCH);
        let id = invite.id;

        gw.run_in_transaction::<_, StoreError, _>(move |tx| {
            tx.put_invite(invite);
            Ok(())
        })
        .await
        .unwrap();

        assert!(gw.find_invite(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn error_rolls_back_all_writes() {
        let gw = MemoryGateway::new();
        let org = Uuid::new_v4();
        let invite = sample_invite(org, "a@x.com", OffsetDateTime::UNIX_EPOCH);
        let id = invite.id;

        let out: Result<(), StoreError> = gw
            .run_in_transaction(move |tx| {
                tx.put_invite(invite);
                tx.upsert_membership(Membership {
                    org_id: org,
                    user_id: Uuid::new_v4(),
                    role: crate::records::OrgRole::Member,
                    joined_at: OffsetDateTime::UNIX_EPOCH,
                });
                Err(StoreError::Corrupted("forced".into()))
            })
            .await;

        assert!(out.is_err());
        assert!(gw.find_invite(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn conditional_status_update_guards_races() {
        let gw = MemoryGateway::new();
        let invite = sample_invite(Uuid::new_v4(), "a@x.com", OffsetDateTime::UNIX_EPOCH);
        let id = invite.id;
        gw.run_in_transaction::<_, StoreError, _>(move |tx| {
            tx.put_invite(invite);
            Ok(())
        })
        .await
        .unwrap();

        let first = gw
            .run_in_transaction::<_, StoreError, _>(move |tx| {
                Ok(tx.set_invite_status_if(id, InviteStatus::Pending, InviteStatus::Accepted))
            })
            .await
            .unwrap();
        let second = gw
            .run_in_transaction::<_, StoreError, _>(move |tx| {
                Ok(tx.set_invite_status_if(id, InviteStatus::Pending, InviteStatus::Accepted))
            })
            .await
            .unwrap();

        assert!(first);
        assert!(!second, "loser of the race must observe the guard");
    }

    #[tokio::test]
    async fn expire_pending_before_only_flips_due_pending() {
        let gw = MemoryGateway::new();
        let now = OffsetDateTime::UNIX_EPOCH + Duration::days(10);
        let due = sample_invite(Uuid::new_v4(), "due@x.com", now - Duration::hours(1));
        let fresh = sample_invite(Uuid::new_v4(), "fresh@x.com", now + Duration::days(1));
        let mut accepted = sample_invite(Uuid::new_v4(), "done@x.com", now - Duration::hours(1));
        accepted.status = InviteStatus::Accepted;
        let (due_id, fresh_id, accepted_id) = (due.id, fresh.id, accepted.id);

        gw.run_in_transaction::<_, StoreError, _>(move |tx| {
            tx.put_invite(due);
            tx.put_invite(fresh);
            tx.put_invite(accepted);
            Ok(())
        })
        .await
        .unwrap();

        let flipped = gw
            .run_in_transaction::<_, StoreError, _>(move |tx| Ok(tx.expire_pending_before(now)))
            .await
            .unwrap();
        assert_eq!(flipped, 1);

        let gw = &gw;
        let status = |id: Uuid| async move { gw.find_invite(id).await.unwrap().unwrap().status };
        assert_eq!(status(due_id).await, InviteStatus::Expired);
        assert_eq!(status(fresh_id).await, InviteStatus::Pending);
        assert_eq!(status(accepted_id).await, InviteStatus::Accepted);
    }

    #[tokio::test]
    async fn event_ledger_and_org_refs() {
        let gw = MemoryGateway::new();
        let org = Uuid::new_v4();
        gw.register_org(org, "cus_123").await.unwrap();

        let applied = gw
            .run_in_transaction::<_, StoreError, _>(move |tx| {
                assert_eq!(tx.org_by_billing_ref("cus_123"), Some(org));
                assert!(!tx.event_applied("evt_1"));
                tx.mark_event_applied("evt_1", org, OffsetDateTime::UNIX_EPOCH);
                Ok(tx.event_applied("evt_1"))
            })
            .await
            .unwrap();
        assert!(applied);
    }
}
