//! Invite manager.
//!
//! Owns every invite state transition. All mutations run inside gateway
//! transactions with conditional status guards, so concurrent callers on the
//! same invite observe a well-defined error instead of a double-effect.

use std::sync::Arc;

use serde::Serialize;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use orbit_shared::{
    is_valid_email, normalize_email, Clock, Gateway, Invite, InviteRole, InviteStatus, Membership,
    OrgRole,
};

use crate::error::{InviteError, InviteResult};
use crate::policy::{authorize, InviteAction};

/// Default invite lifetime.
pub const DEFAULT_INVITE_TTL: Duration = Duration::days(7);

/// An authenticated principal acting within an organization. Assembled by
/// the host's auth layer; the manager only consumes it.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: Uuid,
    pub email: String,
    pub org_id: Uuid,
    pub role: OrgRole,
}

/// An authenticated principal outside any organization scope (accepting an
/// invite, listing their own pending invites).
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: Uuid,
    pub email: String,
}

/// Result of a successful acceptance.
#[derive(Debug, Clone, Serialize)]
pub struct AcceptedInvite {
    pub invite_id: Uuid,
    pub org_id: Uuid,
    pub role: OrgRole,
}

/// Read projection of a pending invite, across organizations.
#[derive(Debug, Clone, Serialize)]
pub struct PendingInvite {
    pub id: Uuid,
    pub org_id: Uuid,
    pub role: InviteRole,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

/// Outcome of the acceptance transaction. The expired flip has to commit
/// even though the call itself fails, so the closure reports an outcome
/// instead of an error.
enum AcceptOutcome {
    Accepted(AcceptedInvite),
    NotFound,
    AlreadyProcessed,
    EmailMismatch,
    Expired,
}

pub struct InviteManager<G> {
    gateway: Arc<G>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl<G: Gateway> InviteManager<G> {
    pub fn new(gateway: Arc<G>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            gateway,
            clock,
            ttl,
        }
    }

    /// Create an invite, or — when a PENDING invite already exists for
    /// (org, email) — extend that invite's expiry instead of inserting a
    /// duplicate. This is what upholds the single-PENDING invariant under
    /// double-submit. Returns the invite id either way.
    pub async fn create_invite(
        &self,
        caller: &Caller,
        email: &str,
        role: InviteRole,
    ) -> InviteResult<Uuid> {
        if !authorize(caller.role, InviteAction::Create) {
            return Err(InviteError::PermissionDenied);
        }
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return Err(InviteError::Validation("invalid email address".into()));
        }

        let now = self.clock.now();
        let expires_at = now + self.ttl;
        let org_id = caller.org_id;
        let invited_by = caller.user_id;

        let (invite_id, reused) = self
            .gateway
            .run_in_transaction::<_, InviteError, _>(move |tx| {
                if let Some(mut existing) = tx.pending_invite_for(org_id, &email) {
                    existing.expires_at = expires_at;
                    let id = existing.id;
                    tx.put_invite(existing);
                    return Ok((id, true));
                }
                let invite = Invite {
                    id: Uuid::new_v4(),
                    org_id,
                    email,
                    role,
                    status: InviteStatus::Pending,
                    invited_by,
                    created_at: now,
                    expires_at,
                };
                let id = invite.id;
                tx.put_invite(invite);
                Ok((id, false))
            })
            .await?;

        // Outbound email is an external collaborator; the mail worker picks
        // this event up out of band.
        tracing::info!(
            org_id = %org_id,
            invite_id = %invite_id,
            reused = reused,
            "invite notification queued"
        );
        Ok(invite_id)
    }

    /// Extend a pending invite's expiry and re-trigger its notification.
    /// Returns the new expiry.
    pub async fn resend_invite(
        &self,
        caller: &Caller,
        invite_id: Uuid,
    ) -> InviteResult<OffsetDateTime> {
        if !authorize(caller.role, InviteAction::Resend) {
            return Err(InviteError::PermissionDenied);
        }

        let now = self.clock.now();
        let expires_at = now + self.ttl;
        let org_id = caller.org_id;

        self.gateway
            .run_in_transaction::<_, InviteError, _>(move |tx| {
                // Cross-tenant ids fall through to NotFound, same as absent
                // rows, so existence never leaks across tenants.
                let mut invite = tx
                    .invite(invite_id)
                    .filter(|i| i.org_id == org_id)
                    .ok_or(InviteError::NotFound)?;
                match invite.status {
                    InviteStatus::Accepted => return Err(InviteError::AlreadyAccepted),
                    InviteStatus::Expired => return Err(InviteError::Expired),
                    InviteStatus::Pending => {}
                }
                if invite.is_expired(now) {
                    // Past expiry but not yet swept: reject distinctly so the
                    // caller can surface "expired" rather than a generic
                    // failure.
                    return Err(InviteError::Expired);
                }
                invite.expires_at = expires_at;
                tx.put_invite(invite);
                Ok(())
            })
            .await?;

        tracing::info!(
            org_id = %org_id,
            invite_id = %invite_id,
            "invite notification re-queued"
        );
        Ok(expires_at)
    }

    /// Permanently remove a PENDING or EXPIRED invite. ACCEPTED invites are
    /// the membership audit trail and reject deletion.
    pub async fn delete_invite(&self, caller: &Caller, invite_id: Uuid) -> InviteResult<()> {
        if !authorize(caller.role, InviteAction::Delete) {
            return Err(InviteError::PermissionDenied);
        }
        let org_id = caller.org_id;

        self.gateway
            .run_in_transaction::<_, InviteError, _>(move |tx| {
                let invite = tx
                    .invite(invite_id)
                    .filter(|i| i.org_id == org_id)
                    .ok_or(InviteError::NotFound)?;
                if invite.status == InviteStatus::Accepted {
                    return Err(InviteError::AlreadyAccepted);
                }
                tx.remove_invite(invite_id);
                Ok(())
            })
            .await?;

        tracing::info!(org_id = %org_id, invite_id = %invite_id, "invite deleted");
        Ok(())
    }

    /// Accept an invite: flips the invite to ACCEPTED and upserts the
    /// organization membership in one transaction. An expired read flips the
    /// stored status to EXPIRED as a committed side effect of the failure.
    pub async fn accept_invite(
        &self,
        identity: &Identity,
        invite_id: Uuid,
    ) -> InviteResult<AcceptedInvite> {
        let now = self.clock.now();
        let user_id = identity.user_id;
        let email = normalize_email(&identity.email);

        let outcome = self
            .gateway
            .run_in_transaction::<_, InviteError, _>(move |tx| {
                let Some(invite) = tx.invite(invite_id) else {
                    return Ok(AcceptOutcome::NotFound);
                };
                match invite.status {
                    InviteStatus::Accepted | InviteStatus::Expired => {
                        return Ok(AcceptOutcome::AlreadyProcessed)
                    }
                    InviteStatus::Pending => {}
                }
                if invite.email != email {
                    return Ok(AcceptOutcome::EmailMismatch);
                }
                if invite.is_expired(now) {
                    // Opportunistic sweep of this row; committed even though
                    // the call fails.
                    tx.set_invite_status_if(invite_id, InviteStatus::Pending, InviteStatus::Expired);
                    return Ok(AcceptOutcome::Expired);
                }
                if !tx.set_invite_status_if(invite_id, InviteStatus::Pending, InviteStatus::Accepted)
                {
                    return Ok(AcceptOutcome::AlreadyProcessed);
                }
                tx.upsert_membership(Membership {
                    org_id: invite.org_id,
                    user_id,
                    role: invite.role.into(),
                    joined_at: now,
                });
                Ok(AcceptOutcome::Accepted(AcceptedInvite {
                    invite_id,
                    org_id: invite.org_id,
                    role: invite.role.into(),
                }))
            })
            .await?;

        match outcome {
            AcceptOutcome::Accepted(accepted) => {
                tracing::info!(
                    org_id = %accepted.org_id,
                    invite_id = %invite_id,
                    user_id = %user_id,
                    "invite accepted"
                );
                Ok(accepted)
            }
            AcceptOutcome::NotFound => Err(InviteError::NotFound),
            AcceptOutcome::AlreadyProcessed => Err(InviteError::AlreadyProcessed),
            AcceptOutcome::EmailMismatch => Err(InviteError::EmailMismatch),
            AcceptOutcome::Expired => Err(InviteError::Expired),
        }
    }

    /// Pending invites addressed to an email, across organizations. The only
    /// permission check is that the caller is asking about their own email.
    pub async fn list_pending_for_user(
        &self,
        identity: &Identity,
        email: &str,
    ) -> InviteResult<Vec<PendingInvite>> {
        let email = normalize_email(email);
        if normalize_email(&identity.email) != email {
            return Err(InviteError::PermissionDenied);
        }
        let now = self.clock.now();
        let invites = self.gateway.list_invites_for_email(&email).await?;
        Ok(invites
            .into_iter()
            .filter(|i| i.status == InviteStatus::Pending && !i.is_expired(now))
            .map(|i| PendingInvite {
                id: i.id,
                org_id: i.org_id,
                role: i.role,
                created_at: i.created_at,
                expires_at: i.expires_at,
            })
            .collect())
    }

    /// Flip every PENDING invite past its expiry to EXPIRED. Idempotent and
    /// safe to run concurrently with itself and the other operations: the
    /// bulk update only touches rows still PENDING.
    pub async fn expiry_sweep(&self) -> InviteResult<u64> {
        let now = self.clock.now();
        let flipped = self
            .gateway
            .run_in_transaction::<_, InviteError, _>(move |tx| Ok(tx.expire_pending_before(now)))
            .await?;
        if flipped > 0 {
            tracing::info!(count = flipped, "expiry sweep flipped invites");
        }
        Ok(flipped)
    }
}
