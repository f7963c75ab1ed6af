//! Domain records owned by the organization aggregate.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Lifecycle status of an invite. Transitions are monotonic:
/// PENDING -> {EXPIRED, ACCEPTED}; terminal states only leave the store
/// through deletion (and ACCEPTED never does, it is the audit record).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InviteStatus {
    Pending,
    Expired,
    Accepted,
}

/// Role an invite grants on acceptance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InviteRole {
    Member,
    Admin,
}

/// Role of an authenticated caller within an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrgRole {
    Owner,
    Admin,
    Member,
}

impl From<InviteRole> for OrgRole {
    fn from(role: InviteRole) -> Self {
        match role {
            InviteRole::Member => OrgRole::Member,
            InviteRole::Admin => OrgRole::Admin,
        }
    }
}

/// A pending offer of organization membership, bound to an email and an
/// expiry. At most one PENDING invite exists per (org, email).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invite {
    pub id: Uuid,
    pub org_id: Uuid,
    /// Normalized (trimmed, lowercased) before storage; all comparisons are
    /// against the normalized form.
    pub email: String,
    pub role: InviteRole,
    pub status: InviteStatus,
    pub invited_by: Uuid,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

impl Invite {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at <= now
    }
}

/// Membership of a user in an organization, created when an invite is
/// accepted (within the same transaction as the invite flip).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub org_id: Uuid,
    pub user_id: Uuid,
    pub role: OrgRole,
    pub joined_at: OffsetDateTime,
}

/// Billing state of an organization. One record per org, created at trial
/// start and never deleted, only transitioned to CANCELED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trialing,
    Active,
    PastDue,
    Canceled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub org_id: Uuid,
    pub external_customer_ref: String,
    pub external_subscription_ref: Option<String>,
    pub status: SubscriptionStatus,
    pub trial_ends_at: Option<OffsetDateTime>,
    /// Idempotency cursor: the last event applied to this record.
    pub last_applied_event_id: Option<String>,
    /// Events with a timestamp not newer than this are stale and ignored.
    pub last_applied_event_at: Option<OffsetDateTime>,
}

/// Notification categories a user may dismiss. Dismissals expire after 24h.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    TrialEndingSoon,
    TrialEnded,
    PaymentFailed,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::TrialEndingSoon => "trial_ending_soon",
            NotificationKind::TrialEnded => "trial_ended",
            NotificationKind::PaymentFailed => "payment_failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "trial_ending_soon" => Some(NotificationKind::TrialEndingSoon),
            "trial_ended" => Some(NotificationKind::TrialEnded),
            "payment_failed" => Some(NotificationKind::PaymentFailed),
            _ => None,
        }
    }
}

/// Normalize an email for storage and comparison: trim and lowercase.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

/// Syntactic email check. Deliberately shallow: one `@`, non-empty local
/// part, dotted domain, no whitespace. Deliverability is the mail system's
/// problem.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return false;
    }
    domain.split('.').count() >= 2 && domain.split('.').all(|label| !label.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_trims_and_lowercases() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn valid_emails_pass() {
        assert!(is_valid_email("a@x.com"));
        assert!(is_valid_email("first.last@sub.example.org"));
    }

    #[test]
    fn invalid_emails_fail() {
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("a@"));
        assert!(!is_valid_email("a@nodot"));
        assert!(!is_valid_email("a@x..com"));
        assert!(!is_valid_email("a b@x.com"));
        assert!(!is_valid_email("a@b@x.com"));
    }

    #[test]
    fn invite_expiry_is_inclusive_at_boundary() {
        let now = OffsetDateTime::UNIX_EPOCH + time::Duration::days(100);
        let invite = Invite {
            id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            email: "a@x.com".into(),
            role: InviteRole::Member,
            status: InviteStatus::Pending,
            invited_by: Uuid::new_v4(),
            created_at: now - time::Duration::days(7),
            expires_at: now,
        };
        assert!(invite.is_expired(now));
        assert!(!invite.is_expired(now - time::Duration::seconds(1)));
    }

    #[test]
    fn invite_role_maps_to_org_role() {
        assert_eq!(OrgRole::from(InviteRole::Admin), OrgRole::Admin);
        assert_eq!(OrgRole::from(InviteRole::Member), OrgRole::Member);
    }

    #[test]
    fn notification_kind_round_trips() {
        for kind in [
            NotificationKind::TrialEndingSoon,
            NotificationKind::TrialEnded,
            NotificationKind::PaymentFailed,
        ] {
            assert_eq!(NotificationKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(NotificationKind::parse("bogus"), None);
    }
}
