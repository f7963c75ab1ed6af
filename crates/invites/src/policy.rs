//! Invite permission policy.
//!
//! One table keyed by (action, role), consumed uniformly by every manager
//! operation instead of per-call-site boolean checks.

use orbit_shared::OrgRole;
use serde::{Deserialize, Serialize};

/// Invite actions subject to a role check. Acceptance and the pending
/// projection authorize on identity (email match), not role, so they are
/// not listed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InviteAction {
    Create,
    Resend,
    Delete,
}

/// Policy table: owners and admins manage invites, members do not.
pub fn authorize(role: OrgRole, action: InviteAction) -> bool {
    match (action, role) {
        (InviteAction::Create, OrgRole::Owner | OrgRole::Admin) => true,
        (InviteAction::Resend, OrgRole::Owner | OrgRole::Admin) => true,
        (InviteAction::Delete, OrgRole::Owner | OrgRole::Admin) => true,
        (_, OrgRole::Member) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owners_and_admins_manage_invites() {
        for action in [InviteAction::Create, InviteAction::Resend, InviteAction::Delete] {
            assert!(authorize(OrgRole::Owner, action));
            assert!(authorize(OrgRole::Admin, action));
        }
    }

    #[test]
    fn members_manage_nothing() {
        for action in [InviteAction::Create, InviteAction::Resend, InviteAction::Delete] {
            assert!(!authorize(OrgRole::Member, action));
        }
    }
}
