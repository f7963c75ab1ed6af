//! Invite error taxonomy.

use orbit_shared::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum InviteError {
    /// Malformed input, rejected before any mutation.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Caller's role does not permit the action.
    #[error("permission denied")]
    PermissionDenied,

    /// No such invite — or an invite outside the caller's organization.
    /// Indistinguishable by design, to prevent cross-tenant existence
    /// probing.
    #[error("invite not found")]
    NotFound,

    /// The invite was already accepted; the record is retained as audit.
    #[error("invite already accepted")]
    AlreadyAccepted,

    /// The invite already reached a terminal state under a concurrent call.
    #[error("invite already processed")]
    AlreadyProcessed,

    /// Time-based precondition failed.
    #[error("invite expired")]
    Expired,

    /// The accepting identity's email does not match the invite.
    #[error("email does not match invite")]
    EmailMismatch,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl InviteError {
    /// Short human-readable message for the action interface; internal
    /// causes stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            InviteError::Validation(msg) => msg.clone(),
            InviteError::PermissionDenied => "You don't have permission to do that.".into(),
            InviteError::NotFound => "Invite not found.".into(),
            InviteError::AlreadyAccepted => "This invite has already been accepted.".into(),
            InviteError::AlreadyProcessed => "This invite has already been processed.".into(),
            InviteError::Expired => "This invite has expired.".into(),
            InviteError::EmailMismatch => "This invite was issued to a different email.".into(),
            InviteError::Store(_) => "Something went wrong. Please try again.".into(),
        }
    }
}

pub type InviteResult<T> = Result<T, InviteError>;
