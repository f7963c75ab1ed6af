#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Orbit Invites Module
//!
//! Owns the invite state machine: creation (with resend-on-create for an
//! existing PENDING duplicate), resend, deletion, atomic acceptance, the
//! cross-org pending projection, and the expiry sweep. Permission checks are
//! centralized in a single policy table consumed by every operation.

pub mod error;
pub mod manager;
pub mod policy;


pub use error::{InviteError, InviteResult};
pub use manager::{AcceptedInvite, Caller, Identity, InviteManager, PendingInvite};
pub use policy::{authorize, InviteAction};
