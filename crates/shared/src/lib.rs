#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Orbit Shared Module
//!
//! Domain records and the data-store gateway used by the invite and billing
//! crates. The gateway is the single writer of durable state: every mutation
//! goes through [`Gateway::run_in_transaction`], which commits or rolls back
//! as a unit. A mutex-serialized in-memory implementation is provided as the
//! reference gateway; persistent backends are a host integration.

pub mod clock;
pub mod memory;
pub mod records;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use memory::MemoryGateway;
pub use records::{
    is_valid_email, normalize_email, Invite, InviteRole, InviteStatus, Membership,
    NotificationKind, OrgRole, Subscription, SubscriptionStatus,
};
pub use store::{Gateway, StoreError, StoreResult, StoreTx};
