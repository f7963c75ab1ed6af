//! Notification dismissal policy.
//!
//! Dismissals live behind a small key-value interface with a 24 hour TTL
//! and lazy expiry: nothing sweeps stale keys, `is_dismissed` just stops
//! honoring them (and deletes them opportunistically when it sees one).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use time::Duration;
use tracing::debug;
use uuid::Uuid;

use orbit_shared::{Clock, NotificationKind};

/// How long a dismissal suppresses its notification. The boundary is
/// inclusive: a dismissal aged exactly 24h still suppresses.
pub const DISMISSAL_TTL: Duration = Duration::hours(24);

/// Minimal key-value surface so the policy tests with an injected clock
/// and no real persistence backend.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn delete(&self, key: &str);
}

/// In-memory `KvStore`.
#[derive(Default)]
pub struct MemoryKv {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KvStore for MemoryKv {
    fn get(&self, key: &str) -> Option<String> {
        self.entries().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries().insert(key.to_string(), value.to_string());
    }

    fn delete(&self, key: &str) {
        self.entries().remove(key);
    }
}

pub struct DismissalStore<K> {
    kv: K,
    clock: Arc<dyn Clock>,
}

impl<K: KvStore> DismissalStore<K> {
    pub fn new(kv: K, clock: Arc<dyn Clock>) -> Self {
        Self { kv, clock }
    }

    fn dismissal_key(org_id: Uuid, kind: NotificationKind) -> String {
        format!("dismissal:{org_id}:{}", kind.as_str())
    }

    fn conversion_key(org_id: Uuid) -> String {
        format!("conversion_success:{org_id}")
    }

    /// Record (or refresh) a dismissal. Overwrites any earlier timestamp.
    pub fn dismiss(&self, org_id: Uuid, kind: NotificationKind) {
        let key = Self::dismissal_key(org_id, kind);
        self.kv
            .set(&key, &self.clock.now().unix_timestamp().to_string());
        debug!(org_id = %org_id, kind = kind.as_str(), "notification dismissed");
    }

    /// True iff a dismissal exists and is at most [`DISMISSAL_TTL`] old.
    /// Stale and unparseable entries are evicted on the way out.
    pub fn is_dismissed(&self, org_id: Uuid, kind: NotificationKind) -> bool {
        let key = Self::dismissal_key(org_id, kind);
        let Some(raw) = self.kv.get(&key) else {
            return false;
        };
        let Ok(dismissed_at) = raw.parse::<i64>() else {
            self.kv.delete(&key);
            return false;
        };
        let elapsed = self.clock.now().unix_timestamp() - dismissed_at;
        if elapsed <= DISMISSAL_TTL.whole_seconds() {
            true
        } else {
            self.kv.delete(&key);
            false
        }
    }

    /// Raise the one-shot conversion-success flag. Also clears the two
    /// trial dismissals so a stale dismissal cannot suppress the success
    /// message.
    pub fn raise_conversion_success(&self, org_id: Uuid) {
        self.kv.set(&Self::conversion_key(org_id), "1");
        self.kv
            .delete(&Self::dismissal_key(org_id, NotificationKind::TrialEndingSoon));
        self.kv
            .delete(&Self::dismissal_key(org_id, NotificationKind::TrialEnded));
    }

    /// Consume the conversion-success flag. Returns true at most once per
    /// raise.
    pub fn take_conversion_success(&self, org_id: Uuid) -> bool {
        let key = Self::conversion_key(org_id);
        if self.kv.get(&key).is_some() {
            self.kv.delete(&key);
            true
        } else {
            false
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use orbit_shared::ManualClock;

    fn store() -> (DismissalStore<MemoryKv>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_epoch());
        (DismissalStore::new(MemoryKv::new(), clock.clone()), clock)
    }

    #[test]
    fn dismissal_holds_within_window() {
        let (store, clock) = store();
        let org = Uuid::new_v4();
        store.dismiss(org, NotificationKind::PaymentFailed);
        assert!(store.is_dismissed(org, NotificationKind::PaymentFailed));
        clock.advance(Duration::hours(23));
        assert!(store.is_dismissed(org, NotificationKind::PaymentFailed));
    }

    #[test]
    fn boundary_is_inclusive_at_exactly_24h() {
        let (store, clock) = store();
        let org = Uuid::new_v4();
        store.dismiss(org, NotificationKind::TrialEnded);
        clock.advance(Duration::hours(24));
        assert!(store.is_dismissed(org, NotificationKind::TrialEnded));
        clock.advance(Duration::seconds(1));
        assert!(!store.is_dismissed(org, NotificationKind::TrialEnded));
    }

    #[test]
    fn stale_entry_is_evicted_lazily() {
        let (store, clock) = store();
        let org = Uuid::new_v4();
        store.dismiss(org, NotificationKind::TrialEndingSoon);
        clock.advance(Duration::hours(25));
        assert!(!store.is_dismissed(org, NotificationKind::TrialEndingSoon));
        // Key is gone now, not just ignored.
        assert!(store
            .kv
            .get(&DismissalStore::<MemoryKv>::dismissal_key(
                org,
                NotificationKind::TrialEndingSoon
            ))
            .is_none());
    }

    #[test]
    fn garbage_entry_is_evicted() {
        let (store, _clock) = store();
        let org = Uuid::new_v4();
        let key = DismissalStore::<MemoryKv>::dismissal_key(org, NotificationKind::TrialEnded);
        store.kv.set(&key, "not-a-timestamp");
        assert!(!store.is_dismissed(org, NotificationKind::TrialEnded));
        assert!(store.kv.get(&key).is_none());
    }

    #[test]
    fn redismiss_restarts_the_window() {
        let (store, clock) = store();
        let org = Uuid::new_v4();
        store.dismiss(org, NotificationKind::PaymentFailed);
        clock.advance(Duration::hours(20));
        store.dismiss(org, NotificationKind::PaymentFailed);
        clock.advance(Duration::hours(20));
        assert!(store.is_dismissed(org, NotificationKind::PaymentFailed));
    }

    #[test]
    fn dismissals_are_scoped_per_org_and_kind() {
        let (store, _clock) = store();
        let org_a = Uuid::new_v4();
        let org_b = Uuid::new_v4();
        store.dismiss(org_a, NotificationKind::TrialEnded);
        assert!(!store.is_dismissed(org_b, NotificationKind::TrialEnded));
        assert!(!store.is_dismissed(org_a, NotificationKind::TrialEndingSoon));
    }

    #[test]
    fn conversion_success_clears_trial_dismissals_and_fires_once() {
        let (store, _clock) = store();
        let org = Uuid::new_v4();
        store.dismiss(org, NotificationKind::TrialEndingSoon);
        store.dismiss(org, NotificationKind::TrialEnded);
        store.dismiss(org, NotificationKind::PaymentFailed);

        store.raise_conversion_success(org);
        assert!(!store.is_dismissed(org, NotificationKind::TrialEndingSoon));
        assert!(!store.is_dismissed(org, NotificationKind::TrialEnded));
        // Unrelated dismissals survive.
        assert!(store.is_dismissed(org, NotificationKind::PaymentFailed));

        assert!(store.take_conversion_success(org));
        assert!(!store.take_conversion_success(org));
    }

}
