//! Fingerprint diffing over full snapshots

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use cb_core::{Contact, ContactStore, FingerprintPolicy};
use tracing::debug;

use super::{ChangeCursor, ChangeDiffStrategy, FingerprintMap};
use crate::Result;
use crate::events::ContactChangeEvent;

/// Structural hash of the tracked fields of `contact`.
///
/// `DefaultHasher::new()` uses fixed keys, so equal contacts hash equally
/// across cycles. The full photo is never tracked.
pub fn fingerprint(contact: &Contact, policy: &FingerprintPolicy) -> u64 {
    let mut hasher = DefaultHasher::new();

    contact.id.hash(&mut hasher);
    contact.display_name.hash(&mut hasher);
    contact.is_starred.hash(&mut hasher);
    contact.name.hash(&mut hasher);
    contact.phones.hash(&mut hasher);
    contact.emails.hash(&mut hasher);
    contact.addresses.hash(&mut hasher);
    contact.organizations.hash(&mut hasher);
    contact.websites.hash(&mut hasher);
    contact.social_medias.hash(&mut hasher);
    contact.events.hash(&mut hasher);
    contact.notes.hash(&mut hasher);
    if policy.include_thumbnail {
        contact.thumbnail.hash(&mut hasher);
    }

    hasher.finish()
}

/// Events turning `old` into `new`. O(|old| + |new|); order is unspecified.
pub fn diff_fingerprints(old: &FingerprintMap, new: &FingerprintMap) -> Vec<ContactChangeEvent> {
    let mut events = Vec::new();

    for (id, hash) in new {
        match old.get(id) {
            None => events.push(ContactChangeEvent::added(id.clone())),
            Some(previous) if previous != hash => {
                events.push(ContactChangeEvent::updated(id.clone()))
            }
            Some(_) => {}
        }
    }

    for id in old.keys() {
        if !new.contains_key(id) {
            events.push(ContactChangeEvent::removed(id.clone()));
        }
    }

    events
}

/// Diff strategy for stores without a change journal
pub struct FingerprintDiff {
    store: Arc<dyn ContactStore>,
    policy: FingerprintPolicy,
    baseline: Option<FingerprintMap>,
}

impl FingerprintDiff {
    pub fn new(store: Arc<dyn ContactStore>, policy: FingerprintPolicy) -> Self {
        Self {
            store,
            policy,
            baseline: None,
        }
    }

    /// Start from an already captured baseline
    pub fn with_baseline(
        store: Arc<dyn ContactStore>,
        policy: FingerprintPolicy,
        baseline: FingerprintMap,
    ) -> Self {
        Self {
            store,
            policy,
            baseline: Some(baseline),
        }
    }

    /// Fetch the store and fingerprint every contact
    pub async fn snapshot(&self) -> Result<FingerprintMap> {
        let contacts = self.store.get_all(self.policy.properties()).await?;
        Ok(contacts
            .iter()
            .map(|contact| (contact.id.clone(), fingerprint(contact, &self.policy)))
            .collect())
    }
}

#[async_trait]
impl ChangeDiffStrategy for FingerprintDiff {
    fn name(&self) -> &'static str {
        "fingerprint"
    }

    async fn establish_baseline(&mut self) -> Result<()> {
        let baseline = self.snapshot().await?;
        debug!("Fingerprint baseline holds {} contacts", baseline.len());
        self.baseline = Some(baseline);
        Ok(())
    }

    async fn compute(&mut self) -> Result<Vec<ContactChangeEvent>> {
        let current = self.snapshot().await?;

        let events = match &self.baseline {
            Some(previous) => diff_fingerprints(previous, &current),
            // No baseline yet: this snapshot becomes the starting point
            None => Vec::new(),
        };

        self.baseline = Some(current);
        Ok(events)
    }

    fn cursor(&self) -> Option<ChangeCursor> {
        self.baseline.clone().map(ChangeCursor::Fingerprints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChangeKind;
    use cb_core::MemoryContactStore;
    use std::collections::HashSet;

    fn map(pairs: &[(&str, u64)]) -> FingerprintMap {
        pairs.iter().map(|(id, h)| (id.to_string(), *h)).collect()
    }

    fn as_set(events: Vec<ContactChangeEvent>) -> HashSet<ContactChangeEvent> {
        events.into_iter().collect()
    }

    #[test]
    fn test_diff_reference_case() {
        let old = map(&[("a", 1), ("b", 2), ("c", 3)]);
        let new = map(&[("b", 2), ("c", 9), ("d", 4)]);

        let expected: HashSet<_> = [
            ContactChangeEvent::removed("a"),
            ContactChangeEvent::updated("c"),
            ContactChangeEvent::added("d"),
        ]
        .into_iter()
        .collect();

        assert_eq!(as_set(diff_fingerprints(&old, &new)), expected);
    }

    #[test]
    fn test_diff_identical_maps_is_empty() {
        let old = map(&[("a", 1), ("b", 2)]);
        assert!(diff_fingerprints(&old, &old.clone()).is_empty());
        assert!(diff_fingerprints(&FingerprintMap::new(), &FingerprintMap::new()).is_empty());
    }

    #[test]
    fn test_diff_everything_removed() {
        let old = map(&[("a", 1), ("b", 2)]);
        let events = diff_fingerprints(&old, &FingerprintMap::new());
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.kind == ChangeKind::Removed));
    }

    #[test]
    fn test_fingerprint_tracks_fields() {
        let policy = FingerprintPolicy::default();
        let base = Contact::new("1", "Ada");

        assert_eq!(fingerprint(&base, &policy), fingerprint(&base.clone(), &policy));
        assert_ne!(
            fingerprint(&base, &policy),
            fingerprint(&base.clone().with_phone("+1"), &policy)
        );
    }

    #[test]
    fn test_fingerprint_thumbnail_policy() {
        let base = Contact::new("1", "Ada");
        let with_thumb = base.clone().with_thumbnail(vec![1, 2, 3]);

        let tracked = FingerprintPolicy {
            include_thumbnail: true,
        };
        let ignored = FingerprintPolicy {
            include_thumbnail: false,
        };

        assert_ne!(fingerprint(&base, &tracked), fingerprint(&with_thumb, &tracked));
        assert_eq!(fingerprint(&base, &ignored), fingerprint(&with_thumb, &ignored));
    }

    #[test]
    fn test_fingerprint_ignores_photo() {
        let policy = FingerprintPolicy::default();
        let base = Contact::new("1", "Ada");
        let mut with_photo = base.clone();
        with_photo.photo = Some(vec![7; 64]);

        assert_eq!(fingerprint(&base, &policy), fingerprint(&with_photo, &policy));
    }

    #[tokio::test]
    async fn test_compute_advances_baseline() {
        let store = MemoryContactStore::new();
        store.insert(Contact::new("a", "A"));

        let mut strategy = FingerprintDiff::new(Arc::new(store.clone()), FingerprintPolicy::default());
        strategy.establish_baseline().await.unwrap();

        store.insert(Contact::new("b", "B"));
        let events = strategy.compute().await.unwrap();
        assert_eq!(events, vec![ContactChangeEvent::added("b")]);

        // Same state again: nothing new
        assert!(strategy.compute().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_baseline() {
        let store = MemoryContactStore::new();
        store.insert(Contact::new("a", "A"));

        let mut strategy = FingerprintDiff::new(Arc::new(store.clone()), FingerprintPolicy::default());
        strategy.establish_baseline().await.unwrap();
        let before = strategy.cursor();

        store.insert(Contact::new("b", "B"));
        store.fail_next_reads(1);
        assert!(strategy.compute().await.is_err());
        assert_eq!(strategy.cursor(), before);

        // The next cycle still sees the change
        let events = strategy.compute().await.unwrap();
        assert_eq!(events, vec![ContactChangeEvent::added("b")]);
    }

    #[tokio::test]
    async fn test_quiet_write_produces_nothing() {
        let store = MemoryContactStore::new();
        store.insert(Contact::new("a", "A"));

        let mut strategy = FingerprintDiff::new(Arc::new(store.clone()), FingerprintPolicy::default());
        strategy.establish_baseline().await.unwrap();

        store.update(Contact::new("a", "A"));
        assert!(strategy.compute().await.unwrap().is_empty());
    }
}
