//! Journal replay diffing

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use cb_core::{
    ChangeJournal, ChangeToken, ContactProperties, ContactStore, FingerprintPolicy,
    JournalEntry, JournalEntryKind, TokenLossPolicy,
};
use tracing::{debug, info, warn};

use super::{ChangeCursor, ChangeDiffStrategy, FingerprintDiff};
use crate::events::{ChangeKind, ContactChangeEvent};
use crate::{ListenerError, Result};

/// Fold journal entries into one event per contact, in first-seen order.
///
/// Only the first and last entry of each contact matter:
/// added..deleted cancels out, added.. stays added, ..deleted is removed,
/// everything else is an update.
pub fn coalesce_entries(entries: &[JournalEntry]) -> Vec<ContactChangeEvent> {
    let mut order: Vec<&str> = Vec::new();
    let mut spans: HashMap<&str, (JournalEntryKind, JournalEntryKind)> = HashMap::new();

    for entry in entries {
        let id = entry.contact_id.as_str();
        match spans.get_mut(id) {
            Some(span) => span.1 = entry.kind,
            None => {
                order.push(id);
                spans.insert(id, (entry.kind, entry.kind));
            }
        }
    }

    order
        .into_iter()
        .filter_map(|id| {
            let kind = match spans[id] {
                (JournalEntryKind::Added, JournalEntryKind::Deleted) => return None,
                (JournalEntryKind::Added, _) => ChangeKind::Added,
                (_, JournalEntryKind::Deleted) => ChangeKind::Removed,
                _ => ChangeKind::Updated,
            };
            Some(ContactChangeEvent::new(kind, id))
        })
        .collect()
}

/// Diff strategy for stores with a durable change journal
pub struct JournalDiff {
    journal: Arc<dyn ChangeJournal>,
    store: Arc<dyn ContactStore>,
    token_loss: TokenLossPolicy,
    fingerprint: FingerprintPolicy,
    token: Option<ChangeToken>,
    /// Set once a lost token switched this session to fingerprinting
    fallback: Option<FingerprintDiff>,
}

impl JournalDiff {
    pub fn new(
        journal: Arc<dyn ChangeJournal>,
        store: Arc<dyn ContactStore>,
        token_loss: TokenLossPolicy,
        fingerprint: FingerprintPolicy,
    ) -> Self {
        Self {
            journal,
            store,
            token_loss,
            fingerprint,
            token: None,
            fallback: None,
        }
    }

    /// Whether a lost token has switched this strategy to fingerprinting
    pub fn is_fallen_back(&self) -> bool {
        self.fallback.is_some()
    }

    async fn recover(&mut self, reason: String) -> Result<Vec<ContactChangeEvent>> {
        warn!(policy = ?self.token_loss, "Change token lost: {}", reason);

        match self.token_loss {
            TokenLossPolicy::Resync => {
                // Capture the position first so later writes replay next cycle
                let fresh = self.journal.current_token().await?;
                let contacts = self.store.get_all(ContactProperties::ids_only()).await?;
                self.token = Some(fresh);
                info!("Resynchronized {} contacts after token loss", contacts.len());
                Ok(contacts
                    .into_iter()
                    .map(|contact| ContactChangeEvent::updated(contact.id))
                    .collect())
            }
            TokenLossPolicy::Rebase => {
                self.token = Some(self.journal.current_token().await?);
                Ok(Vec::new())
            }
            TokenLossPolicy::Fingerprint => {
                let mut fallback = FingerprintDiff::new(self.store.clone(), self.fingerprint);
                fallback.establish_baseline().await?;
                self.fallback = Some(fallback);
                self.token = None;
                info!("Switched to fingerprint diffing after token loss");
                Ok(Vec::new())
            }
        }
    }
}

#[async_trait]
impl ChangeDiffStrategy for JournalDiff {
    fn name(&self) -> &'static str {
        if self.fallback.is_some() {
            "journal->fingerprint"
        } else {
            "journal"
        }
    }

    async fn establish_baseline(&mut self) -> Result<()> {
        let token = self.journal.current_token().await?;
        debug!("Journal baseline at {}", token);
        self.token = Some(token);
        Ok(())
    }

    async fn compute(&mut self) -> Result<Vec<ContactChangeEvent>> {
        if let Some(fallback) = self.fallback.as_mut() {
            return fallback.compute().await;
        }

        let Some(token) = self.token.clone() else {
            self.establish_baseline().await?;
            return Ok(Vec::new());
        };

        match self.journal.changes_since(&token).await {
            Ok(batch) => {
                debug!(
                    "Replayed {} journal entries since {}",
                    batch.entries.len(),
                    token
                );
                let events = coalesce_entries(&batch.entries);
                self.token = Some(batch.next_token);
                Ok(events)
            }
            Err(e) => match ListenerError::from(e) {
                ListenerError::TokenInvalidated(reason) => self.recover(reason).await,
                other => Err(other),
            },
        }
    }

    fn cursor(&self) -> Option<ChangeCursor> {
        match &self.fallback {
            Some(fallback) => fallback.cursor(),
            None => self.token.clone().map(ChangeCursor::Token),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cb_core::{Contact, MemoryContactStore};
    use std::collections::HashSet;

    fn journal_diff(store: &MemoryContactStore, policy: TokenLossPolicy) -> JournalDiff {
        let shared = Arc::new(store.clone());
        JournalDiff::new(shared.clone(), shared, policy, FingerprintPolicy::default())
    }

    fn entry(kind: JournalEntryKind, id: &str) -> JournalEntry {
        JournalEntry::new(kind, id)
    }

    #[test]
    fn test_coalesce_rules() {
        use JournalEntryKind::*;

        let entries = vec![
            entry(Added, "new"),
            entry(Updated, "new"),
            entry(Added, "ghost"),
            entry(Deleted, "ghost"),
            entry(Updated, "edited"),
            entry(Updated, "edited"),
            entry(Updated, "gone"),
            entry(Deleted, "gone"),
            entry(Deleted, "reborn"),
            entry(Added, "reborn"),
        ];

        assert_eq!(
            coalesce_entries(&entries),
            vec![
                ContactChangeEvent::added("new"),
                ContactChangeEvent::updated("edited"),
                ContactChangeEvent::removed("gone"),
                ContactChangeEvent::updated("reborn"),
            ]
        );
    }

    #[test]
    fn test_coalesce_empty() {
        assert!(coalesce_entries(&[]).is_empty());
    }

    #[tokio::test]
    async fn test_replay_matches_fingerprint_semantics() {
        let store = MemoryContactStore::new();
        for (id, name) in [("a", "A"), ("b", "B"), ("c", "C")] {
            store.insert(Contact::new(id, name));
        }

        let mut strategy = journal_diff(&store, TokenLossPolicy::Resync);
        strategy.establish_baseline().await.unwrap();

        store.remove("a");
        store.update(Contact::new("c", "C2"));
        store.insert(Contact::new("d", "D"));

        let events: HashSet<_> = strategy.compute().await.unwrap().into_iter().collect();
        let expected: HashSet<_> = [
            ContactChangeEvent::removed("a"),
            ContactChangeEvent::updated("c"),
            ContactChangeEvent::added("d"),
        ]
        .into_iter()
        .collect();
        assert_eq!(events, expected);

        assert!(strategy.compute().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_read_keeps_token() {
        let store = MemoryContactStore::new();
        let mut strategy = journal_diff(&store, TokenLossPolicy::Resync);
        strategy.establish_baseline().await.unwrap();
        let before = strategy.cursor();

        store.insert(Contact::new("a", "A"));
        store.fail_next_reads(1);
        assert!(matches!(
            strategy.compute().await,
            Err(ListenerError::TransientFetch(_))
        ));
        assert_eq!(strategy.cursor(), before);

        assert_eq!(
            strategy.compute().await.unwrap(),
            vec![ContactChangeEvent::added("a")]
        );
    }

    #[tokio::test]
    async fn test_token_loss_resync_reports_everything() {
        let store = MemoryContactStore::new();
        store.insert(Contact::new("a", "A"));
        store.insert(Contact::new("b", "B"));

        let mut strategy = journal_diff(&store, TokenLossPolicy::Resync);
        strategy.establish_baseline().await.unwrap();

        store.truncate_journal();

        let events: HashSet<_> = strategy.compute().await.unwrap().into_iter().collect();
        let expected: HashSet<_> = [
            ContactChangeEvent::updated("a"),
            ContactChangeEvent::updated("b"),
        ]
        .into_iter()
        .collect();
        assert_eq!(events, expected);

        // Rebased: the journal works again from here
        store.insert(Contact::new("c", "C"));
        assert_eq!(
            strategy.compute().await.unwrap(),
            vec![ContactChangeEvent::added("c")]
        );
    }

    #[tokio::test]
    async fn test_token_loss_rebase_is_silent() {
        let store = MemoryContactStore::new();
        store.insert(Contact::new("a", "A"));

        let mut strategy = journal_diff(&store, TokenLossPolicy::Rebase);
        strategy.establish_baseline().await.unwrap();

        store.insert(Contact::new("b", "B"));
        store.truncate_journal();
        assert!(strategy.compute().await.unwrap().is_empty());

        store.remove("a");
        assert_eq!(
            strategy.compute().await.unwrap(),
            vec![ContactChangeEvent::removed("a")]
        );
    }

    #[tokio::test]
    async fn test_token_loss_falls_back_to_fingerprints() {
        let store = MemoryContactStore::new();
        store.insert(Contact::new("a", "A"));

        let mut strategy = journal_diff(&store, TokenLossPolicy::Fingerprint);
        strategy.establish_baseline().await.unwrap();

        store.truncate_journal();
        assert!(strategy.compute().await.unwrap().is_empty());
        assert!(strategy.is_fallen_back());
        assert_eq!(strategy.name(), "journal->fingerprint");
        assert!(matches!(strategy.cursor(), Some(ChangeCursor::Fingerprints(_))));

        store.update(Contact::new("a", "A2"));
        assert_eq!(
            strategy.compute().await.unwrap(),
            vec![ContactChangeEvent::updated("a")]
        );
    }

    #[tokio::test]
    async fn test_failed_resync_keeps_old_token() {
        let store = MemoryContactStore::new();
        let journal = Arc::new(store.clone());
        let mut strategy = JournalDiff::new(
            journal,
            Arc::new(FailingStore),
            TokenLossPolicy::Resync,
            FingerprintPolicy::default(),
        );
        strategy.establish_baseline().await.unwrap();
        let before = strategy.cursor();

        store.insert(Contact::new("a", "A"));
        store.truncate_journal();

        // The fresh token is captured, but the snapshot read fails
        assert!(matches!(
            strategy.compute().await,
            Err(ListenerError::TransientFetch(_))
        ));
        assert_eq!(strategy.cursor(), before);
    }

    struct FailingStore;

    #[async_trait]
    impl ContactStore for FailingStore {
        async fn get_all(&self, _properties: ContactProperties) -> cb_core::Result<Vec<Contact>> {
            Err(cb_core::Error::Store("locked".to_string()))
        }
    }
}
