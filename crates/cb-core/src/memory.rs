//! In-memory contacts store
//!
//! Implements every store seam so the listener can be driven without a
//! native address book. Mutations append to a bounded change journal and
//! notify registered observers after the store lock is released.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::debug;

use crate::models::{Contact, ContactProperties};
use crate::store::{
    ChangeJournal, ChangeSource, ChangeToken, ContactStore, JournalBatch, JournalEntry,
    JournalEntryKind, ObserverRegistration, PermissionGate, Platform, SignalSender,
};
use crate::{Error, Result};

/// Default number of journal entries kept before older tokens expire
pub const DEFAULT_JOURNAL_CAPACITY: usize = 1024;

struct Inner {
    contacts: BTreeMap<String, Contact>,
    journal: VecDeque<(u64, JournalEntry)>,
    journal_capacity: usize,
    next_seq: u64,
    /// Oldest token still inside the retained history
    horizon: u64,
    journal_available: bool,
    observers: HashMap<u64, SignalSender>,
    next_observer_id: u64,
    permission_granted: bool,
    failing_reads: usize,
    fail_registration: bool,
}

impl Inner {
    fn record(&mut self, kind: JournalEntryKind, contact_id: &str) {
        self.journal
            .push_back((self.next_seq, JournalEntry::new(kind, contact_id)));
        self.next_seq += 1;

        while self.journal.len() > self.journal_capacity {
            if let Some((seq, _)) = self.journal.pop_front() {
                self.horizon = seq + 1;
            }
        }
    }

    fn check_read(&mut self) -> Result<()> {
        if !self.permission_granted {
            return Err(Error::PermissionDenied);
        }
        if self.failing_reads > 0 {
            self.failing_reads -= 1;
            return Err(Error::Store("store is temporarily unavailable".to_string()));
        }
        Ok(())
    }

    fn live_observers(&mut self) -> Vec<SignalSender> {
        self.observers.retain(|_, sender| !sender.is_closed());
        self.observers.values().cloned().collect()
    }
}

/// In-memory contacts store with a change journal
#[derive(Clone)]
pub struct MemoryContactStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryContactStore {
    /// Create an empty store with the default journal capacity
    pub fn new() -> Self {
        Self::with_journal_capacity(DEFAULT_JOURNAL_CAPACITY)
    }

    /// Create an empty store keeping at most `capacity` journal entries
    pub fn with_journal_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                contacts: BTreeMap::new(),
                journal: VecDeque::new(),
                journal_capacity: capacity.max(1),
                next_seq: 0,
                horizon: 0,
                journal_available: true,
                observers: HashMap::new(),
                next_observer_id: 0,
                permission_granted: true,
                failing_reads: 0,
                fail_registration: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn notify(observers: Vec<SignalSender>) {
        for observer in observers {
            observer.notify();
        }
    }

    /// Insert a contact. An empty id is replaced by a generated one.
    pub fn insert(&self, mut contact: Contact) -> String {
        if contact.id.is_empty() {
            contact.id = uuid::Uuid::new_v4().to_string();
        }
        let id = contact.id.clone();

        let observers = {
            let mut inner = self.lock();
            let existed = inner.contacts.insert(id.clone(), contact).is_some();
            let kind = if existed {
                JournalEntryKind::Updated
            } else {
                JournalEntryKind::Added
            };
            inner.record(kind, &id);
            inner.live_observers()
        };

        debug!("Inserted contact {}", id);
        Self::notify(observers);
        id
    }

    /// Replace an existing contact. Returns false if the id is unknown.
    pub fn update(&self, contact: Contact) -> bool {
        let observers = {
            let mut inner = self.lock();
            if !inner.contacts.contains_key(&contact.id) {
                return false;
            }
            let id = contact.id.clone();
            inner.contacts.insert(id.clone(), contact);
            inner.record(JournalEntryKind::Updated, &id);
            inner.live_observers()
        };

        Self::notify(observers);
        true
    }

    /// Remove a contact. Returns false if the id is unknown.
    pub fn remove(&self, id: &str) -> bool {
        let observers = {
            let mut inner = self.lock();
            if inner.contacts.remove(id).is_none() {
                return false;
            }
            inner.record(JournalEntryKind::Deleted, id);
            inner.live_observers()
        };

        debug!("Removed contact {}", id);
        Self::notify(observers);
        true
    }

    /// Fire a change notification without touching any contact, the way
    /// native stores do for unrelated metadata writes
    pub fn touch(&self) {
        let observers = self.lock().live_observers();
        Self::notify(observers);
    }

    /// Look up a contact by id
    pub fn get(&self, id: &str) -> Option<Contact> {
        self.lock().contacts.get(id).cloned()
    }

    /// Every stored contact, ordered by id, ignoring the permission grant
    pub fn contacts(&self) -> Vec<Contact> {
        self.lock().contacts.values().cloned().collect()
    }

    /// Number of stored contacts
    pub fn len(&self) -> usize {
        self.lock().contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Grant or deny read access without telling observers
    pub fn set_permission(&self, granted: bool) {
        self.lock().permission_granted = granted;
    }

    /// Deny read access and signal the revocation to every observer
    pub fn revoke_permission(&self) {
        let observers = {
            let mut inner = self.lock();
            inner.permission_granted = false;
            inner.live_observers()
        };
        for observer in observers {
            observer.permission_revoked();
        }
    }

    /// Make the next `count` reads (snapshot or journal) fail
    pub fn fail_next_reads(&self, count: usize) {
        self.lock().failing_reads = count;
    }

    /// Make subsequent observer registrations fail
    pub fn fail_registration(&self, fail: bool) {
        self.lock().fail_registration = fail;
    }

    /// Toggle the journal capability probe
    pub fn set_journal_available(&self, available: bool) {
        self.lock().journal_available = available;
    }

    /// Drop all retained history, invalidating every token issued so far
    pub fn truncate_journal(&self) {
        let mut inner = self.lock();
        inner.journal.clear();
        // Skip a position so even the newest issued token falls behind
        inner.next_seq += 1;
        inner.horizon = inner.next_seq;
    }

    /// Number of live observer registrations
    pub fn observer_count(&self) -> usize {
        self.lock().live_observers().len()
    }

    /// Bundle this store as a [`Platform`] with the journal attached
    pub fn platform(&self) -> Platform {
        let shared = Arc::new(self.clone());
        Platform::new(shared.clone(), shared.clone(), shared.clone()).with_journal(shared)
    }
}

impl Default for MemoryContactStore {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_token(seq: u64) -> ChangeToken {
    ChangeToken::new(format!("mem-{}", seq))
}

fn decode_token(token: &ChangeToken) -> Result<u64> {
    token
        .as_str()
        .strip_prefix("mem-")
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| Error::TokenInvalidated(format!("malformed token {}", token)))
}

#[async_trait]
impl ContactStore for MemoryContactStore {
    async fn get_all(&self, properties: ContactProperties) -> Result<Vec<Contact>> {
        let mut inner = self.lock();
        inner.check_read()?;
        Ok(inner
            .contacts
            .values()
            .map(|contact| contact.project(&properties))
            .collect())
    }
}

#[async_trait]
impl ChangeJournal for MemoryContactStore {
    fn is_available(&self) -> bool {
        self.lock().journal_available
    }

    async fn current_token(&self) -> Result<ChangeToken> {
        let mut inner = self.lock();
        inner.check_read()?;
        Ok(encode_token(inner.next_seq))
    }

    async fn changes_since(&self, token: &ChangeToken) -> Result<JournalBatch> {
        let since = decode_token(token)?;
        let mut inner = self.lock();
        inner.check_read()?;

        if since < inner.horizon || since > inner.next_seq {
            return Err(Error::TokenInvalidated(format!(
                "{} is outside the retained history",
                token
            )));
        }

        let entries = inner
            .journal
            .iter()
            .filter(|(seq, _)| *seq >= since)
            .map(|(_, entry)| entry.clone())
            .collect();

        Ok(JournalBatch {
            entries,
            next_token: encode_token(inner.next_seq),
        })
    }
}

struct MemoryRegistration {
    inner: Arc<Mutex<Inner>>,
    id: Option<u64>,
}

impl ObserverRegistration for MemoryRegistration {
    fn unregister(&mut self) {
        if let Some(id) = self.id.take() {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.observers.remove(&id);
            debug!("Observer {} unregistered", id);
        }
    }
}

impl Drop for MemoryRegistration {
    fn drop(&mut self) {
        self.unregister();
    }
}

impl ChangeSource for MemoryContactStore {
    fn register(&self, signals: SignalSender) -> Result<Box<dyn ObserverRegistration>> {
        let mut inner = self.lock();
        if inner.fail_registration {
            return Err(Error::Registration(
                "change observer could not be attached".to_string(),
            ));
        }

        let id = inner.next_observer_id;
        inner.next_observer_id += 1;
        inner.observers.insert(id, signals);
        debug!("Observer {} registered", id);

        Ok(Box::new(MemoryRegistration {
            inner: Arc::clone(&self.inner),
            id: Some(id),
        }))
    }
}

impl PermissionGate for MemoryContactStore {
    fn has_read_permission(&self) -> bool {
        self.lock().permission_granted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SourceSignal;

    #[tokio::test]
    async fn test_journal_replays_since_token() {
        let store = MemoryContactStore::new();
        let start = store.current_token().await.unwrap();

        let id = store.insert(Contact::new("", "Ada"));
        store.update(Contact::new(id.clone(), "Ada Lovelace"));
        store.remove(&id);

        let batch = store.changes_since(&start).await.unwrap();
        let kinds: Vec<_> = batch.entries.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                JournalEntryKind::Added,
                JournalEntryKind::Updated,
                JournalEntryKind::Deleted
            ]
        );

        let again = store.changes_since(&batch.next_token).await.unwrap();
        assert!(again.entries.is_empty());
    }

    #[tokio::test]
    async fn test_stale_token_is_invalidated() {
        let store = MemoryContactStore::with_journal_capacity(2);
        let start = store.current_token().await.unwrap();

        for name in ["a", "b", "c"] {
            store.insert(Contact::new(name, name));
        }

        let result = store.changes_since(&start).await;
        assert!(matches!(result, Err(Error::TokenInvalidated(_))));
    }

    #[tokio::test]
    async fn test_truncate_invalidates_all_tokens() {
        let store = MemoryContactStore::new();
        store.insert(Contact::new("a", "A"));
        let token = store.current_token().await.unwrap();

        store.truncate_journal();

        assert!(matches!(
            store.changes_since(&token).await,
            Err(Error::TokenInvalidated(_))
        ));
    }

    #[tokio::test]
    async fn test_failing_reads_then_recovers() {
        let store = MemoryContactStore::new();
        store.insert(Contact::new("a", "A"));
        store.fail_next_reads(1);

        assert!(matches!(
            store.get_all(ContactProperties::ids_only()).await,
            Err(Error::Store(_))
        ));
        assert_eq!(
            store
                .get_all(ContactProperties::ids_only())
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_denied_permission_fails_reads() {
        let store = MemoryContactStore::new();
        store.set_permission(false);

        assert!(!store.has_read_permission());
        assert!(matches!(
            store.get_all(ContactProperties::ids_only()).await,
            Err(Error::PermissionDenied)
        ));
    }

    #[tokio::test]
    async fn test_observers_notified_and_unregistered() {
        let store = MemoryContactStore::new();
        let (sender, mut rx) = SignalSender::channel();
        let mut registration = store.register(sender).unwrap();
        assert_eq!(store.observer_count(), 1);

        store.insert(Contact::new("a", "A"));
        store.touch();
        assert_eq!(rx.recv().await, Some(SourceSignal::Changed));
        assert_eq!(rx.recv().await, Some(SourceSignal::Changed));

        registration.unregister();
        registration.unregister();
        assert_eq!(store.observer_count(), 0);
    }

    #[tokio::test]
    async fn test_revoke_permission_signals_observers() {
        let store = MemoryContactStore::new();
        let (sender, mut rx) = SignalSender::channel();
        let _registration = store.register(sender).unwrap();

        store.revoke_permission();

        assert_eq!(rx.recv().await, Some(SourceSignal::PermissionRevoked));
        assert!(!store.has_read_permission());
    }

    #[test]
    fn test_registration_failure() {
        let store = MemoryContactStore::new();
        store.fail_registration(true);

        let (sender, _rx) = SignalSender::channel();
        assert!(matches!(
            store.register(sender),
            Err(Error::Registration(_))
        ));
    }

    #[test]
    fn test_platform_probe_follows_journal_toggle() {
        let store = MemoryContactStore::new();
        let platform = store.platform();
        assert!(platform.available_journal().is_some());

        store.set_journal_available(false);
        assert!(platform.available_journal().is_none());
    }
}
