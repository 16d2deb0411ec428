//! Contacts store collaborator traits
//!
//! The platform side of the bridge is described by four seams:
//!
//! - [`ContactStore`]: full snapshot fetch
//! - [`ChangeJournal`]: durable change history keyed by a resumable token
//! - [`ChangeSource`]: raw "the store changed" notifications
//! - [`PermissionGate`]: read-access grant state
//!
//! [`Platform`] bundles one implementation of each.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::Result;
use crate::models::{Contact, ContactProperties};

/// Full-snapshot access to the contacts store
#[async_trait]
pub trait ContactStore: Send + Sync {
    /// Fetch every contact, loading only the parts selected by `properties`
    async fn get_all(&self, properties: ContactProperties) -> Result<Vec<Contact>>;
}

/// Opaque, store-issued journal position
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeToken(String);

impl ChangeToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChangeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of a journal entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalEntryKind {
    Added,
    Updated,
    Deleted,
}

/// One entry of the change history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub kind: JournalEntryKind,
    pub contact_id: String,
}

impl JournalEntry {
    pub fn new(kind: JournalEntryKind, contact_id: impl Into<String>) -> Self {
        Self {
            kind,
            contact_id: contact_id.into(),
        }
    }
}

/// Entries recorded since a token, plus the token to resume from next time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalBatch {
    pub entries: Vec<JournalEntry>,
    pub next_token: ChangeToken,
}

/// Durable change history
///
/// Resuming from a token replays every entry recorded since it exactly once.
/// A token older than the retained history yields [`crate::Error::TokenInvalidated`].
#[async_trait]
pub trait ChangeJournal: Send + Sync {
    /// Capability probe, checked once when a session starts
    fn is_available(&self) -> bool {
        true
    }

    /// Token for the store's current position
    async fn current_token(&self) -> Result<ChangeToken>;

    /// Every entry recorded since `token`
    async fn changes_since(&self, token: &ChangeToken) -> Result<JournalBatch>;
}

/// Raw signal produced by a change source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceSignal {
    /// Something in the store changed; carries no detail
    Changed,
    /// Read access was revoked by the platform
    PermissionRevoked,
}

/// Producer half handed to a [`ChangeSource`] on registration
///
/// Sending never blocks and may happen from any thread.
#[derive(Debug, Clone)]
pub struct SignalSender {
    tx: mpsc::UnboundedSender<SourceSignal>,
}

impl SignalSender {
    /// Create a sender and the receiver the listener drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SourceSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Report that the store changed. Returns false once the listener is gone.
    pub fn notify(&self) -> bool {
        self.tx.send(SourceSignal::Changed).is_ok()
    }

    /// Report that read access was revoked
    pub fn permission_revoked(&self) -> bool {
        self.tx.send(SourceSignal::PermissionRevoked).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Live registration with a change source. `unregister` must be idempotent.
pub trait ObserverRegistration: Send {
    fn unregister(&mut self);
}

/// Native change-notification mechanism
pub trait ChangeSource: Send + Sync {
    /// Start forwarding store changes to `signals`
    fn register(&self, signals: SignalSender) -> Result<Box<dyn ObserverRegistration>>;
}

/// Read-access grant state
pub trait PermissionGate: Send + Sync {
    /// Synchronous check of the current grant, without prompting
    fn has_read_permission(&self) -> bool;
}

/// One implementation of each store seam
#[derive(Clone)]
pub struct Platform {
    pub store: Arc<dyn ContactStore>,
    pub journal: Option<Arc<dyn ChangeJournal>>,
    pub source: Arc<dyn ChangeSource>,
    pub permissions: Arc<dyn PermissionGate>,
}

impl Platform {
    /// Create a platform without a change journal
    pub fn new(
        store: Arc<dyn ContactStore>,
        source: Arc<dyn ChangeSource>,
        permissions: Arc<dyn PermissionGate>,
    ) -> Self {
        Self {
            store,
            journal: None,
            source,
            permissions,
        }
    }

    /// Attach a change journal
    pub fn with_journal(mut self, journal: Arc<dyn ChangeJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// The change journal, if one is attached and currently usable
    pub fn available_journal(&self) -> Option<Arc<dyn ChangeJournal>> {
        self.journal
            .as_ref()
            .filter(|journal| journal.is_available())
            .cloned()
    }
}

impl fmt::Debug for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Platform")
            .field("journal", &self.journal.is_some())
            .finish_non_exhaustive()
    }
}
