//! cb-core: Contacts store model for the contacts bridge
//!
//! This crate describes the host contacts store at its interface boundary.
//!
//! ## Features
//!
//! - Contact data model and snapshot property selection
//! - Store seams: snapshot fetch, change journal, change source, permission gate
//! - Configuration loading (TOML file + environment)
//! - An in-memory store implementing every seam
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cb_core::{Contact, MemoryContactStore};
//!
//! let store = MemoryContactStore::new();
//! let platform = store.platform();
//!
//! store.insert(Contact::new("", "Ada Lovelace").with_phone("+44 20 0000 0000"));
//! ```

pub mod config;
pub mod error;
pub mod memory;
pub mod models;
pub mod store;

pub use config::{Config, FingerprintPolicy, ListenerConfig, TokenLossPolicy};
pub use error::{Error, Result};
pub use memory::MemoryContactStore;
pub use models::{Contact, ContactProperties};
pub use store::{
    ChangeJournal, ChangeSource, ChangeToken, ContactStore, JournalBatch, JournalEntry,
    JournalEntryKind, ObserverRegistration, PermissionGate, Platform, SignalSender, SourceSignal,
};
