//! cb-listener: Contact-change listener for the contacts bridge
//!
//! This crate watches a live contacts store and reports debounced change
//! events to subscribers.
//!
//! ## Features
//!
//! - Two independent stream slots: simple pulses and detailed per-contact batches
//! - Trailing-edge debouncing of raw store signals
//! - Journal replay or fingerprint diffing, picked per session by capability
//! - Idempotent teardown with no emission after unsubscribe returns
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cb_core::{Config, MemoryContactStore};
//! use cb_listener::{ContactsListener, StreamEvent, StreamKind};
//!
//! let store = MemoryContactStore::new();
//! let listener = ContactsListener::new(store.platform(), Config::default());
//!
//! let mut stream = listener.subscribe(StreamKind::Detailed).await;
//! while let Some(event) = stream.recv().await {
//!     println!("{}", event.to_json());
//! }
//! ```

pub mod debouncer;
pub mod diff;
pub mod error;
pub mod events;
pub mod hub;
pub mod session;
pub mod stream;

pub use debouncer::Debouncer;
pub use diff::{ChangeCursor, ChangeDiffStrategy, FingerprintDiff, JournalDiff, select_strategy};
pub use error::{ListenerError, Result};
pub use events::{ChangeKind, ContactChangeEvent, StreamError, StreamEvent, StreamKind};
pub use hub::ContactsListener;
pub use session::{ListenerSession, SessionState};
pub use stream::ContactEventStream;
