//! Diff engine
//!
//! Two interchangeable strategies compute the added/updated/removed set
//! between the session's baseline and the store's current state:
//!
//! - [`FingerprintDiff`]: compares structural fingerprints of full snapshots
//! - [`JournalDiff`]: replays the store's change journal from a token
//!
//! The strategy is picked once per session by [`select_strategy`].

mod fingerprint;
mod journal;

use std::collections::HashMap;

use async_trait::async_trait;
use cb_core::{ChangeToken, Config, Platform};
use tracing::info;

use crate::Result;
use crate::events::ContactChangeEvent;

pub use fingerprint::{FingerprintDiff, diff_fingerprints, fingerprint};
pub use journal::{JournalDiff, coalesce_entries};

/// Contact id to structural fingerprint
pub type FingerprintMap = HashMap<String, u64>;

/// Resumable position of a strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeCursor {
    /// Native journal position
    Token(ChangeToken),
    /// Fingerprints of the last successful snapshot
    Fingerprints(FingerprintMap),
}

/// A way of turning "the store changed" into concrete change events
#[async_trait]
pub trait ChangeDiffStrategy: Send {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Capture the starting point. Called once before the first `compute`.
    async fn establish_baseline(&mut self) -> Result<()>;

    /// Changes since the baseline. On success the baseline advances;
    /// on failure it is left untouched.
    async fn compute(&mut self) -> Result<Vec<ContactChangeEvent>>;

    /// Current baseline, if one has been established
    fn cursor(&self) -> Option<ChangeCursor>;
}

/// Pick the diff strategy for a new detailed session
pub fn select_strategy(platform: &Platform, config: &Config) -> Box<dyn ChangeDiffStrategy> {
    let journal = if config.listener.prefer_journal {
        platform.available_journal()
    } else {
        None
    };

    let strategy: Box<dyn ChangeDiffStrategy> = match journal {
        Some(journal) => Box::new(JournalDiff::new(
            journal,
            platform.store.clone(),
            config.listener.token_loss,
            config.fingerprint,
        )),
        None => Box::new(FingerprintDiff::new(
            platform.store.clone(),
            config.fingerprint,
        )),
    };

    info!("Selected {} diff strategy", strategy.name());
    strategy
}
