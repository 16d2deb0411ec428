//! Contacts listener hub
//!
//! Owns the two subscription slots (simple and detailed). Each slot holds at
//! most one live session; subscribing to an occupied slot replaces it.

use std::sync::Arc;

use cb_core::{Config, Platform};
use dashmap::DashMap;
use tracing::{debug, info};

use crate::events::StreamKind;
use crate::session::{ListenerSession, SessionState};
use crate::stream::{ContactEventStream, event_channel};

/// Entry point for subscribing to contact changes
pub struct ContactsListener {
    platform: Platform,
    config: Arc<Config>,
    sessions: DashMap<StreamKind, ListenerSession>,
}

impl ContactsListener {
    pub fn new(platform: Platform, config: Config) -> Self {
        Self {
            platform,
            config: Arc::new(config),
            sessions: DashMap::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Current read-access grant, without prompting
    pub fn has_read_permission(&self) -> bool {
        self.platform.permissions.has_read_permission()
    }

    /// Open the stream for `kind`.
    ///
    /// A failed start is reported on the returned stream as a single error
    /// payload, after which the stream ends.
    pub async fn subscribe(&self, kind: StreamKind) -> ContactEventStream {
        if self.unsubscribe(kind) {
            info!(stream = %kind, "Replacing existing subscription");
        }

        let (sink, stream) = event_channel(kind);
        match ListenerSession::start(&self.platform, &self.config, kind, sink).await {
            Ok(session) => {
                // A concurrent subscribe may have filled the slot meanwhile
                if let Some(previous) = self.sessions.insert(kind, session) {
                    previous.reset();
                }
            }
            Err(e) => debug!(stream = %kind, "Subscription not started: {}", e),
        }
        stream
    }

    /// Tear down the subscription for `kind`. Idempotent; returns whether
    /// a session was removed.
    pub fn unsubscribe(&self, kind: StreamKind) -> bool {
        match self.sessions.remove(&kind) {
            Some((_, session)) => {
                session.reset();
                info!(stream = %kind, session = %session.id(), "Unsubscribed");
                true
            }
            None => false,
        }
    }

    /// Whether `kind` has a session that can still emit
    pub fn is_subscribed(&self, kind: StreamKind) -> bool {
        self.sessions
            .get(&kind)
            .map(|session| session.is_live())
            .unwrap_or(false)
    }

    /// State of the session in slot `kind`
    pub fn state(&self, kind: StreamKind) -> SessionState {
        self.sessions
            .get(&kind)
            .map(|session| session.state())
            .unwrap_or(SessionState::Idle)
    }

    /// Tear down every subscription
    pub fn shutdown(&self) {
        for kind in StreamKind::ALL {
            self.unsubscribe(kind);
        }
        info!("Contacts listener shut down");
    }
}

impl Drop for ContactsListener {
    fn drop(&mut self) {
        for kind in StreamKind::ALL {
            self.unsubscribe(kind);
        }
    }
}
