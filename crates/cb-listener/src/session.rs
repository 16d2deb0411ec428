//! Listener session
//!
//! One session per subscription. A session wires a change source to its
//! debouncer and, for detailed streams, to a diff strategy it owns
//! exclusively:
//!
//! ```text
//! change source -> pump task -> debouncer -> worker task -> sink
//! ```
//!
//! The worker task is the only place the strategy (and therefore the
//! baseline) is touched, so processing cycles never overlap. Every emission
//! is gated on the session still being live, checked under the sink lock
//! after the diff work has finished.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use cb_core::{Config, ObserverRegistration, Platform, SignalSender, SourceSignal};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::debouncer::Debouncer;
use crate::diff::{ChangeDiffStrategy, select_strategy};
use crate::events::{StreamEvent, StreamKind};
use crate::stream::EventSink;
use crate::{ListenerError, Result};

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No subscriber
    Idle,
    /// Permission check and baseline capture in progress
    Initializing,
    /// Observer registered, waiting for signals
    Active,
    /// A signal arrived and the quiet period is running
    Debouncing,
    /// A processing cycle is in flight
    Processing,
    /// Torn down; terminal
    Reset,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Initializing => "initializing",
            SessionState::Active => "active",
            SessionState::Debouncing => "debouncing",
            SessionState::Processing => "processing",
            SessionState::Reset => "reset",
        };
        f.write_str(name)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

struct SessionInner {
    id: Uuid,
    kind: StreamKind,
    // Lock order: sink, then state
    sink: Mutex<Option<EventSink>>,
    state: Mutex<SessionState>,
    debouncer: Arc<Debouncer>,
    registration: Mutex<Option<Box<dyn ObserverRegistration>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionInner {
    fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    async fn initialize(
        self: &Arc<Self>,
        platform: &Platform,
        config: &Config,
        wake: mpsc::UnboundedReceiver<()>,
    ) -> Result<()> {
        if !platform.permissions.has_read_permission() {
            return Err(ListenerError::PermissionDenied);
        }

        let (signals, signal_rx) = SignalSender::channel();
        let registration = platform.source.register(signals).map_err(|e| match e {
            cb_core::Error::Registration(reason) => ListenerError::ObserverRegistration(reason),
            other => ListenerError::ObserverRegistration(other.to_string()),
        })?;
        *lock(&self.registration) = Some(registration);

        // Signals arriving while the baseline is captured stay queued
        let strategy = if self.kind.is_detailed() {
            let mut strategy = select_strategy(platform, config);
            strategy.establish_baseline().await.map_err(|e| match e {
                ListenerError::PermissionDenied => ListenerError::PermissionDenied,
                other => ListenerError::Initialization(other.to_string()),
            })?;
            Some(strategy)
        } else {
            None
        };

        let pump = tokio::spawn(pump(Arc::downgrade(self), signal_rx));
        let worker = tokio::spawn(work(Arc::downgrade(self), wake, strategy));
        lock(&self.tasks).extend([pump, worker]);

        let mut state = lock(&self.state);
        if *state == SessionState::Initializing {
            *state = SessionState::Active;
        }
        Ok(())
    }

    /// Deliver the single error payload, then tear down
    fn fail(&self, err: &ListenerError) {
        match err {
            ListenerError::PermissionDenied => {
                warn!(session = %self.id, stream = %self.kind, "Subscription refused: {}", err)
            }
            _ => error!(session = %self.id, stream = %self.kind, "Subscription failed: {}", err),
        }

        if let Some(sink) = lock(&self.sink).take() {
            let _ = sink.send(StreamEvent::Error(err.to_stream_error()));
        }
        self.reset();
    }

    fn on_change_signal(&self) {
        {
            let mut state = lock(&self.state);
            match *state {
                SessionState::Reset => return,
                SessionState::Active => *state = SessionState::Debouncing,
                _ => {}
            }
        }
        debug!(session = %self.id, "Change signal received");
        self.debouncer.on_signal();
    }

    /// Enter `Processing`. False once the session is reset.
    fn begin_cycle(&self) -> bool {
        let mut state = lock(&self.state);
        if *state == SessionState::Reset {
            return false;
        }
        *state = SessionState::Processing;
        true
    }

    fn end_cycle(&self) {
        let mut state = lock(&self.state);
        if *state == SessionState::Processing {
            *state = if self.debouncer.is_pending() {
                SessionState::Debouncing
            } else {
                SessionState::Active
            };
        }
    }

    fn emit(&self, event: StreamEvent) {
        let sink = lock(&self.sink);
        if *lock(&self.state) == SessionState::Reset {
            return;
        }
        let Some(sink) = sink.as_ref() else {
            return;
        };
        if sink.send(event).is_err() {
            debug!(session = %self.id, "Subscriber dropped its stream");
        }
    }

    fn reset(&self) {
        let sink = {
            let mut sink = lock(&self.sink);
            let mut state = lock(&self.state);
            if *state == SessionState::Reset {
                return;
            }
            *state = SessionState::Reset;
            sink.take()
        };

        self.debouncer.cancel();
        if let Some(mut registration) = lock(&self.registration).take() {
            registration.unregister();
        }
        drop(sink);
        // The worker owns the strategy; aborting it drops the baseline
        for task in lock(&self.tasks).drain(..) {
            task.abort();
        }

        info!(session = %self.id, stream = %self.kind, "Listener session reset");
    }
}

/// Forward raw source signals into the session
async fn pump(weak: Weak<SessionInner>, mut signals: mpsc::UnboundedReceiver<SourceSignal>) {
    while let Some(signal) = signals.recv().await {
        let Some(session) = weak.upgrade() else {
            break;
        };
        match signal {
            SourceSignal::Changed => session.on_change_signal(),
            SourceSignal::PermissionRevoked => {
                warn!(session = %session.id, "Read permission revoked");
                session.reset();
                break;
            }
        }
    }
}

/// Run one processing cycle per debounce fire, strictly one at a time
async fn work(
    weak: Weak<SessionInner>,
    mut wake: mpsc::UnboundedReceiver<()>,
    mut strategy: Option<Box<dyn ChangeDiffStrategy>>,
) {
    while wake.recv().await.is_some() {
        // Fires queued behind a long cycle collapse into this one
        while wake.try_recv().is_ok() {}

        let Some(session) = weak.upgrade() else {
            break;
        };
        if !session.begin_cycle() {
            break;
        }

        match strategy.as_mut() {
            None => session.emit(StreamEvent::Changed),
            Some(strategy) => match strategy.compute().await {
                Ok(events) if events.is_empty() => {
                    debug!(session = %session.id, "Cycle produced no changes")
                }
                Ok(events) => {
                    debug!(session = %session.id, "Emitting {} changes", events.len());
                    session.emit(StreamEvent::Changes(events));
                }
                Err(e) => {
                    warn!(
                        session = %session.id,
                        strategy = strategy.name(),
                        "Processing cycle failed, baseline kept: {}",
                        e
                    );
                }
            },
        }

        session.end_cycle();
    }
}

/// Handle to a live listener session. Dropping it resets the session.
pub struct ListenerSession {
    inner: Arc<SessionInner>,
}

impl ListenerSession {
    /// Start a session that emits into `sink`.
    ///
    /// On failure the error payload is sent to `sink`, the sink is dropped,
    /// and nothing is left registered.
    pub(crate) async fn start(
        platform: &Platform,
        config: &Config,
        kind: StreamKind,
        sink: EventSink,
    ) -> Result<Self> {
        let (wake_tx, wake_rx) = mpsc::unbounded_channel();
        let debouncer = Debouncer::new(
            Duration::from_millis(config.listener.debounce_ms),
            Handle::current(),
            move || {
                let _ = wake_tx.send(());
            },
        );

        let inner = Arc::new(SessionInner {
            id: Uuid::new_v4(),
            kind,
            sink: Mutex::new(Some(sink)),
            state: Mutex::new(SessionState::Initializing),
            debouncer,
            registration: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        });

        info!(session = %inner.id, stream = %kind, "Starting listener session");

        match inner.initialize(platform, config, wake_rx).await {
            Ok(()) => {
                info!(session = %inner.id, stream = %kind, "Listener session active");
                Ok(Self { inner })
            }
            Err(e) => {
                inner.fail(&e);
                Err(e)
            }
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn kind(&self) -> StreamKind {
        self.inner.kind
    }

    pub fn state(&self) -> SessionState {
        self.inner.state()
    }

    /// Whether the session can still emit
    pub fn is_live(&self) -> bool {
        self.state() != SessionState::Reset
    }

    /// Tear the session down. Idempotent.
    ///
    /// Once this returns no further payload reaches the stream.
    pub fn reset(&self) {
        self.inner.reset();
    }
}

impl fmt::Debug for ListenerSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerSession")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("state", &self.inner.state())
            .finish()
    }
}

impl Drop for ListenerSession {
    fn drop(&mut self) {
        self.inner.reset();
    }
}
