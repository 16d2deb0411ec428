//! Signal debouncer
//!
//! Coalesces a burst of signals into one callback that runs once the burst
//! has been quiet for the configured period. Each signal supersedes the
//! timer scheduled by the previous one; only the last timer of a burst fires.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

/// Quiet period used when none is configured
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(300);

type FireFn = dyn Fn() + Send + Sync;

#[derive(Default)]
struct Slot {
    generation: u64,
    pending: Option<JoinHandle<()>>,
    cancelled: bool,
}

/// Trailing-edge debouncer backed by tokio timers
pub struct Debouncer {
    quiet: Duration,
    runtime: Handle,
    on_fire: Box<FireFn>,
    slot: Mutex<Slot>,
}

impl Debouncer {
    /// Create a debouncer whose timers run on `runtime`.
    ///
    /// `on_fire` runs on a timer task and should hand work off rather than do it inline.
    pub fn new<F>(quiet: Duration, runtime: Handle, on_fire: F) -> Arc<Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        Arc::new(Self {
            quiet,
            runtime,
            on_fire: Box::new(on_fire),
            slot: Mutex::new(Slot::default()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Restart the quiet period. Safe from any thread, at any rate.
    pub fn on_signal(self: &Arc<Self>) {
        let mut slot = self.lock();
        if slot.cancelled {
            return;
        }

        if let Some(previous) = slot.pending.take() {
            previous.abort();
        }
        slot.generation = slot.generation.wrapping_add(1);

        let generation = slot.generation;
        let quiet = self.quiet;
        let weak: Weak<Self> = Arc::downgrade(self);

        slot.pending = Some(self.runtime.spawn(async move {
            tokio::time::sleep(quiet).await;
            if let Some(debouncer) = weak.upgrade() {
                debouncer.fire(generation);
            }
        }));
    }

    fn fire(&self, generation: u64) {
        {
            let mut slot = self.lock();
            // Superseded by a later signal, or cancelled while sleeping
            if slot.cancelled || slot.generation != generation {
                return;
            }
            slot.pending = None;
        }

        debug!("Debounce window closed (generation {})", generation);
        (self.on_fire)();
    }

    /// Cancel the pending timer and refuse further signals. Idempotent.
    ///
    /// A timer that already passed its generation check is not interrupted.
    pub fn cancel(&self) {
        let mut slot = self.lock();
        slot.cancelled = true;
        slot.generation = slot.generation.wrapping_add(1);
        if let Some(pending) = slot.pending.take() {
            pending.abort();
        }
    }

    /// Whether a timer is currently scheduled
    pub fn is_pending(&self) -> bool {
        self.lock().pending.is_some()
    }

    pub fn is_cancelled(&self) -> bool {
        self.lock().cancelled
    }

    pub fn quiet_period(&self) -> Duration {
        self.quiet
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        let slot = self.slot.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(pending) = slot.pending.take() {
            pending.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    fn counting(quiet: Duration) -> (Arc<Debouncer>, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let debouncer = Debouncer::new(quiet, Handle::current(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (debouncer, count)
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_signal_fires_once() {
        let (debouncer, count) = counting(Duration::from_millis(300));

        debouncer.on_signal();
        assert!(debouncer.is_pending());

        tokio::time::sleep(Duration::from_millis(299)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_into_one_fire() {
        let (debouncer, count) = counting(Duration::from_millis(300));

        for _ in 0..20 {
            debouncer.on_signal();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fire_follows_last_signal() {
        let fired_at = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&fired_at);
        let debouncer = Debouncer::new(Duration::from_millis(300), Handle::current(), move || {
            *slot.lock().unwrap() = Some(Instant::now());
        });

        debouncer.on_signal();
        tokio::time::sleep(Duration::from_millis(200)).await;
        debouncer.on_signal();
        let last_signal = Instant::now();

        tokio::time::sleep(Duration::from_secs(1)).await;
        let fired = fired_at.lock().unwrap().expect("debouncer fired");
        let waited = fired - last_signal;
        assert!(waited >= Duration::from_millis(300));
        assert!(waited < Duration::from_millis(310));
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_bursts_fire_separately() {
        let (debouncer, count) = counting(Duration::from_millis(300));

        debouncer.on_signal();
        tokio::time::sleep(Duration::from_millis(500)).await;
        debouncer.on_signal();
        debouncer.on_signal();
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_pending_fire() {
        let (debouncer, count) = counting(Duration::from_millis(300));

        debouncer.on_signal();
        tokio::time::sleep(Duration::from_millis(100)).await;
        debouncer.cancel();
        assert!(!debouncer.is_pending());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_idempotent_and_final() {
        let (debouncer, count) = counting(Duration::from_millis(300));

        debouncer.cancel();
        debouncer.cancel();
        assert!(debouncer.is_cancelled());

        debouncer.on_signal();
        assert!(!debouncer.is_pending());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_signals_from_many_threads() {
        let (debouncer, count) = counting(Duration::from_millis(150));

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let debouncer = Arc::clone(&debouncer);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        debouncer.on_signal();
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
