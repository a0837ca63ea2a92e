// src/core/lifecycle.rs

//! The Lifecycle Controller (spec §3, §4.1): client status, the flags the
//! workers read every iteration, the opaque stream handle, and the
//! dedicated `Notify` per condition variable used to wake each worker.
//!
//! Grounded on `LDi_updatestatus`, `LDClientSetOffline/Online/Background`,
//! `clientCloseIsolated`, `LDClientAwaitInitialized` in `client.c`, and on
//! `ServerState`'s mix of atomics and async locks for composed client state.
//!
//! Status itself is guarded by a plain `std::sync::RwLock` rather than
//! `tokio::sync::RwLock`: every critical section here is a field read/write
//! plus a synchronous callback invocation, never an `.await`, which lets the
//! streaming worker's line callback (necessarily synchronous, see
//! `workers::streaming`) call `update_status` directly.

use std::sync::Arc;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use strum_macros::Display;
use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ClientStatus {
    Initializing,
    Initialized,
    ShuttingDown,
    Failed,
}

impl ClientStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ClientStatus::ShuttingDown | ClientStatus::Failed)
    }
}

/// Invoked whenever `update_status` observes an actual status change, with
/// no lifecycle lock held.
pub type StatusCallback = Arc<dyn Fn(ClientStatus) + Send + Sync>;

pub struct Lifecycle {
    status: RwLock<ClientStatus>,
    status_callback: RwLock<Option<StatusCallback>>,
    offline: AtomicBool,
    background: AtomicBool,
    should_stop_streaming: AtomicBool,
    stream_handle: AtomicU64,
    worker_count: AtomicUsize,
    poll_requested: AtomicBool,
    pub init_notify: Notify,
    pub event_notify: Notify,
    pub poll_notify: Notify,
    pub stream_notify: Notify,
}

const WORKER_COUNT: usize = 3;

impl Lifecycle {
    pub fn new(offline: bool, background: bool) -> Self {
        Self {
            status: RwLock::new(ClientStatus::Initializing),
            status_callback: RwLock::new(None),
            offline: AtomicBool::new(offline),
            background: AtomicBool::new(background),
            should_stop_streaming: AtomicBool::new(background),
            stream_handle: AtomicU64::new(0),
            worker_count: AtomicUsize::new(WORKER_COUNT),
            poll_requested: AtomicBool::new(false),
            init_notify: Notify::new(),
            event_notify: Notify::new(),
            poll_notify: Notify::new(),
            stream_notify: Notify::new(),
        }
    }

    pub fn set_status_callback(&self, callback: StatusCallback) {
        *self.status_callback.write().expect("lifecycle lock poisoned") = Some(callback);
    }

    pub fn status(&self) -> ClientStatus {
        *self.status.read().expect("lifecycle lock poisoned")
    }

    /// Updates status under the write lock; only if it actually changes does
    /// it invoke the status callback (with the lock already released), and
    /// the initialization condition is always signaled regardless, so
    /// external `await_initialized` callers always re-check.
    pub fn update_status(&self, new: ClientStatus) {
        let changed = {
            let mut guard = self.status.write().expect("lifecycle lock poisoned");
            if *guard != new {
                *guard = new;
                true
            } else {
                false
            }
        };
        if changed {
            tracing::debug!(status = %new, "client status changed");
            let callback = self.status_callback.read().expect("lifecycle lock poisoned").clone();
            if let Some(callback) = callback {
                callback(new);
            }
        }
        self.init_notify.notify_waiters();
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
        self.poll_notify.notify_waiters();
        self.stream_notify.notify_waiters();
    }

    pub fn is_background(&self) -> bool {
        self.background.load(Ordering::SeqCst)
    }

    /// Sets the background flag and, matching `LDi_startstopstreaming`,
    /// should-stop-streaming follows it and both the polling and streaming
    /// conditions are signaled.
    pub fn set_background(&self, background: bool) {
        self.background.store(background, Ordering::SeqCst);
        self.should_stop_streaming.store(background, Ordering::SeqCst);
        self.poll_notify.notify_waiters();
        self.stream_notify.notify_waiters();
    }

    pub fn should_stop_streaming(&self) -> bool {
        self.should_stop_streaming.load(Ordering::SeqCst)
    }

    /// Records a "ping" stream dispatch and wakes the polling worker to fetch
    /// a full snapshot out of band (spec §4.3), independent of its configured
    /// interval.
    pub fn request_poll(&self) {
        self.poll_requested.store(true, Ordering::SeqCst);
        self.poll_notify.notify_waiters();
    }

    /// Consumed once per polling-worker iteration.
    pub fn take_poll_request(&self) -> bool {
        self.poll_requested.swap(false, Ordering::SeqCst)
    }

    pub fn stream_handle(&self) -> u64 {
        self.stream_handle.load(Ordering::SeqCst)
    }

    pub fn set_stream_handle(&self, handle: u64) {
        self.stream_handle.store(handle, Ordering::SeqCst);
    }

    /// Atomically reads and clears the live stream handle, returning the
    /// handle that was live (0 if none), for the caller to cancel.
    pub fn take_stream_handle(&self) -> u64 {
        self.stream_handle.swap(0, Ordering::SeqCst)
    }

    /// Signals both the polling and streaming conditions, used after
    /// cancelling any live stream on re-identify or close.
    pub fn signal_reconnect(&self) {
        self.poll_notify.notify_waiters();
        self.stream_notify.notify_waiters();
    }

    pub fn signal_close(&self) {
        self.init_notify.notify_waiters();
        self.event_notify.notify_waiters();
        self.poll_notify.notify_waiters();
        self.stream_notify.notify_waiters();
    }

    /// Called by each of the three workers on observing a terminal status;
    /// when the last worker exits the initialization condition is signaled
    /// so any in-progress `close()` / `await_initialized()` notices.
    pub fn worker_exited(&self) {
        if self.worker_count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.init_notify.notify_waiters();
        }
    }

    pub async fn await_initialized(&self, timeout: Duration) -> bool {
        let notified = self.init_notify.notified();
        tokio::pin!(notified);
        if self.status() == ClientStatus::Initialized {
            return true;
        }
        let _ = tokio::time::timeout(timeout, notified).await;
        self.status() == ClientStatus::Initialized
    }

    pub fn is_initialized(&self) -> bool {
        self.status() == ClientStatus::Initialized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn await_initialized_returns_true_immediately_when_already_initialized() {
        let lifecycle = Lifecycle::new(false, false);
        lifecycle.update_status(ClientStatus::Initialized);
        assert!(lifecycle.await_initialized(Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn await_initialized_returns_false_on_timeout_when_failed() {
        let lifecycle = Lifecycle::new(false, false);
        lifecycle.update_status(ClientStatus::Failed);
        assert!(!lifecycle.await_initialized(Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn await_initialized_wakes_on_status_change() {
        let lifecycle = Arc::new(Lifecycle::new(false, false));
        let bg = lifecycle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            bg.update_status(ClientStatus::Initialized);
        });
        assert!(lifecycle.await_initialized(Duration::from_secs(1)).await);
    }

    #[test]
    fn set_background_sets_should_stop_streaming() {
        let lifecycle = Lifecycle::new(false, false);
        assert!(!lifecycle.should_stop_streaming());
        lifecycle.set_background(true);
        assert!(lifecycle.should_stop_streaming());
    }

    #[test]
    fn take_stream_handle_clears_it() {
        let lifecycle = Lifecycle::new(false, false);
        lifecycle.set_stream_handle(42);
        assert_eq!(lifecycle.take_stream_handle(), 42);
        assert_eq!(lifecycle.stream_handle(), 0);
    }
}
