// src/core/workers/streaming.rs

//! The Streaming Worker (spec §4.4), grounded directly on
//! `LDi_bgfeaturestreamer` in `ldthreads.c` for the state machine and on
//! `ReplicaWorker::run`'s `tokio::select!`-over-a-sleep reconnect shape for
//! its Rust expression.

use super::WorkerContext;
use crate::core::lifecycle::{ClientStatus, Lifecycle};
use crate::core::persistence::Persistence;
use crate::core::store::FlagStore;
use crate::core::stream_parser::{Continuation, StreamDispatch, StreamParser};
use crate::core::transport::{StreamSink, Transport, is_auth_failure, TRANSPORT_FAILURE};
use crate::core::user::User;
use rand::Rng;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

const BACKOFF_CAP_MILLIS: u64 = 3_600_000;
const DISABLED_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Base backoff in milliseconds per spec §4.4/§9: `1000 * 2^(retries-2)`,
/// clamped to a 1000 ms floor for `retries <= 2` (the documented intent,
/// since raw integer arithmetic at `retries == 1` would otherwise compute 0).
fn base_delay_millis(retries: i64) -> u64 {
    if retries <= 2 {
        return 1000;
    }
    let shift = (retries - 2).min(40) as u32;
    1000u64.saturating_mul(1u64 << shift)
}

struct ParserSink {
    parser: Mutex<StreamParser>,
    store: Arc<FlagStore>,
    lifecycle: Arc<Lifecycle>,
    persistence: Arc<dyn Persistence>,
    user: Arc<RwLock<User>>,
    environment_name: String,
}

impl StreamSink for ParserSink {
    fn on_handle(&self, handle: u64) {
        self.lifecycle.set_stream_handle(handle);
    }

    fn on_line(&self, line: &str) -> Continuation {
        let should_stop = self.lifecycle.should_stop_streaming();
        let (continuation, dispatch) = self
            .parser
            .lock()
            .expect("stream parser lock poisoned")
            .feed_line(line, should_stop);
        if let Some(dispatch) = dispatch {
            self.handle_dispatch(dispatch);
        }
        continuation
    }
}

impl ParserSink {
    fn handle_dispatch(&self, dispatch: StreamDispatch) {
        match dispatch {
            StreamDispatch::Ping => {
                self.lifecycle.request_poll();
            }
            StreamDispatch::Put(text) => match self.store.apply_put_text(&text) {
                Ok(()) => {
                    self.lifecycle.update_status(ClientStatus::Initialized);
                    self.spawn_persist(text);
                }
                Err(e) => warn!(error = %e, "failed to parse streamed put payload"),
            },
            StreamDispatch::Patch(text) => match self.store.apply_patch_text(&text) {
                Ok(()) => self.spawn_persist_snapshot(),
                Err(e) => warn!(error = %e, "failed to parse streamed patch payload"),
            },
            StreamDispatch::Delete(text) => match self.store.apply_delete_text(&text) {
                Ok(()) => self.spawn_persist_snapshot(),
                Err(e) => warn!(error = %e, "failed to parse streamed delete payload"),
            },
        }
    }

    /// `LDi_onstreameventpatch`/`LDi_onstreameventdelete` both call
    /// `LDi_savehash(client)` after applying the incremental change, the same
    /// whole-snapshot persistence `LDi_onstreameventput` performs, so the
    /// on-disk warm-start blob never goes stale after a patch or delete.
    /// Unlike `put`, there's no already-serialized payload in hand, so the
    /// current store contents are serialized first.
    fn spawn_persist_snapshot(&self) {
        match self.store.serialize() {
            Ok(text) => self.spawn_persist(text),
            Err(e) => warn!(error = %e, "failed to serialize flag store for persistence"),
        }
    }

    /// `LDi_onstreameventput` persists the raw "put" payload synchronously
    /// after applying it; doing that from this synchronous line callback
    /// would require blocking I/O, so it's handed to a detached task instead.
    fn spawn_persist(&self, payload: String) {
        let persistence = self.persistence.clone();
        let user = self.user.clone();
        let environment_name = self.environment_name.clone();
        tokio::spawn(async move {
            let key = user.read().await.key.clone();
            if let Err(e) = persistence.save(&environment_name, &key, &payload).await {
                warn!(error = %e, "failed to persist streamed flag snapshot");
            }
        });
    }
}

pub async fn run(ctx: Arc<WorkerContext>) {
    let mut retries: i64 = 0;

    loop {
        if ctx.lifecycle.status().is_terminal() {
            ctx.lifecycle.worker_exited();
            debug!("streaming worker exiting");
            return;
        }

        if !ctx.config.streaming || ctx.lifecycle.is_offline() || ctx.lifecycle.is_background() {
            let notified = ctx.lifecycle.stream_notify.notified();
            tokio::pin!(notified);
            let _ = tokio::time::timeout(DISABLED_POLL_INTERVAL, notified).await;
            continue;
        }

        let sink = ParserSink {
            parser: Mutex::new(StreamParser::new()),
            store: ctx.store.clone(),
            lifecycle: ctx.lifecycle.clone(),
            persistence: ctx.persistence.clone(),
            user: ctx.user.clone(),
            environment_name: ctx.environment_name.clone(),
        };

        let response = ctx.transport.read_stream(&sink).await;

        if is_auth_failure(response) {
            ctx.lifecycle.update_status(ClientStatus::Failed);
            warn!("mobile key not authorized, streaming failed");
            continue;
        } else if response == TRANSPORT_FAILURE {
            if ctx.lifecycle.stream_handle() != 0 {
                retries += 1;
            } else {
                retries = 0;
            }
        }

        if retries > 0 {
            let mut backoff = base_delay_millis(retries);
            let jitter: u64 = rand::thread_rng().gen_range(0..backoff);
            backoff += jitter;
            if backoff > BACKOFF_CAP_MILLIS {
                backoff = BACKOFF_CAP_MILLIS;
                retries -= 1;
            }
            tokio::time::sleep(Duration::from_millis(backoff)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_delay_floors_at_1000ms_for_low_retries() {
        assert_eq!(base_delay_millis(0), 1000);
        assert_eq!(base_delay_millis(1), 1000);
        assert_eq!(base_delay_millis(2), 1000);
    }

    #[test]
    fn base_delay_grows_exponentially() {
        assert_eq!(base_delay_millis(3), 2000);
        assert_eq!(base_delay_millis(4), 4000);
        assert_eq!(base_delay_millis(5), 8000);
    }

    #[test]
    fn backoff_stays_capped_and_retries_stop_growing_unbounded() {
        // Mirrors the worker loop's retries/backoff bookkeeping without
        // sleeping or touching a transport, for scenario 6 (backoff cap).
        let mut retries: i64 = 0;
        let mut max_retries_seen = 0;
        for _ in 0..20 {
            retries += 1;
            let mut backoff = base_delay_millis(retries);
            let jitter = backoff - 1; // worst-case jitter, still < backoff
            backoff += jitter;
            if backoff > BACKOFF_CAP_MILLIS {
                backoff = BACKOFF_CAP_MILLIS;
                retries -= 1;
            }
            assert!(backoff <= BACKOFF_CAP_MILLIS);
            max_retries_seen = max_retries_seen.max(retries);
        }
        // Once the cap is first reached, retries no longer grows past that point.
        assert!(retries <= max_retries_seen);
    }

    #[tokio::test]
    async fn patch_and_delete_dispatches_persist_the_whole_snapshot() {
        use crate::core::persistence::FilePersistence;

        let dir = tempfile::tempdir().unwrap();
        let sink = ParserSink {
            parser: Mutex::new(StreamParser::new()),
            store: Arc::new(FlagStore::new()),
            lifecycle: Arc::new(Lifecycle::new(false, false)),
            persistence: Arc::new(FilePersistence::new(dir.path())),
            user: RwLock::new(User::new("user-1")).into(),
            environment_name: "default".to_string(),
        };

        sink.store
            .apply_put_text(r#"{"alpha":{"value":true,"version":1}}"#)
            .unwrap();
        sink.handle_dispatch(StreamDispatch::Patch(
            r#"{"alpha":{"value":false,"version":2}}"#.to_string(),
        ));

        // The persisted snapshot must reflect the patch, not the original put.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let persisted = sink.persistence.load("default", "user-1").await.unwrap().unwrap();
        assert!(persisted.contains("false"));
        assert!(persisted.contains("\"version\":2"));

        sink.handle_dispatch(StreamDispatch::Delete(
            r#"{"alpha":{"version":3}}"#.to_string(),
        ));
        tokio::time::sleep(Duration::from_millis(50)).await;
        let persisted_after_delete = sink.persistence.load("default", "user-1").await.unwrap().unwrap();
        assert!(!persisted_after_delete.contains("alpha"));
    }
}
