// src/core/workers/mod.rs

//! The three background workers (spec §2, §4.4-§4.6) and the shared context
//! each one closes over. Grounded on `LDi_bgfeaturestreamer`,
//! `LDi_bgfeaturepoller`, `LDi_bgeventsender` in `ldthreads.c`; the
//! reconnect-loop shape is grounded on
//! `core::replication::worker::ReplicaWorker::run`.

pub mod event_sender;
pub mod polling;
pub mod streaming;

use crate::config::ClientConfig;
use crate::core::event_buffer::EventBuffer;
use crate::core::lifecycle::Lifecycle;
use crate::core::persistence::Persistence;
use crate::core::store::FlagStore;
use crate::core::transport::Transport;
use crate::core::user::User;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Everything a worker needs, without needing a back-reference to `Client`
/// itself. Each worker task owns a clone of this (cheap: every field is an
/// `Arc` or a plain value).
pub struct WorkerContext {
    pub environment_name: String,
    pub config: Arc<ClientConfig>,
    pub user: Arc<RwLock<User>>,
    pub store: Arc<FlagStore>,
    pub lifecycle: Arc<Lifecycle>,
    pub event_buffer: Arc<dyn EventBuffer>,
    pub transport: Arc<dyn Transport>,
    pub persistence: Arc<dyn Persistence>,
}
