// src/core/client.rs

//! `Client`: the public surface (spec §6) composing the Flag Store, the
//! Lifecycle Controller, and the three background workers over a shared
//! Transport/Persistence/EventBuffer. One `Client` is built per environment
//! by `registry::ClientRegistry`; most callers reach it through the
//! registry rather than constructing it directly.

use crate::config::ClientConfig;
use crate::core::errors::FlagsError;
use crate::core::event_buffer::EventBuffer;
use crate::core::lifecycle::{ClientStatus, Lifecycle, StatusCallback};
use crate::core::persistence::Persistence;
use crate::core::store::FlagStore;
use crate::core::store::listener::{Listener, ListenerId};
use crate::core::transport::Transport;
use crate::core::user::User;
use crate::core::value::{ErrorKind, FlagValue, VariationDetail};
use crate::core::workers::{self, WorkerContext};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

struct ClientHandles {
    event: JoinHandle<()>,
    polling: JoinHandle<()>,
    streaming: JoinHandle<()>,
}

pub struct Client {
    environment_name: String,
    config: Arc<ClientConfig>,
    shared_user: Arc<RwLock<User>>,
    store: Arc<FlagStore>,
    lifecycle: Arc<Lifecycle>,
    event_buffer: Arc<dyn EventBuffer>,
    transport: Arc<dyn Transport>,
    persistence: Arc<dyn Persistence>,
    handles: std::sync::Mutex<Option<ClientHandles>>,
}

impl Client {
    pub(crate) fn spawn(
        environment_name: String,
        config: Arc<ClientConfig>,
        shared_user: Arc<RwLock<User>>,
        transport: Arc<dyn Transport>,
        persistence: Arc<dyn Persistence>,
        event_buffer: Arc<dyn EventBuffer>,
    ) -> Arc<Self> {
        let offline = config.offline;
        let client = Arc::new(Self {
            environment_name,
            lifecycle: Arc::new(Lifecycle::new(offline, false)),
            store: Arc::new(FlagStore::new()),
            config,
            shared_user,
            event_buffer,
            transport,
            persistence,
            handles: std::sync::Mutex::new(None),
        });
        client.start_workers();
        client
    }

    fn start_workers(self: &Arc<Self>) {
        let ctx = Arc::new(WorkerContext {
            environment_name: self.environment_name.clone(),
            config: self.config.clone(),
            user: self.shared_user.clone(),
            store: self.store.clone(),
            lifecycle: self.lifecycle.clone(),
            event_buffer: self.event_buffer.clone(),
            transport: self.transport.clone(),
            persistence: self.persistence.clone(),
        });
        let event = tokio::spawn(workers::event_sender::run(ctx.clone()));
        let polling = tokio::spawn(workers::polling::run(ctx.clone()));
        let streaming = tokio::spawn(workers::streaming::run(ctx));
        *self.handles.lock().expect("handles lock poisoned") = Some(ClientHandles {
            event,
            polling,
            streaming,
        });
    }

    pub fn environment_name(&self) -> &str {
        &self.environment_name
    }

    pub fn set_status_callback(&self, callback: StatusCallback) {
        self.lifecycle.set_status_callback(callback);
    }

    pub fn is_initialized(&self) -> bool {
        self.lifecycle.is_initialized()
    }

    pub async fn await_initialized(&self, timeout: Duration) -> bool {
        self.lifecycle.await_initialized(timeout).await
    }

    pub fn is_offline(&self) -> bool {
        self.lifecycle.is_offline()
    }

    pub fn set_offline(&self) {
        self.lifecycle.set_offline(true);
    }

    pub fn set_online(&self) {
        self.lifecycle.set_offline(false);
        self.lifecycle.update_status(ClientStatus::Initializing);
    }

    pub fn set_background(&self, background: bool) {
        self.lifecycle.set_background(background);
        if background {
            self.cancel_active_stream();
        }
    }

    /// Reads and clears the live stream handle, then cancels it via the
    /// transport — the Rust expression of `LDi_reinitializeconnection`'s
    /// handle cancellation (spec §9 "opaque stream handle").
    fn cancel_active_stream(&self) {
        let handle = self.lifecycle.take_stream_handle();
        if handle != 0 {
            let transport = self.transport.clone();
            tokio::spawn(async move {
                transport.cancel_read(handle).await;
            });
        }
    }

    /// Called by the registry for every client after the shared user is
    /// replaced (spec §4.1's `identify`): transitions to Initializing,
    /// cancels and reconnects, and tells the event buffer about the new user.
    pub(crate) async fn identify_locally(&self) {
        self.lifecycle.update_status(ClientStatus::Initializing);
        self.cancel_active_stream();
        self.lifecycle.signal_reconnect();
        let user = self.shared_user.read().await.clone();
        self.event_buffer.enqueue_identify(&user).await;
    }

    /// Signals the event worker without waiting for completion, matching
    /// `LDClientFlush`.
    pub fn flush(&self) {
        self.lifecycle.event_notify.notify_waiters();
    }

    pub async fn close(&self) {
        self.lifecycle.update_status(ClientStatus::ShuttingDown);
        self.cancel_active_stream();
        self.lifecycle.signal_close();

        let handles = self.handles.lock().expect("handles lock poisoned").take();
        if let Some(handles) = handles {
            let _ = handles.event.await;
            let _ = handles.polling.await;
            let _ = handles.streaming.await;
        }
    }

    pub fn all_flags(&self) -> HashMap<String, FlagValue> {
        self.store
            .get_all()
            .into_iter()
            .map(|record| (record.key.clone(), record.value.clone()))
            .collect()
    }

    pub async fn save_flags(&self) -> Result<(), FlagsError> {
        let text = self.store.serialize()?;
        let key = self.shared_user.read().await.key.clone();
        self.persistence.save(&self.environment_name, &key, &text).await
    }

    pub async fn restore_flags(&self) -> Result<(), FlagsError> {
        let key = self.shared_user.read().await.key.clone();
        if let Some(text) = self.persistence.load(&self.environment_name, &key).await? {
            self.store.restore(&text)?;
        }
        Ok(())
    }

    pub fn register_listener(&self, key: &str, listener: Listener) -> ListenerId {
        self.store.register_listener(key, listener)
    }

    pub fn unregister_listener(&self, key: &str, id: ListenerId) {
        self.store.unregister_listener(key, id);
    }

    pub fn track(&self, name: &str) {
        self.enqueue_track(name, None, None, false);
    }

    pub fn track_data(&self, name: &str, data: JsonValue) {
        self.enqueue_track(name, Some(data), None, false);
    }

    pub fn track_metric(&self, name: &str, data: JsonValue, metric: f64) {
        self.enqueue_track(name, Some(data), Some(metric), true);
    }

    fn enqueue_track(&self, name: &str, data: Option<JsonValue>, metric: Option<f64>, has_metric: bool) {
        let event_buffer = self.event_buffer.clone();
        let name = name.to_string();
        tokio::spawn(async move {
            event_buffer.enqueue_track(&name, data, metric, has_metric).await;
        });
    }

    pub fn bool_variation(&self, key: &str, default: bool) -> bool {
        self.bool_variation_detail(key, default).value.as_bool().unwrap_or(default)
    }

    pub fn bool_variation_detail(&self, key: &str, default: bool) -> VariationDetail {
        self.variation_detail(key, FlagValue::Bool(default), |value| value.is_boolean())
    }

    pub fn int_variation(&self, key: &str, default: i64) -> i64 {
        self.int_variation_detail(key, default).value.as_i64().unwrap_or(default)
    }

    pub fn int_variation_detail(&self, key: &str, default: i64) -> VariationDetail {
        self.variation_detail(key, FlagValue::from(default), |value| value.is_i64() || value.is_u64())
    }

    pub fn double_variation(&self, key: &str, default: f64) -> f64 {
        self.double_variation_detail(key, default).value.as_f64().unwrap_or(default)
    }

    pub fn double_variation_detail(&self, key: &str, default: f64) -> VariationDetail {
        self.variation_detail(key, FlagValue::from(default), |value| value.is_number())
    }

    pub fn text_variation(&self, key: &str, default: &str) -> String {
        self.text_variation_detail(key, default)
            .value
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| default.to_string())
    }

    pub fn text_variation_detail(&self, key: &str, default: &str) -> VariationDetail {
        self.variation_detail(key, FlagValue::from(default), |value| value.is_string())
    }

    pub fn json_variation(&self, key: &str, default: FlagValue) -> FlagValue {
        self.json_variation_detail(key, default).value
    }

    pub fn json_variation_detail(&self, key: &str, default: FlagValue) -> VariationDetail {
        self.variation_detail(key, default, |_| true)
    }

    /// The shared taxonomy behind every typed variation lookup (spec §6's
    /// "Reason/error taxonomy in variation-detail"), parameterized by a
    /// type-compatibility predicate for the requested type.
    fn variation_detail(
        &self,
        key: &str,
        default: FlagValue,
        type_matches: impl Fn(&FlagValue) -> bool,
    ) -> VariationDetail {
        if key.is_empty() {
            let detail = VariationDetail::error(default.clone(), ErrorKind::FlagNotSpecified);
            self.record_evaluation(key, &detail, &default);
            return detail;
        }

        let detail = match self.store.get(key) {
            None => VariationDetail::error(default.clone(), ErrorKind::FlagNotFound),
            Some(record) if !type_matches(&record.value) => {
                VariationDetail::error(default.clone(), ErrorKind::WrongType)
            }
            Some(record) => VariationDetail {
                value: record.value.clone(),
                variation_index: record.variation_index.unwrap_or(-1),
                reason: record.reason.clone(),
            },
        };
        self.record_evaluation(key, &detail, &default);
        detail
    }

    fn record_evaluation(&self, key: &str, detail: &VariationDetail, default: &FlagValue) {
        let event_buffer = self.event_buffer.clone();
        let key = key.to_string();
        let value = detail.value.clone();
        let variation_index = Some(detail.variation_index);
        let reason = detail.reason.clone();
        let default = default.clone();
        tokio::spawn(async move {
            event_buffer
                .enqueue_evaluation(&key, &value, variation_index, reason.as_ref(), &default)
                .await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event_buffer::DefaultEventBuffer;
    use crate::core::persistence::FilePersistence;
    use crate::core::transport::{ResponseCode, StreamSink};

    struct OfflineTransport;

    #[async_trait::async_trait]
    impl Transport for OfflineTransport {
        async fn fetch_flag_snapshot(&self) -> (ResponseCode, Option<String>) {
            (-1, None)
        }
        async fn send_events(&self, _batch_text: String) -> ResponseCode {
            -1
        }
        async fn read_stream(&self, _sink: &dyn StreamSink) -> ResponseCode {
            -1
        }
        async fn cancel_read(&self, _handle: u64) {}
    }

    fn test_client() -> Arc<Client> {
        let config = Arc::new(ClientConfig {
            offline: true,
            ..ClientConfig::for_mobile_key("test-key")
        });
        let dir = tempfile::tempdir().unwrap();
        Client::spawn(
            "default".to_string(),
            config,
            Arc::new(RwLock::new(User::new("user-1"))),
            Arc::new(OfflineTransport),
            Arc::new(FilePersistence::new(dir.into_path())),
            Arc::new(DefaultEventBuffer::new()),
        )
    }

    #[tokio::test]
    async fn type_mismatch_detail_returns_fallback_and_wrong_type_reason() {
        let client = test_client();
        client
            .store
            .apply_put_text(r#"{"beta":{"value":"s","version":1}}"#)
            .unwrap();
        let detail = client.bool_variation_detail("beta", false);
        assert_eq!(detail.value, FlagValue::Bool(false));
        assert_eq!(detail.variation_index, -1);
        assert_eq!(
            detail.reason,
            Some(serde_json::json!({"kind": "ERROR", "errorKind": "WRONG_TYPE"}))
        );
        client.close().await;
    }

    #[tokio::test]
    async fn missing_flag_key_reports_flag_not_specified() {
        let client = test_client();
        let detail = client.bool_variation_detail("", true);
        assert_eq!(detail.variation_index, -1);
        assert_eq!(
            detail.reason,
            Some(serde_json::json!({"kind": "ERROR", "errorKind": "FLAG_NOT_SPECIFIED"}))
        );
        client.close().await;
    }

    #[tokio::test]
    async fn unknown_flag_reports_flag_not_found() {
        let client = test_client();
        let detail = client.bool_variation_detail("missing", true);
        assert_eq!(
            detail.reason,
            Some(serde_json::json!({"kind": "ERROR", "errorKind": "FLAG_NOT_FOUND"}))
        );
        client.close().await;
    }

    #[tokio::test]
    async fn close_returns_after_all_workers_terminate() {
        let client = test_client();
        client.close().await;
        assert!(client.handles.lock().unwrap().is_none());
    }
}
