// src/core/transport/http.rs

//! `HttpTransport`: the default `Transport` implementation, backed by
//! `reqwest`'s chunked-body streaming for server-sent events and plain
//! request/response for polling and event posting.

use super::{ResponseCode, StreamSink, Transport, TRANSPORT_FAILURE};
use crate::core::stream_parser::Continuation;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Notify;
use tracing::{debug, warn};
use url::Url;

pub struct HttpTransport {
    client: reqwest::Client,
    stream_base_url: Url,
    polling_base_url: Url,
    events_base_url: Url,
    mobile_key: String,
    next_handle: AtomicU64,
    cancellations: DashMap<u64, Arc<Notify>>,
}

impl HttpTransport {
    pub fn new(
        stream_base_url: &str,
        polling_base_url: &str,
        events_base_url: &str,
        mobile_key: impl Into<String>,
    ) -> Result<Self, url::ParseError> {
        Ok(Self {
            client: reqwest::Client::new(),
            stream_base_url: Url::parse(stream_base_url)?,
            polling_base_url: Url::parse(polling_base_url)?,
            events_base_url: Url::parse(events_base_url)?,
            mobile_key: mobile_key.into(),
            next_handle: AtomicU64::new(1),
            cancellations: DashMap::new(),
        })
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.header("Authorization", self.mobile_key.clone())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch_flag_snapshot(&self) -> (ResponseCode, Option<String>) {
        let url = match self.polling_base_url.join("msdk/evalx/users") {
            Ok(u) => u,
            Err(e) => {
                warn!(error = %e, "invalid polling URL");
                return (TRANSPORT_FAILURE, None);
            }
        };
        let request = self.authed(self.client.get(url));
        match request.send().await {
            Ok(response) => {
                let code = response.status().as_u16() as ResponseCode;
                if response.status().is_success() {
                    match response.text().await {
                        Ok(text) => (code, Some(text)),
                        Err(e) => {
                            warn!(error = %e, "failed reading flag snapshot body");
                            (code, None)
                        }
                    }
                } else {
                    (code, None)
                }
            }
            Err(e) => {
                warn!(error = %e, "flag snapshot request failed");
                (TRANSPORT_FAILURE, None)
            }
        }
    }

    async fn send_events(&self, batch_text: String) -> ResponseCode {
        let url = match self.events_base_url.join("mobile/events/bulk") {
            Ok(u) => u,
            Err(e) => {
                warn!(error = %e, "invalid events URL");
                return TRANSPORT_FAILURE;
            }
        };
        let request = self
            .authed(self.client.post(url))
            .header("Content-Type", "application/json")
            .body(batch_text);
        match request.send().await {
            Ok(response) => response.status().as_u16() as ResponseCode,
            Err(e) => {
                warn!(error = %e, "event batch post failed");
                TRANSPORT_FAILURE
            }
        }
    }

    async fn read_stream(&self, sink: &dyn StreamSink) -> ResponseCode {
        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst).max(1);
        let cancel = Arc::new(Notify::new());
        self.cancellations.insert(handle, cancel.clone());
        sink.on_handle(handle);

        let url = match self.stream_base_url.join("meval") {
            Ok(u) => u,
            Err(e) => {
                warn!(error = %e, "invalid stream URL");
                self.cancellations.remove(&handle);
                return TRANSPORT_FAILURE;
            }
        };

        let response = match self.authed(self.client.get(url)).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "stream connect failed");
                self.cancellations.remove(&handle);
                return TRANSPORT_FAILURE;
            }
        };

        let status = response.status().as_u16() as ResponseCode;
        if !response.status().is_success() {
            self.cancellations.remove(&handle);
            return status;
        }

        debug!(handle, "stream connected");
        let mut body = response.bytes_stream();
        let mut leftover = String::new();

        let result = loop {
            tokio::select! {
                _ = cancel.notified() => {
                    break TRANSPORT_FAILURE;
                }
                chunk = body.next() => {
                    match chunk {
                        Some(Ok(bytes)) => {
                            leftover.push_str(&String::from_utf8_lossy(&bytes));
                            let mut stop = false;
                            while let Some(pos) = leftover.find('\n') {
                                let line: String = leftover.drain(..=pos).collect();
                                let line = line.trim_end_matches(['\r', '\n']);
                                if sink.on_line(line) == Continuation::Stop {
                                    stop = true;
                                    break;
                                }
                            }
                            if stop {
                                break TRANSPORT_FAILURE;
                            }
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "stream read failed");
                            break TRANSPORT_FAILURE;
                        }
                        None => break TRANSPORT_FAILURE,
                    }
                }
            }
        };

        self.cancellations.remove(&handle);
        result
    }

    async fn cancel_read(&self, handle: u64) {
        if let Some((_, notify)) = self.cancellations.remove(&handle) {
            notify.notify_waiters();
        }
    }
}
