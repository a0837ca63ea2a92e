// src/core/transport/mod.rs

//! The Transport contract (spec §6), consumed by the streaming and polling
//! workers and the event sender. HTTP/SSE byte-level transport is an
//! explicit external collaborator per spec §1; this trait is the seam, with
//! `http::HttpTransport` shipped as a default, swappable implementation —
//! the same role `ReplicaStream` plays for the replication worker.

pub mod http;

use crate::core::stream_parser::Continuation;
use async_trait::async_trait;

/// A positive HTTP status code, or `-1` for a local/network failure with no
/// HTTP status (spec §6).
pub type ResponseCode = i32;

pub const TRANSPORT_FAILURE: ResponseCode = -1;

pub fn is_auth_failure(code: ResponseCode) -> bool {
    code == 401 || code == 403
}

/// Receives the handle and lines `read_stream` produces. Implemented by
/// whatever composes the stream parser, the flag store, and the lifecycle
/// controller (the streaming worker), kept as a trait object so `Transport`
/// stays object-safe.
pub trait StreamSink: Send + Sync {
    /// Called exactly once, with a non-zero opaque handle, once the
    /// connection is established.
    fn on_handle(&self, handle: u64);
    /// Called once per received line, with the trailing CR/LF already
    /// stripped. Returns whether the transport should keep reading.
    fn on_line(&self, line: &str) -> Continuation;
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch_flag_snapshot(&self) -> (ResponseCode, Option<String>);

    async fn send_events(&self, batch_text: String) -> ResponseCode;

    /// Blocks (asynchronously) until the stream disconnects.
    async fn read_stream(&self, sink: &dyn StreamSink) -> ResponseCode;

    /// Causes an in-flight `read_stream` with this handle to return promptly.
    async fn cancel_read(&self, handle: u64);
}
