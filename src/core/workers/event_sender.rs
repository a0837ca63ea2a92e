// src/core/workers/event_sender.rs

//! The Event Sender Worker (spec §4.6), grounded on `LDi_bgeventsender` in
//! `ldthreads.c`, including its exactly-one-retry-then-drop transport-error
//! handling.

use super::WorkerContext;
use crate::core::lifecycle::ClientStatus;
use crate::core::transport::{is_auth_failure, TRANSPORT_FAILURE};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub async fn run(ctx: Arc<WorkerContext>) {
    let mut final_flush = false;

    loop {
        if ctx.lifecycle.status() == ClientStatus::Failed {
            ctx.lifecycle.worker_exited();
            return;
        }

        if !final_flush {
            if ctx.lifecycle.status() == ClientStatus::ShuttingDown {
                final_flush = true;
            } else {
                let notified = ctx.lifecycle.event_notify.notified();
                tokio::pin!(notified);
                let _ = tokio::time::timeout(ctx.config.events_flush_interval(), notified).await;
                if ctx.lifecycle.status() == ClientStatus::ShuttingDown {
                    final_flush = true;
                }
            }
        }

        if !ctx.lifecycle.is_offline() {
            if let Some(batch) = ctx.event_buffer.drain_batch().await {
                send_with_one_retry(&ctx, batch).await;
            }
        }

        if final_flush {
            ctx.lifecycle.worker_exited();
            return;
        }
    }
}

async fn send_with_one_retry(ctx: &Arc<WorkerContext>, batch: String) {
    let response = ctx.transport.send_events(batch.clone()).await;

    if is_auth_failure(response) {
        ctx.lifecycle.update_status(ClientStatus::Failed);
        warn!("mobile key not authorized, event sending failed");
        return;
    }

    if response != TRANSPORT_FAILURE {
        return;
    }

    tokio::time::sleep(Duration::from_secs(1)).await;
    let retry_response = ctx.transport.send_events(batch).await;

    if is_auth_failure(retry_response) {
        ctx.lifecycle.update_status(ClientStatus::Failed);
        warn!("mobile key not authorized, event sending failed");
        return;
    }

    if retry_response == TRANSPORT_FAILURE {
        warn!("sending events failed, dropping event batch");
    }
}
