// src/core/workers/polling.rs

//! The Polling Worker (spec §4.5), grounded on `LDi_bgfeaturepoller` in
//! `ldthreads.c`. Runs continuously even when streaming carries flag
//! updates, "but then it just sleeps" (the original's own comment).

use super::WorkerContext;
use crate::core::lifecycle::ClientStatus;
use crate::core::transport::is_auth_failure;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub async fn run(ctx: Arc<WorkerContext>) {
    let mut first_iteration = true;

    loop {
        if ctx.lifecycle.status().is_terminal() {
            ctx.lifecycle.worker_exited();
            return;
        }

        let background = ctx.lifecycle.is_background();
        let interval = if background {
            ctx.config.background_polling_interval()
        } else {
            ctx.config.polling_interval()
        };
        let skip_polling = ctx.lifecycle.is_offline()
            || (background && ctx.config.disable_background_updating)
            || (!background && ctx.config.streaming);

        let ping_requested = ctx.lifecycle.take_poll_request();

        let wait = if ping_requested {
            Duration::ZERO
        } else if first_iteration && ctx.lifecycle.status() == ClientStatus::Initializing && !skip_polling {
            Duration::ZERO
        } else {
            interval
        };
        first_iteration = false;

        if !wait.is_zero() {
            let notified = ctx.lifecycle.poll_notify.notified();
            tokio::pin!(notified);
            let _ = tokio::time::timeout(wait, notified).await;
        }

        // A "ping" dispatch always triggers a fetch, bypassing the skip
        // conditions above, mirroring `onstreameventping`'s unconditional
        // (modulo terminal status) fetch.
        if skip_polling && !ping_requested {
            continue;
        }
        if ctx.lifecycle.status().is_terminal() {
            continue;
        }

        let (response, payload) = ctx.transport.fetch_flag_snapshot().await;

        if is_auth_failure(response) {
            ctx.lifecycle.update_status(ClientStatus::Failed);
            warn!("mobile key not authorized, polling failed");
            continue;
        }

        let Some(text) = payload else { continue };

        match ctx.store.apply_put_text(&text) {
            Ok(()) => {
                ctx.lifecycle.update_status(ClientStatus::Initialized);
                let key = ctx.user.read().await.key.clone();
                if let Err(e) = ctx.persistence.save(&ctx.environment_name, &key, &text).await {
                    warn!(error = %e, "failed to persist polled flag snapshot");
                }
            }
            Err(e) => warn!(error = %e, "failed to parse polled flag snapshot"),
        }
    }
}
