// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background sweep and flush of both stores.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::state::GateState;

/// Spawn the periodic task that evicts expired sessions and rewrites both
/// state files.
pub fn spawn_flusher(state: Arc<GateState>) -> JoinHandle<()> {
    let interval = state.config.flush_interval();

    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // First tick fires immediately.
        timer.tick().await;

        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }
            flush_once(&state).await;
        }
    })
}

/// One sweep and flush pass. Failures are logged.
pub async fn flush_once(state: &GateState) {
    let evicted = state.sessions.sweep_expired().await;
    if evicted > 0 {
        tracing::info!(evicted, "expired sessions swept");
    }
    if let Err(e) = state.sessions.flush().await {
        tracing::warn!(err = %e, "session flush failed");
    }
    if let Err(e) = state.credentials.flush().await {
        tracing::warn!(err = %e, "credential flush failed");
    }
}

#[cfg(test)]
#[path = "flush_tests.rs"]
mod tests;
