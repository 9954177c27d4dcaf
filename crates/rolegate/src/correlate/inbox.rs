// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{Correlation, Correlator};
use crate::discord::DiscordClient;
use crate::error::GateError;
use crate::state::GateState;

/// A raw notification awaiting correlation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub body: String,
    pub receipt: Receipt,
}

/// How to acknowledge an [`Inbound`] once processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Receipt {
    Local,
    /// Delete the carrying message.
    Channel { channel_id: String, message_id: String },
}

/// Spawn the loop that correlates inbound notifications one at a time.
pub fn spawn_inbox(state: Arc<GateState>, mut rx: mpsc::Receiver<Inbound>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let correlator = state.correlator();
        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                inbound = rx.recv() => {
                    let Some(inbound) = inbound else { break };
                    let _ = process(&correlator, &state.api, inbound).await;
                }
            }
        }
        tracing::debug!("notification inbox stopped");
    })
}

/// Correlate one notification, log the result and acknowledge it.
///
/// The notification is acknowledged whether or not processing succeeded.
pub async fn process(
    correlator: &Correlator,
    api: &DiscordClient,
    inbound: Inbound,
) -> Result<Correlation, GateError> {
    let result = correlator.handle(&inbound.body).await;
    match result {
        Ok(ref c) => tracing::info!(
            session_id = %c.session_id,
            user_id = %c.user_id,
            role_granted = c.role_granted,
            "notification processed"
        ),
        Err(GateError::DuplicateNotification { ref session_id, ref user_id }) => {
            tracing::debug!(%session_id, %user_id, "duplicate notification ignored");
        }
        Err(ref e) => tracing::warn!(code = e.as_str(), err = %e, "notification dropped"),
    }
    ack(api, &inbound.receipt).await;
    result
}

async fn ack(api: &DiscordClient, receipt: &Receipt) {
    if let Receipt::Channel { channel_id, message_id } = receipt {
        if let Err(e) = api.delete_message(channel_id, message_id).await {
            tracing::debug!(%channel_id, %message_id, err = %e, "failed to delete notification");
        }
    }
}
