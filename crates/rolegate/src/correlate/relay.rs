// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Notification transport between the callback handler and the correlator.
//!
//! `Local` hands notifications to the inbox over an in-process channel.
//! `Channel` posts them into a provider text channel that the bot side polls
//! over REST, consuming only messages the bot itself authored.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::inbox::{Inbound, Receipt};
use super::Notification;
use crate::discord::{DiscordClient, Message};
use crate::error::GateError;
use crate::state::GateState;

/// Max messages fetched per poll (provider cap).
const POLL_LIMIT: u8 = 100;

pub enum Relay {
    Local(mpsc::Sender<Inbound>),
    Channel { api: Arc<DiscordClient>, channel_id: String },
}

impl Relay {
    /// In-process relay plus the receiver the inbox drains.
    pub fn local(capacity: usize) -> (Self, mpsc::Receiver<Inbound>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::Local(tx), rx)
    }

    pub fn channel(api: Arc<DiscordClient>, channel_id: &str) -> Self {
        Self::Channel { api, channel_id: channel_id.to_owned() }
    }

    /// Hand a notification to the bot side.
    pub async fn deliver(&self, notification: &Notification) -> Result<(), GateError> {
        let body = serde_json::to_string(notification)
            .map_err(|e| GateError::MalformedNotification(e.to_string()))?;
        match self {
            Self::Local(tx) => tx
                .send(Inbound { body, receipt: Receipt::Local })
                .await
                .map_err(|_| GateError::NetworkFailure("notification inbox closed".into())),
            Self::Channel { api, channel_id } => {
                api.create_message(channel_id, &serde_json::json!({ "content": body })).await?;
                Ok(())
            }
        }
    }
}

/// Spawn the poller that feeds channel notifications into the inbox.
pub fn spawn_channel_poller(
    state: Arc<GateState>,
    channel_id: String,
    inbox: mpsc::Sender<Inbound>,
    interval: Duration,
) {
    tokio::spawn(async move {
        if let Err(e) = run_poller(&state, &channel_id, &inbox, interval).await {
            tracing::error!(channel_id, err = %e, "notification poller failed");
        }
    });
}

async fn run_poller(
    state: &GateState,
    channel_id: &str,
    inbox: &mpsc::Sender<Inbound>,
    interval: Duration,
) -> Result<(), GateError> {
    let bot = state.api.current_bot_user().await?;
    tracing::info!(channel_id, bot_id = %bot.id, "notification poller started");

    let mut cursor: Option<String> = None;
    let mut timer = tokio::time::interval(interval);
    timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,
            _ = timer.tick() => {
                let messages = match state.api.channel_messages(channel_id, cursor.as_deref(), POLL_LIMIT).await {
                    Ok(m) => m,
                    Err(e) => {
                        tracing::debug!(channel_id, err = %e, "notification poll failed");
                        continue;
                    }
                };
                for message in in_snowflake_order(messages) {
                    cursor = Some(message.id.clone());
                    if !is_authored_by(&message, &bot.id) {
                        continue;
                    }
                    let inbound = Inbound {
                        body: message.content,
                        receipt: Receipt::Channel {
                            channel_id: channel_id.to_owned(),
                            message_id: message.id,
                        },
                    };
                    if inbox.send(inbound).await.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }
    Ok(())
}

fn is_authored_by(message: &Message, user_id: &str) -> bool {
    message.author.as_ref().is_some_and(|a| a.id == user_id)
}

/// Oldest first. Snowflakes compare numerically.
pub(crate) fn in_snowflake_order(mut messages: Vec<Message>) -> Vec<Message> {
    messages.sort_by_key(|m| m.id.parse::<u64>().unwrap_or(0));
    messages
}

#[cfg(test)]
#[path = "relay_tests.rs"]
mod tests;
