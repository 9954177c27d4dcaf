// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rolegate: OAuth-gated role grants and bulk guild membership for a Discord
//! bot.

pub mod batch;
pub mod config;
pub mod correlate;
pub mod credential;
pub mod discord;
pub mod error;
pub mod flush;
pub mod persist;
pub mod render;
pub mod session;
pub mod state;
pub mod test_support;
pub mod transport;

use std::sync::{Arc, Once};

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::GateConfig;
use crate::correlate::inbox::spawn_inbox;
use crate::correlate::relay::{spawn_channel_poller, Relay};
use crate::credential::CredentialStore;
use crate::discord::DiscordClient;
use crate::session::token::TokenCodec;
use crate::session::SessionStore;
use crate::state::GateState;
use crate::transport::build_router;

/// Install the ring TLS provider for rustls. Idempotent.
pub fn ensure_crypto_provider() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Run the gate until Ctrl-C.
pub async fn run(config: GateConfig) -> anyhow::Result<()> {
    ensure_crypto_provider();
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    // Stores are rehydrated before anything else touches them.
    let codec = TokenCodec::new(config.state_secret.as_deref());
    if !codec.is_signed() {
        tracing::warn!("no state secret configured, session tokens are unsigned");
    }
    let sessions = Arc::new(SessionStore::open(codec, config.session_ttl(), config.sessions_path()));
    let credentials = Arc::new(CredentialStore::open(config.credentials_path()));
    let api = Arc::new(DiscordClient::from_config(&config));

    let (inbox_tx, inbox_rx) = tokio::sync::mpsc::channel(256);
    let relay = match config.notify_channel_id {
        Some(ref channel_id) => Relay::channel(Arc::clone(&api), channel_id),
        None => Relay::Local(inbox_tx.clone()),
    };

    let state = Arc::new(GateState::new(
        config.clone(),
        sessions,
        credentials,
        api,
        relay,
        shutdown.clone(),
    ));

    let inbox = spawn_inbox(Arc::clone(&state), inbox_rx);
    match config.notify_channel_id {
        Some(ref channel_id) => {
            tracing::info!(%channel_id, "relaying notifications through channel");
            spawn_channel_poller(
                Arc::clone(&state),
                channel_id.clone(),
                inbox_tx,
                config.relay_poll_interval(),
            );
        }
        None => drop(inbox_tx),
    }
    let flusher = flush::spawn_flusher(Arc::clone(&state));

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested");
            }
            shutdown.cancel();
        });
    }

    let router = build_router(Arc::clone(&state));
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(state_dir = %config.state_dir().display(), "rolegate listening on {addr}");
    axum::serve(listener, router).with_graceful_shutdown(shutdown.clone().cancelled_owned()).await?;

    shutdown.cancel();
    let _ = inbox.await;
    let _ = flusher.await;
    flush::flush_once(&state).await;
    tracing::info!("state flushed, exiting");
    Ok(())
}
