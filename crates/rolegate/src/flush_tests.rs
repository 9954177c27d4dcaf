// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::credential::CredentialStore;
use crate::session::token::TokenCodec;
use crate::session::SessionStore;
use crate::test_support::{test_config, GateStateBuilder};

#[tokio::test]
async fn flush_once_sweeps_and_persists() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let sessions_path = dir.path().join("sessions.json");
    let credentials_path = dir.path().join("credentials.json");

    let ttl = Duration::from_secs(60);
    let sessions = Arc::new(SessionStore::new(TokenCodec::new(None), ttl, Some(sessions_path.clone())));
    let credentials = Arc::new(CredentialStore::new(Some(credentials_path.clone())));
    sessions.create_at("G", "R", "C", 1_000).await?;
    let live = sessions.create("G", "R", "C").await?;
    credentials.upsert("u1", "a", Some("r"), None, None).await?;

    let config = test_config("http://127.0.0.1:1", &[])?;
    let (state, _rx) = GateStateBuilder::new(config)
        .sessions(Arc::clone(&sessions))
        .credentials(Arc::clone(&credentials))
        .build();

    flush_once(&state).await;
    assert_eq!(sessions.len().await, 1);

    let reopened = SessionStore::open(TokenCodec::new(None), ttl, sessions_path);
    let ids: Vec<String> = reopened.list().await.into_iter().map(|(id, _)| id).collect();
    assert_eq!(ids, vec![live]);
    let reopened = CredentialStore::open(credentials_path);
    assert!(reopened.get("u1").await.is_some());
    Ok(())
}

#[tokio::test]
async fn flusher_stops_on_shutdown() -> anyhow::Result<()> {
    let config = test_config("http://127.0.0.1:1", &["--flush-interval-secs", "1"])?;
    let (state, _rx) = GateStateBuilder::new(config).build();

    let handle = spawn_flusher(Arc::clone(&state));
    state.shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle).await??;
    Ok(())
}
