// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pending authentication sessions.
//!
//! A session is minted when an operator requests a grant and lives for a
//! fixed TTL. Its identifier is a self-describing [`token`] so the callback
//! side can recover the grant context without reading this store. Expiry is
//! checked lazily on every lookup and swept periodically; `created_at` is
//! persisted, so the window survives restarts.

pub mod token;

use std::path::PathBuf;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::GateError;
use crate::persist::{self, Loaded};
use crate::state::epoch_ms;
use token::{SessionContext, TokenCodec};

/// One pending grant request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub guild_id: String,
    pub role_id: String,
    /// Channel the prompt message was posted in.
    pub channel_id: String,
    /// Prompt message, once posted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Epoch millis.
    pub created_at: u64,
    /// Users who completed authentication through this session, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authenticated: Vec<String>,
}

impl Session {
    /// Usable iff `now <= created_at + ttl`.
    pub fn is_expired_at(&self, now_ms: u64, ttl: Duration) -> bool {
        now_ms > self.created_at.saturating_add(ttl.as_millis() as u64)
    }
}

/// Session repository with write-through JSON persistence.
pub struct SessionStore {
    sessions: RwLock<IndexMap<String, Session>>,
    codec: TokenCodec,
    ttl: Duration,
    path: Option<PathBuf>,
}

impl SessionStore {
    /// Create an empty store. `path = None` keeps it memory-only.
    pub fn new(codec: TokenCodec, ttl: Duration, path: Option<PathBuf>) -> Self {
        Self { sessions: RwLock::new(IndexMap::new()), codec, ttl, path }
    }

    /// Create a store rehydrated from `path`.
    ///
    /// Missing or malformed state is logged and the store starts empty.
    pub fn open(codec: TokenCodec, ttl: Duration, path: PathBuf) -> Self {
        let sessions = match persist::load::<Session>(&path) {
            Ok(Loaded::Records(records)) => {
                tracing::info!(count = records.len(), path = %path.display(), "sessions loaded");
                records.into_iter().collect()
            }
            Ok(Loaded::Missing) => {
                tracing::info!(path = %path.display(), "no persisted sessions, starting empty");
                IndexMap::new()
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), err = %e, "malformed session state, starting empty");
                IndexMap::new()
            }
        };
        Self { sessions: RwLock::new(sessions), codec, ttl, path: Some(path) }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Mint a session for a grant request and return its token.
    pub async fn create(
        &self,
        guild_id: &str,
        role_id: &str,
        channel_id: &str,
    ) -> Result<String, GateError> {
        self.create_at(guild_id, role_id, channel_id, epoch_ms()).await
    }

    /// [`create`](Self::create) with an explicit creation time.
    pub async fn create_at(
        &self,
        guild_id: &str,
        role_id: &str,
        channel_id: &str,
        now_ms: u64,
    ) -> Result<String, GateError> {
        let ctx = SessionContext::new(guild_id, role_id, channel_id, now_ms);
        let id = self.codec.encode(&ctx)?;
        let session = Session {
            guild_id: ctx.guild_id,
            role_id: ctx.role_id,
            channel_id: ctx.channel_id,
            message_id: None,
            created_at: now_ms,
            authenticated: Vec::new(),
        };

        let mut sessions = self.sessions.write().await;
        sessions.insert(id.clone(), session);
        self.write_through(&sessions);
        drop(sessions);
        tracing::debug!(guild_id, role_id, "session created");
        Ok(id)
    }

    /// Record where the prompt message for a session was posted.
    pub async fn attach_message(&self, id: &str, message_id: &str) -> Result<(), GateError> {
        let mut sessions = self.sessions.write().await;
        let session =
            sessions.get_mut(id).ok_or_else(|| GateError::SessionNotFound(id.to_owned()))?;
        session.message_id = Some(message_id.to_owned());
        self.write_through(&sessions);
        Ok(())
    }

    /// Look up a live session. Does not consume it.
    pub async fn resolve(&self, id: &str) -> Result<Session, GateError> {
        self.resolve_at(id, epoch_ms()).await
    }

    /// [`resolve`](Self::resolve) evaluated at `now_ms`.
    ///
    /// An expired session is evicted on the way out.
    pub async fn resolve_at(&self, id: &str, now_ms: u64) -> Result<Session, GateError> {
        {
            let sessions = self.sessions.read().await;
            match sessions.get(id) {
                None => return Err(GateError::SessionNotFound(id.to_owned())),
                Some(s) if !s.is_expired_at(now_ms, self.ttl) => return Ok(s.clone()),
                Some(_) => {}
            }
        }
        self.remove(id).await;
        Err(GateError::SessionExpired(id.to_owned()))
    }

    /// Delete a session.
    pub async fn remove(&self, id: &str) -> Option<Session> {
        let mut sessions = self.sessions.write().await;
        let removed = sessions.shift_remove(id);
        if removed.is_some() {
            self.write_through(&sessions);
        }
        removed
    }

    /// Mark `user_id` as authenticated through session `id`.
    ///
    /// Returns `Ok(false)` when the user was already recorded, which makes
    /// redelivered notifications a no-op.
    pub async fn claim(&self, id: &str, user_id: &str) -> Result<bool, GateError> {
        let now = epoch_ms();
        let mut sessions = self.sessions.write().await;
        let session =
            sessions.get_mut(id).ok_or_else(|| GateError::SessionNotFound(id.to_owned()))?;
        if session.is_expired_at(now, self.ttl) {
            return Err(GateError::SessionExpired(id.to_owned()));
        }
        if session.authenticated.iter().any(|u| u == user_id) {
            return Ok(false);
        }
        session.authenticated.push(user_id.to_owned());
        self.write_through(&sessions);
        Ok(true)
    }

    /// Undo a [`claim`](Self::claim) so a later delivery can retry the grant.
    pub async fn release(&self, id: &str, user_id: &str) {
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get_mut(id) else {
            return;
        };
        session.authenticated.retain(|u| u != user_id);
        self.write_through(&sessions);
    }

    /// Evict every expired session. Returns how many were removed.
    pub async fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(epoch_ms()).await
    }

    pub async fn sweep_expired_at(&self, now_ms: u64) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired_at(now_ms, self.ttl));
        let removed = before - sessions.len();
        if removed > 0 {
            self.write_through(&sessions);
        }
        removed
    }

    /// Snapshot of all sessions in creation order.
    pub async fn list(&self) -> Vec<(String, Session)> {
        snapshot(&*self.sessions.read().await)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Rewrite the state file from the current contents.
    pub async fn flush(&self) -> Result<(), GateError> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        let sessions = self.sessions.read().await;
        persist::save(path, &snapshot(&sessions))
            .map_err(|e| GateError::DurablePersistFailure(e.to_string()))
    }

    /// Called with the map lock held so saves land in mutation order.
    fn write_through(&self, sessions: &IndexMap<String, Session>) {
        let Some(ref path) = self.path else {
            return;
        };
        if let Err(e) = persist::save(path, &snapshot(sessions)) {
            tracing::warn!(err = %e, "failed to persist sessions");
        }
    }
}

fn snapshot(sessions: &IndexMap<String, Session>) -> Vec<(String, Session)> {
    sessions.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
