// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-user OAuth credentials captured at callback time.
//!
//! At most one credential per end-user. Re-authentication overwrites the
//! record. Every mutation writes `credentials.json` through; the periodic
//! flush is the backstop.

pub mod refresh;

use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::discord::TokenResponse;
use crate::error::GateError;
use crate::persist::{self, Loaded};
use crate::state::epoch_ms;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Absolute expiry in epoch millis. `None` never expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    /// Session that produced the current tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// First authentication, epoch millis. Survives re-authentication.
    pub authenticated_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refreshed_at: Option<u64>,
}

impl Credential {
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        self.expires_at.is_some_and(|at| now_ms >= at)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(epoch_ms())
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

fn expiry_from(now_ms: u64, expires_in: Option<u64>) -> Option<u64> {
    expires_in.map(|secs| now_ms.saturating_add(secs.saturating_mul(1000)))
}

/// Credential repository with write-through JSON persistence.
pub struct CredentialStore {
    credentials: RwLock<IndexMap<String, Credential>>,
    path: Option<PathBuf>,
}

impl CredentialStore {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { credentials: RwLock::new(IndexMap::new()), path }
    }

    /// Rehydrate from `path`. Missing or malformed state starts empty.
    pub fn open(path: PathBuf) -> Self {
        let credentials = match persist::load::<Credential>(&path) {
            Ok(Loaded::Records(records)) => {
                tracing::info!(count = records.len(), path = %path.display(), "credentials loaded");
                records.into_iter().collect()
            }
            Ok(Loaded::Missing) => IndexMap::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), err = %e, "malformed credential state, starting empty");
                IndexMap::new()
            }
        };
        Self { credentials: RwLock::new(credentials), path: Some(path) }
    }

    /// Insert or overwrite the credential for `user_id`.
    ///
    /// The in-memory record is kept even when the write to disk fails; the
    /// failure is returned as [`GateError::DurablePersistFailure`].
    pub async fn upsert(
        &self,
        user_id: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_in: Option<u64>,
        session_id: Option<&str>,
    ) -> Result<Credential, GateError> {
        self.upsert_at(user_id, access_token, refresh_token, expires_in, session_id, epoch_ms())
            .await
    }

    pub async fn upsert_at(
        &self,
        user_id: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_in: Option<u64>,
        session_id: Option<&str>,
        now_ms: u64,
    ) -> Result<Credential, GateError> {
        let mut credentials = self.credentials.write().await;
        let authenticated_at =
            credentials.get(user_id).map(|c| c.authenticated_at).unwrap_or(now_ms);
        let credential = Credential {
            access_token: access_token.to_owned(),
            refresh_token: refresh_token.map(str::to_owned),
            expires_at: expiry_from(now_ms, expires_in),
            session_id: session_id.map(str::to_owned),
            authenticated_at,
            refreshed_at: None,
        };
        credentials.insert(user_id.to_owned(), credential.clone());
        self.persist(&credentials)?;
        drop(credentials);
        tracing::debug!(user_id, "credential stored");
        Ok(credential)
    }

    pub async fn get(&self, user_id: &str) -> Option<Credential> {
        self.credentials.read().await.get(user_id).cloned()
    }

    /// Point-in-time copy of every credential in insertion order.
    pub async fn all(&self) -> Vec<(String, Credential)> {
        snapshot(&*self.credentials.read().await)
    }

    /// Replace the tokens for `user_id` after a successful refresh.
    ///
    /// The refresh token is only replaced when the provider returned one.
    /// Returns `Ok(None)` when no credential exists for the user.
    pub async fn apply_refresh(
        &self,
        user_id: &str,
        token: &TokenResponse,
    ) -> Result<Option<Credential>, GateError> {
        self.apply_refresh_at(user_id, token, epoch_ms()).await
    }

    pub async fn apply_refresh_at(
        &self,
        user_id: &str,
        token: &TokenResponse,
        now_ms: u64,
    ) -> Result<Option<Credential>, GateError> {
        let mut credentials = self.credentials.write().await;
        let Some(credential) = credentials.get_mut(user_id) else {
            return Ok(None);
        };
        credential.access_token = token.access_token.clone();
        if let Some(ref rt) = token.refresh_token {
            credential.refresh_token = Some(rt.clone());
        }
        credential.expires_at = expiry_from(now_ms, token.expires_in);
        credential.refreshed_at = Some(now_ms);
        let updated = credential.clone();
        self.persist(&credentials)?;
        Ok(Some(updated))
    }

    pub async fn len(&self) -> usize {
        self.credentials.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.credentials.read().await.is_empty()
    }

    pub async fn flush(&self) -> Result<(), GateError> {
        let credentials = self.credentials.read().await;
        self.persist(&credentials)
    }

    /// Write `credentials` to disk. Callers hold the map lock so saves land
    /// in mutation order.
    fn persist(&self, credentials: &IndexMap<String, Credential>) -> Result<(), GateError> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        persist::save(path, &snapshot(credentials))
            .map_err(|e| GateError::DurablePersistFailure(e.to_string()))
    }
}

fn snapshot(credentials: &IndexMap<String, Credential>) -> Vec<(String, Credential)> {
    credentials.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
