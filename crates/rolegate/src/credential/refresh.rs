// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Refresh-token grants against the provider token endpoint.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use super::CredentialStore;
use crate::discord::DiscordClient;
use crate::error::GateError;

/// Exchanges stored refresh tokens for new token pairs.
///
/// Refreshes for one user are serialized. A caller that queued behind a
/// concurrent refresh returns the token that refresh produced.
pub struct TokenRefresher {
    api: Arc<DiscordClient>,
    credentials: Arc<CredentialStore>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TokenRefresher {
    pub fn new(api: Arc<DiscordClient>, credentials: Arc<CredentialStore>) -> Self {
        Self { api, credentials, locks: Mutex::new(HashMap::new()) }
    }

    /// Refresh the credential for `user_id` and return the new access token.
    ///
    /// On failure the stored credential is left as it was.
    pub async fn refresh(&self, user_id: &str) -> Result<String, GateError> {
        let seen = self.credentials.get(user_id).await.map(|c| c.access_token);

        let lock = self.lock_for(user_id).await;
        let _guard = lock.lock().await;

        let credential = self
            .credentials
            .get(user_id)
            .await
            .ok_or_else(|| GateError::MissingRefreshToken(user_id.to_owned()))?;
        if seen.as_deref().is_some_and(|t| t != credential.access_token) {
            tracing::debug!(user_id, "token replaced while waiting, reusing");
            return Ok(credential.access_token);
        }
        let refresh_token = credential
            .refresh_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| GateError::MissingRefreshToken(user_id.to_owned()))?;

        let token = self.api.refresh_token(&refresh_token).await?;
        match self.credentials.apply_refresh(user_id, &token).await {
            Ok(_) => {}
            Err(e) => tracing::warn!(user_id, err = %e, "refreshed credential not persisted"),
        }
        tracing::info!(user_id, "credential refreshed");
        Ok(token.access_token)
    }

    async fn lock_for(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(user_id.to_owned()).or_default())
    }
}

#[cfg(test)]
#[path = "refresh_tests.rs"]
mod tests;
