// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Callback correlation.
//!
//! A [`Notification`] produced by the callback handler is matched against its
//! pending session, and the grant is carried out: the credential is stored,
//! the user is added to the guild, the role is granted and the panel is
//! re-rendered. Delivery is at-least-once; `(session, user)` claims make
//! a repeat skip the grant, while its tokens still overwrite the stored
//! credential.

pub mod inbox;
pub mod relay;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::credential::CredentialStore;
use crate::discord::{DiscordClient, MemberAdd};
use crate::error::GateError;
use crate::render;
use crate::session::{Session, SessionStore};

/// Payload the callback side emits once a user finished authenticating.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Parse and validate a raw notification body.
pub fn parse_notification(body: &str) -> Result<Notification, GateError> {
    let notification: Notification =
        serde_json::from_str(body).map_err(|e| GateError::MalformedNotification(e.to_string()))?;
    if notification.user_id.is_empty() {
        return Err(GateError::MalformedNotification("userId missing".into()));
    }
    if notification.session_id.is_empty() {
        return Err(GateError::MalformedNotification("sessionId missing".into()));
    }
    Ok(notification)
}

/// What a processed notification achieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correlation {
    pub session_id: String,
    pub user_id: String,
    pub credential_stored: bool,
    /// `None` when no token was available or the add failed.
    pub member_add: Option<MemberAdd>,
    pub role_granted: bool,
    pub panel_updated: bool,
}

/// Resolves notifications against sessions and performs the grant.
pub struct Correlator {
    sessions: Arc<SessionStore>,
    credentials: Arc<CredentialStore>,
    api: Arc<DiscordClient>,
    public_url: String,
}

impl Correlator {
    pub fn new(
        sessions: Arc<SessionStore>,
        credentials: Arc<CredentialStore>,
        api: Arc<DiscordClient>,
        public_url: &str,
    ) -> Self {
        Self { sessions, credentials, api, public_url: public_url.to_owned() }
    }

    /// Process one raw notification body.
    ///
    /// Errors mean the notification was dropped before any side effect,
    /// except [`GateError::DuplicateNotification`], which is returned after
    /// a fresh credential has been stored. Failures after the claim are
    /// logged and reported in the returned [`Correlation`].
    pub async fn handle(&self, body: &str) -> Result<Correlation, GateError> {
        let notification = parse_notification(body)?;
        self.correlate(notification).await
    }

    pub async fn correlate(&self, n: Notification) -> Result<Correlation, GateError> {
        let session = self.sessions.resolve(&n.session_id).await?;
        check_target(&n, &session)?;

        let user_id = n.user_id.as_str();
        let mut result = Correlation {
            session_id: n.session_id.clone(),
            user_id: n.user_id.clone(),
            credential_stored: false,
            member_add: None,
            role_granted: false,
            panel_updated: false,
        };

        let fresh_token = n.access_token.as_deref().filter(|t| !t.is_empty());
        if let Some(access_token) = fresh_token {
            let stored = self
                .credentials
                .upsert(
                    user_id,
                    access_token,
                    n.refresh_token.as_deref().filter(|t| !t.is_empty()),
                    n.expires_in,
                    Some(&n.session_id),
                )
                .await;
            // Kept in memory either way; the periodic flush retries the write.
            if let Err(e) = stored {
                tracing::warn!(user_id, err = %e, "credential not persisted");
            }
            result.credential_stored = true;
        }

        // Claim only gates the grant steps below.
        if !self.sessions.claim(&n.session_id, user_id).await? {
            return Err(GateError::DuplicateNotification {
                session_id: n.session_id.clone(),
                user_id: n.user_id.clone(),
            });
        }

        let token = match fresh_token {
            Some(t) => Some(t.to_owned()),
            None => self.credentials.get(user_id).await.map(|c| c.access_token),
        };
        match token {
            Some(token) => {
                match self.api.add_guild_member(&session.guild_id, user_id, &token).await {
                    Ok(added) => result.member_add = Some(added),
                    Err(e) => {
                        tracing::warn!(user_id, guild_id = %session.guild_id, err = %e, "member add failed");
                    }
                }
            }
            None => tracing::debug!(user_id, "no access token, skipping member add"),
        }

        match self.api.add_member_role(&session.guild_id, user_id, &session.role_id).await {
            Ok(()) => {
                result.role_granted = true;
                tracing::info!(user_id, role_id = %session.role_id, "role granted");
            }
            Err(e) => {
                tracing::warn!(user_id, role_id = %session.role_id, err = %e, "role grant failed");
                // Let a redelivery try again.
                self.sessions.release(&n.session_id, user_id).await;
                return Ok(result);
            }
        }

        result.panel_updated = self.update_panel(&n.session_id).await;
        Ok(result)
    }

    /// Re-render the session's panel with its authenticated users.
    async fn update_panel(&self, session_id: &str) -> bool {
        let Ok(session) = self.sessions.resolve(session_id).await else {
            return false;
        };
        let Some(ref message_id) = session.message_id else {
            return false;
        };
        let link = crate::config::auth_link(&self.public_url, session_id);
        let body = render::panel(&session.role_id, &link, &session.authenticated);
        match self.api.edit_message(&session.channel_id, message_id, &body).await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(session_id, err = %e, "panel update failed");
                false
            }
        }
    }
}

/// A payload naming a different target than its session is forged.
fn check_target(n: &Notification, session: &Session) -> Result<(), GateError> {
    let guild_mismatch = matches!(n.guild_id.as_deref(), Some(g) if g != session.guild_id);
    let role_mismatch = matches!(n.role_id.as_deref(), Some(r) if r != session.role_id);
    if !guild_mismatch && !role_mismatch {
        Ok(())
    } else {
        tracing::warn!(session_id = %n.session_id, user_id = %n.user_id, "notification target mismatch");
        Err(GateError::InvalidSessionToken)
    }
}

#[cfg(test)]
#[path = "correlate_tests.rs"]
mod tests;
