// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bulk membership: replay stored credentials to add every known user to a
//! target guild.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::credential::refresh::TokenRefresher;
use crate::credential::{Credential, CredentialStore};
use crate::discord::{ApiErrorBody, DiscordClient, MemberAdd};
use crate::error::GateError;

const MAX_RETRY_WAIT: Duration = Duration::from_secs(60);
const NETWORK_BACKOFF: Duration = Duration::from_millis(500);

/// Per-user result tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum GrantOutcome {
    Added,
    SkippedRefreshFailed,
    FailedProviderError,
    FailedNetwork,
}

impl GrantOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Added)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::SkippedRefreshFailed => "skipped-refresh-failed",
            Self::FailedProviderError => "failed-provider-error",
            Self::FailedNetwork => "failed-network",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserResult {
    pub user_id: String,
    pub outcome: GrantOutcome,
    pub reason: String,
}

impl UserResult {
    fn new(user_id: &str, outcome: GrantOutcome, reason: impl Into<String>) -> Self {
        Self { user_id: user_id.to_owned(), outcome, reason: reason.into() }
    }

    /// One report line, e.g. `✅ <@42>` or `❌ <@42> - Missing Access`.
    pub fn line(&self) -> String {
        if self.outcome.is_success() {
            format!("✅ <@{}>", self.user_id)
        } else {
            format!("❌ <@{}> - {}", self.user_id, self.reason)
        }
    }
}

/// Outcome of one batch run. Counts always cover every user attempted.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub guild_id: String,
    pub guild_name: String,
    pub success_count: usize,
    pub fail_count: usize,
    pub results: Vec<UserResult>,
}

impl BatchReport {
    /// The first `limit` result lines.
    pub fn render_lines(&self, limit: usize) -> Vec<String> {
        self.results.iter().take(limit).map(UserResult::line).collect()
    }

    /// First `limit` lines plus a `+N more` line for the remainder.
    pub fn render(&self, limit: usize) -> String {
        let mut lines = self.render_lines(limit);
        let hidden = self.results.len().saturating_sub(limit);
        if hidden > 0 {
            lines.push(format!("+{hidden} more"));
        }
        lines.join("\n")
    }
}

/// Runs batches sequentially over a credential snapshot.
pub struct BatchRunner {
    credentials: Arc<CredentialStore>,
    refresher: Arc<TokenRefresher>,
    api: Arc<DiscordClient>,
    max_retries: u32,
}

impl BatchRunner {
    pub fn new(
        credentials: Arc<CredentialStore>,
        refresher: Arc<TokenRefresher>,
        api: Arc<DiscordClient>,
        max_retries: u32,
    ) -> Self {
        Self { credentials, refresher, api, max_retries }
    }

    /// Add every stored user to `guild_id`.
    ///
    /// Fails as a whole only when the guild cannot be resolved, before any
    /// user is attempted.
    pub async fn run_batch(&self, guild_id: &str) -> Result<BatchReport, GateError> {
        let guild = self.api.guild(guild_id).await?;
        let snapshot = self.credentials.all().await;
        tracing::info!(guild_id, users = snapshot.len(), "batch started");

        let mut report = BatchReport {
            guild_id: guild.id,
            guild_name: guild.name,
            success_count: 0,
            fail_count: 0,
            results: Vec::with_capacity(snapshot.len()),
        };
        for (user_id, credential) in snapshot {
            let result = self.grant_one(guild_id, &user_id, credential).await;
            if result.outcome.is_success() {
                report.success_count += 1;
            } else {
                tracing::warn!(user_id, outcome = result.outcome.as_str(), reason = %result.reason, "batch grant failed");
                report.fail_count += 1;
            }
            report.results.push(result);
        }

        tracing::info!(
            guild_id,
            succeeded = report.success_count,
            failed = report.fail_count,
            "batch finished"
        );
        Ok(report)
    }

    async fn grant_one(&self, guild_id: &str, user_id: &str, credential: Credential) -> UserResult {
        let access_token = if credential.is_expired() {
            match self.refresher.refresh(user_id).await {
                Ok(token) => token,
                Err(e) => {
                    return UserResult::new(user_id, GrantOutcome::SkippedRefreshFailed, e.to_string())
                }
            }
        } else {
            credential.access_token
        };

        let mut attempt = 0;
        loop {
            let err = match self.api.add_guild_member(guild_id, user_id, &access_token).await {
                Ok(MemberAdd::Joined) => {
                    return UserResult::new(user_id, GrantOutcome::Added, "joined");
                }
                Ok(MemberAdd::AlreadyMember) => {
                    return UserResult::new(user_id, GrantOutcome::Added, "already a member");
                }
                Err(e) => e,
            };

            if attempt < self.max_retries {
                if let Some(wait) = retry_delay(&err, attempt) {
                    tracing::debug!(user_id, attempt, wait_ms = wait.as_millis() as u64, "retrying member add");
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                    continue;
                }
            }
            return classify(user_id, err);
        }
    }
}

/// How long to wait before retrying `err`, or `None` when it is final.
fn retry_delay(err: &GateError, attempt: u32) -> Option<Duration> {
    match err {
        GateError::ProviderRejected { status: 429, body } => {
            let secs = ApiErrorBody::parse(body).retry_after.unwrap_or(1.0);
            Some(Duration::from_secs_f64(secs.clamp(0.0, MAX_RETRY_WAIT.as_secs_f64())))
        }
        e if e.is_network() => {
            Some((NETWORK_BACKOFF * 2u32.saturating_pow(attempt)).min(MAX_RETRY_WAIT))
        }
        _ => None,
    }
}

fn classify(user_id: &str, err: GateError) -> UserResult {
    match err {
        GateError::AccountUnverified => UserResult::new(
            user_id,
            GrantOutcome::FailedProviderError,
            "account is not verified (email or phone verification required)",
        ),
        GateError::MemberAddRejected { message, .. } => {
            UserResult::new(user_id, GrantOutcome::FailedProviderError, message)
        }
        GateError::ProviderRejected { status: 429, .. } => {
            UserResult::new(user_id, GrantOutcome::FailedProviderError, "rate limited")
        }
        ref e if e.is_network() => {
            UserResult::new(user_id, GrantOutcome::FailedNetwork, "network error")
        }
        other => UserResult::new(user_id, GrantOutcome::FailedProviderError, other.to_string()),
    }
}

#[cfg(test)]
#[path = "batch_tests.rs"]
mod tests;
