// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Provider REST API: OAuth token endpoint plus the handful of bot endpoints
//! the grant flow needs.

pub mod client;

use serde::{Deserialize, Serialize};

pub use client::DiscordClient;

/// Standard OAuth2 token response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Authenticated identity from `GET /users/@me`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub bot: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Guild {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub channel_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<User>,
}

/// Successful member-add result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberAdd {
    /// 201: user joined.
    Joined,
    /// 204: user was already in the guild.
    AlreadyMember,
}

/// Provider error body: `{"code": 50001, "message": "Missing Access"}`.
#[derive(Debug, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: u64,
    #[serde(default)]
    pub message: String,
    /// Seconds to wait, on 429 responses.
    #[serde(default)]
    pub retry_after: Option<f64>,
}

impl ApiErrorBody {
    pub fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }
}

/// JSON error code the provider returns when the account must verify first.
const UNVERIFIED_ACCOUNT_CODE: u64 = 40002;

/// Whether a rejected member-add means the end-user account is unverified.
pub fn is_unverified(body: &ApiErrorBody, raw: &str) -> bool {
    body.code == UNVERIFIED_ACCOUNT_CODE || raw.to_lowercase().contains("verified")
}

/// Build the authorize URL an end-user is redirected to.
pub fn build_authorize_url(
    authorize_url: &str,
    client_id: &str,
    redirect_uri: &str,
    scope: &str,
    state: &str,
) -> String {
    format!(
        "{authorize_url}?client_id={client_id}\
         &redirect_uri={redirect_uri}\
         &response_type=code\
         &scope={scope}\
         &state={state}",
        client_id = urlencoding(client_id),
        redirect_uri = urlencoding(redirect_uri),
        scope = urlencoding(scope),
        state = urlencoding(state),
    )
}

/// `application/x-www-form-urlencoded` value encoding, the same form the
/// token endpoint and authorize URL expect (spaces as `+`).
pub fn urlencoding(s: &str) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b' ' => out.push('+'),
            b if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') => {
                out.push(char::from(b));
            }
            _ => {
                let _ = write!(out, "%{b:02X}");
            }
        }
    }
    out
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
