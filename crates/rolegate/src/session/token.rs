// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Self-describing session tokens.
//!
//! A token is `base64url(json)` or, when a secret is configured,
//! `base64url(json).base64url(hmac_sha256(json))`. The callback side decodes
//! it without access to the session store.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use ring::hmac;
use serde::{Deserialize, Serialize};

use crate::error::GateError;

/// Grant context carried inside a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    pub guild_id: String,
    pub role_id: String,
    pub channel_id: String,
    /// Creation time, epoch millis.
    pub ts: u64,
    pub nonce: String,
}

impl SessionContext {
    pub fn new(guild_id: &str, role_id: &str, channel_id: &str, ts: u64) -> Self {
        Self {
            guild_id: guild_id.to_owned(),
            role_id: role_id.to_owned(),
            channel_id: channel_id.to_owned(),
            ts,
            nonce: generate_nonce(),
        }
    }
}

/// 128 random bits, base64url.
fn generate_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Encodes and decodes session tokens, signing them when keyed.
pub struct TokenCodec {
    key: Option<hmac::Key>,
}

impl TokenCodec {
    pub fn new(secret: Option<&str>) -> Self {
        let key = secret
            .filter(|s| !s.is_empty())
            .map(|s| hmac::Key::new(hmac::HMAC_SHA256, s.as_bytes()));
        Self { key }
    }

    pub fn is_signed(&self) -> bool {
        self.key.is_some()
    }

    pub fn encode(&self, ctx: &SessionContext) -> Result<String, GateError> {
        let json = serde_json::to_vec(ctx)
            .map_err(|e| GateError::UnexpectedResponse(format!("encode session: {e}")))?;
        let payload = URL_SAFE_NO_PAD.encode(&json);
        match self.key {
            Some(ref key) => {
                let tag = hmac::sign(key, payload.as_bytes());
                Ok(format!("{payload}.{}", URL_SAFE_NO_PAD.encode(tag.as_ref())))
            }
            None => Ok(payload),
        }
    }

    pub fn decode(&self, token: &str) -> Result<SessionContext, GateError> {
        let (payload, sig) = match token.split_once('.') {
            Some((p, s)) => (p, Some(s)),
            None => (token, None),
        };

        if let Some(ref key) = self.key {
            let sig = sig.ok_or(GateError::InvalidSessionToken)?;
            let sig = URL_SAFE_NO_PAD.decode(sig).map_err(|_| GateError::InvalidSessionToken)?;
            hmac::verify(key, payload.as_bytes(), &sig)
                .map_err(|_| GateError::InvalidSessionToken)?;
        }

        let json = URL_SAFE_NO_PAD.decode(payload).map_err(|_| GateError::InvalidSessionToken)?;
        serde_json::from_slice(&json).map_err(|_| GateError::InvalidSessionToken)
    }
}

#[cfg(test)]
#[path = "token_tests.rs"]
mod tests;
