// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::HttpError;
use crate::state::GateState;

/// Paths reachable without the operator token: health plus the browser-facing
/// OAuth flow.
const PUBLIC_PATHS: &[&str] = &["/api/v1/health", "/auth", "/callback", "/success"];

/// Constant-time string comparison to prevent timing side-channel attacks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Validate a Bearer token from HTTP headers. `None` disables the check.
pub fn validate_bearer(headers: &HeaderMap, expected: Option<&str>) -> Result<(), HttpError> {
    let Some(expected) = expected else {
        return Ok(());
    };

    let header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or(HttpError::Unauthorized)?;
    let token = header.strip_prefix("Bearer ").ok_or(HttpError::Unauthorized)?;
    if constant_time_eq(token, expected) {
        Ok(())
    } else {
        Err(HttpError::Unauthorized)
    }
}

/// Axum middleware enforcing the operator Bearer token on the admin API.
pub async fn auth_layer(
    state: State<Arc<GateState>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    if PUBLIC_PATHS.contains(&req.uri().path()) {
        return next.run(req).await;
    }

    if let Err(code) = validate_bearer(req.headers(), state.config.auth_token.as_deref()) {
        return code.to_http_response("unauthorized").into_response();
    }

    next.run(req).await
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
