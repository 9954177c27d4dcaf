// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Browser-facing OAuth endpoints.
//!
//! `/auth` redirects to the provider, `/callback` exchanges the code, fetches
//! the identity, decodes the session token and relays a [`Notification`] to
//! the bot side. Failures render a generic body; provider details stay in
//! the log.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use serde::Deserialize;

use crate::correlate::Notification;
use crate::discord::{build_authorize_url, urlencoding};
use crate::error::HttpError;
use crate::state::GateState;

const SUCCESS_HTML: &str = include_str!("../../web/success.html");

#[derive(Debug, Deserialize)]
pub struct AuthorizeQuery {
    #[serde(default)]
    pub session: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    /// Set by the provider when the user declined.
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SuccessQuery {
    #[serde(default)]
    pub user: Option<String>,
}

fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_owned())]).into_response()
}

/// `GET /auth?session=`
pub async fn authorize(
    State(s): State<Arc<GateState>>,
    Query(q): Query<AuthorizeQuery>,
) -> Response {
    let Some(session) = q.session.filter(|v| !v.is_empty()) else {
        return HttpError::BadRequest.to_http_response("session is required").into_response();
    };
    let url = build_authorize_url(
        &s.config.authorize_url,
        &s.config.client_id,
        &s.config.redirect_uri,
        &s.config.scopes,
        &session,
    );
    found(&url)
}

/// `GET /callback?code&state`
pub async fn callback(
    State(s): State<Arc<GateState>>,
    Query(q): Query<CallbackQuery>,
) -> Response {
    if let Some(ref error) = q.error {
        tracing::info!(error = %error, "authorization declined");
        return HttpError::BadRequest.to_http_response("authorization was declined").into_response();
    }
    let (Some(code), Some(session_id)) =
        (q.code.filter(|v| !v.is_empty()), q.state.filter(|v| !v.is_empty()))
    else {
        return HttpError::BadRequest
            .to_http_response("authorization code and session are required")
            .into_response();
    };

    let context = match s.sessions.codec().decode(&session_id) {
        Ok(ctx) => ctx,
        Err(e) => {
            tracing::warn!(err = %e, "callback with undecodable session");
            return HttpError::BadRequest.to_http_response("invalid session").into_response();
        }
    };

    let token = match s.api.exchange_code(&code).await {
        Ok(t) => t,
        Err(e) => {
            tracing::warn!(err = %e, "code exchange failed");
            return HttpError::UpstreamError
                .to_http_response("failed to exchange authorization code")
                .into_response();
        }
    };

    let user = match s.api.current_user(&token.access_token).await {
        Ok(u) => u,
        Err(e) => {
            tracing::warn!(err = %e, "identity fetch failed");
            return HttpError::UpstreamError
                .to_http_response("failed to fetch user identity")
                .into_response();
        }
    };

    let notification = Notification {
        user_id: user.id.clone(),
        session_id,
        access_token: Some(token.access_token),
        refresh_token: token.refresh_token,
        expires_in: token.expires_in,
        guild_id: Some(context.guild_id),
        role_id: Some(context.role_id),
        username: Some(user.username.clone()),
    };
    // Redirect regardless.
    if let Err(e) = s.relay.deliver(&notification).await {
        tracing::error!(user_id = %user.id, err = %e, "failed to relay notification");
    }

    tracing::info!(user_id = %user.id, "callback completed");
    found(&format!("/success?user={}", urlencoding(&user.username)))
}

/// `GET /success?user=`
pub async fn success(Query(q): Query<SuccessQuery>) -> Html<String> {
    let user = q.user.unwrap_or_default();
    Html(SUCCESS_HTML.replace("{{user}}", &escape_html(&user)))
}

pub(crate) fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
#[path = "callback_tests.rs"]
mod tests;
