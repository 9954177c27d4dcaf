// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operator API handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{GateError, HttpError};
use crate::render;
use crate::state::{epoch_ms, GateState};

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub session_count: usize,
    pub credential_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct GrantRequest {
    pub role_id: String,
    pub channel_id: String,
    #[serde(default)]
    pub guild_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GrantResponse {
    pub session_id: String,
    pub auth_url: String,
    pub message_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct BatchRequest {
    #[serde(default)]
    pub target_guild_id: Option<String>,
    #[serde(default)]
    pub report_channel_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub guild_id: String,
    pub role_id: String,
    pub channel_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub created_at_ms: u64,
    pub expires_at_ms: u64,
    pub authenticated: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteSessionResponse {
    pub id: String,
    pub removed: bool,
}

/// Credential summary. Tokens are never exposed.
#[derive(Debug, Serialize, Deserialize)]
pub struct CredentialInfo {
    pub user_id: String,
    pub has_refresh_token: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at_ms: Option<u64>,
    pub expired: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub authenticated_at_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refreshed_at_ms: Option<u64>,
}

// -- Handlers -----------------------------------------------------------------

/// `GET /api/v1/health`
pub async fn health(State(s): State<Arc<GateState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "running".to_owned(),
        session_count: s.sessions.len().await,
        credential_count: s.credentials.len().await,
    })
}

/// `POST /api/v1/grants`: mint a session and post its panel.
pub async fn create_grant(
    State(s): State<Arc<GateState>>,
    Json(req): Json<GrantRequest>,
) -> impl IntoResponse {
    let Some(guild_id) = req.guild_id.or_else(|| s.config.default_guild_id.clone()) else {
        return HttpError::BadRequest
            .to_http_response("guild_id is required when no default guild is configured")
            .into_response();
    };

    let session_id = match s.sessions.create(&guild_id, &req.role_id, &req.channel_id).await {
        Ok(id) => id,
        Err(e) => return e.http_code().to_http_response(e.to_string()).into_response(),
    };
    let auth_url = s.config.auth_link(&session_id);

    let panel = render::panel(&req.role_id, &auth_url, &[]);
    let message = match s.api.create_message(&req.channel_id, &panel).await {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(channel_id = %req.channel_id, err = %e, "failed to post grant panel");
            s.sessions.remove(&session_id).await;
            return HttpError::UpstreamError
                .to_http_response(format!("failed to post panel: {e}"))
                .into_response();
        }
    };
    if let Err(e) = s.sessions.attach_message(&session_id, &message.id).await {
        tracing::warn!(err = %e, "failed to attach panel message");
    }

    tracing::info!(%guild_id, role_id = %req.role_id, "grant session created");
    Json(GrantResponse { session_id, auth_url, message_id: message.id }).into_response()
}

/// `POST /api/v1/batch`: add every stored user to a guild.
pub async fn run_batch(
    State(s): State<Arc<GateState>>,
    Json(req): Json<BatchRequest>,
) -> impl IntoResponse {
    let Some(guild_id) = req.target_guild_id.or_else(|| s.config.default_guild_id.clone()) else {
        return HttpError::BadRequest
            .to_http_response("target_guild_id is required when no default guild is configured")
            .into_response();
    };
    let report_channel = req.report_channel_id.as_deref();

    if s.credentials.is_empty().await {
        let message = "no authenticated users found";
        post_report(&s, report_channel, render::error_embed(message)).await;
        return HttpError::BadRequest.to_http_response(message).into_response();
    }

    match s.batch_runner().run_batch(&guild_id).await {
        Ok(report) => {
            post_report(&s, report_channel, render::batch_report(&report)).await;
            Json(report).into_response()
        }
        Err(e) => {
            let (code, message) = match e {
                GateError::ProviderRejected { status: 403 | 404, .. } => (
                    HttpError::NotFound,
                    format!("guild {guild_id} not found; make sure the bot has joined it"),
                ),
                ref other => (other.http_code(), other.to_string()),
            };
            post_report(&s, report_channel, render::error_embed(&message)).await;
            code.to_http_response(message).into_response()
        }
    }
}

async fn post_report(s: &GateState, channel_id: Option<&str>, body: serde_json::Value) {
    let Some(channel_id) = channel_id else {
        return;
    };
    if let Err(e) = s.api.create_message(channel_id, &body).await {
        tracing::warn!(channel_id, err = %e, "failed to post batch report");
    }
}

/// `GET /api/v1/sessions`
pub async fn list_sessions(State(s): State<Arc<GateState>>) -> impl IntoResponse {
    let ttl_ms = s.sessions.ttl().as_millis() as u64;
    let now = epoch_ms();
    let infos: Vec<SessionInfo> = s
        .sessions
        .list()
        .await
        .into_iter()
        .filter(|(_, session)| !session.is_expired_at(now, s.sessions.ttl()))
        .map(|(id, session)| SessionInfo {
            id,
            expires_at_ms: session.created_at.saturating_add(ttl_ms),
            created_at_ms: session.created_at,
            guild_id: session.guild_id,
            role_id: session.role_id,
            channel_id: session.channel_id,
            message_id: session.message_id,
            authenticated: session.authenticated,
        })
        .collect();
    Json(infos)
}

/// `DELETE /api/v1/sessions/{id}`
pub async fn delete_session(
    State(s): State<Arc<GateState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if s.sessions.remove(&id).await.is_none() {
        return HttpError::NotFound.to_http_response("session not found").into_response();
    }
    tracing::info!(session_id = %id, "session deleted");
    Json(DeleteSessionResponse { id, removed: true }).into_response()
}

/// `GET /api/v1/credentials`
pub async fn list_credentials(State(s): State<Arc<GateState>>) -> impl IntoResponse {
    let now = epoch_ms();
    let infos: Vec<CredentialInfo> = s
        .credentials
        .all()
        .await
        .into_iter()
        .map(|(user_id, c)| CredentialInfo {
            has_refresh_token: c.has_refresh_token(),
            expired: c.is_expired_at(now),
            expires_at_ms: c.expires_at,
            authenticated_at_ms: c.authenticated_at,
            refreshed_at_ms: c.refreshed_at,
            session_id: c.session_id,
            user_id,
        })
        .collect();
    Json(infos)
}
