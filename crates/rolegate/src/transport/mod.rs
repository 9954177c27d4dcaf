// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP transport: the operator API and the browser-facing OAuth endpoints.

pub mod auth;
pub mod callback;
pub mod http;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::GateState;

/// Build the axum `Router` with all gate routes.
pub fn build_router(state: Arc<GateState>) -> Router {
    Router::new()
        // Health (no auth)
        .route("/api/v1/health", get(http::health))
        // Operator commands
        .route("/api/v1/grants", post(http::create_grant))
        .route("/api/v1/batch", post(http::run_batch))
        .route("/api/v1/sessions", get(http::list_sessions))
        .route("/api/v1/sessions/{id}", delete(http::delete_session))
        .route("/api/v1/credentials", get(http::list_credentials))
        // OAuth flow (no auth)
        .route("/auth", get(callback::authorize))
        .route("/callback", get(callback::callback))
        .route("/success", get(callback::success))
        // Middleware
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
