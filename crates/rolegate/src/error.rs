// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Errors raised by the session, credential, correlation and batch paths.
///
/// None of these are allowed to take the process down: each one is caught
/// and logged at the boundary where it occurs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    /// Inbound notification was not JSON or lacked `userId`/`sessionId`.
    MalformedNotification(String),
    SessionNotFound(String),
    SessionExpired(String),
    /// Session token failed to decode or its signature did not verify.
    InvalidSessionToken,
    /// The `(session, user)` pair was already processed.
    DuplicateNotification { session_id: String, user_id: String },
    /// Member-add answered with a non-success status.
    MemberAddRejected { status: u16, message: String },
    /// Member-add rejected because the end-user account is unverified.
    AccountUnverified,
    /// Token endpoint refused the refresh grant. Carries the provider body.
    RefreshRejected(String),
    MissingRefreshToken(String),
    /// Any other provider call answered with a non-success status.
    ProviderRejected { status: u16, body: String },
    /// Provider answered 2xx with a body we could not decode.
    UnexpectedResponse(String),
    NetworkFailure(String),
    DurablePersistFailure(String),
}

impl GateError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedNotification(_) => "MALFORMED_NOTIFICATION",
            Self::SessionNotFound(_) => "SESSION_NOT_FOUND",
            Self::SessionExpired(_) => "SESSION_EXPIRED",
            Self::InvalidSessionToken => "INVALID_SESSION_TOKEN",
            Self::DuplicateNotification { .. } => "DUPLICATE_NOTIFICATION",
            Self::MemberAddRejected { .. } => "MEMBER_ADD_REJECTED",
            Self::AccountUnverified => "ACCOUNT_UNVERIFIED",
            Self::RefreshRejected(_) => "REFRESH_REJECTED",
            Self::MissingRefreshToken(_) => "MISSING_REFRESH_TOKEN",
            Self::ProviderRejected { .. } => "PROVIDER_REJECTED",
            Self::UnexpectedResponse(_) => "UNEXPECTED_RESPONSE",
            Self::NetworkFailure(_) => "NETWORK_FAILURE",
            Self::DurablePersistFailure(_) => "DURABLE_PERSIST_FAILURE",
        }
    }

    /// HTTP code used when this error surfaces on the admin API.
    pub fn http_code(&self) -> HttpError {
        match self {
            Self::MalformedNotification(_) | Self::InvalidSessionToken => HttpError::BadRequest,
            Self::SessionNotFound(_) | Self::SessionExpired(_) => HttpError::NotFound,
            Self::DuplicateNotification { .. } => HttpError::Conflict,
            Self::MemberAddRejected { .. }
            | Self::AccountUnverified
            | Self::RefreshRejected(_)
            | Self::MissingRefreshToken(_)
            | Self::ProviderRejected { .. }
            | Self::UnexpectedResponse(_)
            | Self::NetworkFailure(_) => HttpError::UpstreamError,
            Self::DurablePersistFailure(_) => HttpError::Internal,
        }
    }

    /// Transport-level failure; batch grants retry these with backoff.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::NetworkFailure(_))
    }
}

impl fmt::Display for GateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedNotification(why) => write!(f, "malformed notification: {why}"),
            Self::SessionNotFound(id) => write!(f, "session not found: {id}"),
            Self::SessionExpired(id) => write!(f, "session expired: {id}"),
            Self::InvalidSessionToken => f.write_str("invalid session token"),
            Self::DuplicateNotification { session_id, user_id } => {
                write!(f, "duplicate notification for {user_id} in session {session_id}")
            }
            Self::MemberAddRejected { status, message } => {
                write!(f, "member add rejected ({status}): {message}")
            }
            Self::AccountUnverified => f.write_str("account is not verified"),
            Self::RefreshRejected(body) => write!(f, "refresh rejected: {body}"),
            Self::MissingRefreshToken(user) => write!(f, "no refresh token stored for {user}"),
            Self::ProviderRejected { status, body } => {
                write!(f, "provider rejected request ({status}): {body}")
            }
            Self::UnexpectedResponse(why) => write!(f, "unexpected provider response: {why}"),
            Self::NetworkFailure(why) => write!(f, "network failure: {why}"),
            Self::DurablePersistFailure(why) => write!(f, "failed to persist state: {why}"),
        }
    }
}

impl std::error::Error for GateError {}

impl From<reqwest::Error> for GateError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::UnexpectedResponse(e.to_string())
        } else {
            Self::NetworkFailure(e.to_string())
        }
    }
}

/// Error codes for the HTTP surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpError {
    Unauthorized,
    BadRequest,
    NotFound,
    Conflict,
    UpstreamError,
    Internal,
}

impl HttpError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthorized => 401,
            Self::BadRequest => 400,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::UpstreamError => 502,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::BadRequest => "BAD_REQUEST",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::UpstreamError => "UPSTREAM_ERROR",
            Self::Internal => "INTERNAL",
        }
    }

    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into() }
    }

    pub fn to_http_response(
        &self,
        message: impl Into<String>,
    ) -> (StatusCode, Json<ErrorResponse>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse { error: self.to_error_body(message) };
        (status, Json(body))
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
