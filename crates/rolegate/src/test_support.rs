// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: a scripted provider mock and state builders.

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use clap::Parser;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::GateConfig;
use crate::correlate::inbox::Inbound;
use crate::correlate::relay::Relay;
use crate::credential::CredentialStore;
use crate::discord::DiscordClient;
use crate::session::token::TokenCodec;
use crate::session::SessionStore;
use crate::state::GateState;

/// One request seen by [`MockDiscord`].
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub query: String,
    pub authorization: Option<String>,
    pub body: String,
}

impl Recorded {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Default)]
struct MockInner {
    recorded: Mutex<Vec<Recorded>>,
    /// Scripted answers per `(METHOD, path)`. The last answer repeats.
    scripts: Mutex<HashMap<(String, String), VecDeque<(u16, String)>>>,
    /// Routes that record the request and never answer.
    stalled: Mutex<HashSet<(String, String)>>,
}

/// In-process stand-in for the provider REST API.
///
/// Unscripted routes answer `404 {"code":10000}`.
pub struct MockDiscord {
    addr: SocketAddr,
    inner: Arc<MockInner>,
    task: JoinHandle<()>,
}

impl MockDiscord {
    pub async fn start() -> anyhow::Result<Self> {
        let inner = Arc::new(MockInner::default());
        let app = Router::new().fallback(mock_handler).with_state(Arc::clone(&inner));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Ok(Self { addr, inner, task })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Queue an answer for `method path`.
    pub async fn respond(&self, method: &str, path: &str, status: u16, body: impl Into<String>) {
        let mut scripts = self.inner.scripts.lock().await;
        scripts
            .entry((method.to_uppercase(), path.to_owned()))
            .or_default()
            .push_back((status, body.into()));
    }

    /// Never answer `method path`, so callers hit their request timeout.
    pub async fn stall(&self, method: &str, path: &str) {
        self.inner.stalled.lock().await.insert((method.to_uppercase(), path.to_owned()));
    }

    pub async fn requests(&self) -> Vec<Recorded> {
        self.inner.recorded.lock().await.clone()
    }

    pub async fn requests_to(&self, method: &str, path: &str) -> Vec<Recorded> {
        self.requests()
            .await
            .into_iter()
            .filter(|r| r.method.eq_ignore_ascii_case(method) && r.path == path)
            .collect()
    }

    pub async fn count(&self, method: &str, path: &str) -> usize {
        self.requests_to(method, path).await.len()
    }
}

impl Drop for MockDiscord {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn mock_handler(
    State(inner): State<Arc<MockInner>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_owned();
    inner.recorded.lock().await.push(Recorded {
        method: method.as_str().to_owned(),
        path: path.clone(),
        query: uri.query().unwrap_or_default().to_owned(),
        authorization: headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned),
        body: String::from_utf8_lossy(&body).into_owned(),
    });

    let route = (method.as_str().to_owned(), path.clone());
    if inner.stalled.lock().await.contains(&route) {
        std::future::pending::<()>().await;
    }

    let answer = {
        let mut scripts = inner.scripts.lock().await;
        scripts.get_mut(&(method.as_str().to_owned(), path)).and_then(|queue| {
            if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            }
        })
    };
    let (status, body) =
        answer.unwrap_or((404, r#"{"code":10000,"message":"Unknown"}"#.to_owned()));
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, [(axum::http::header::CONTENT_TYPE, "application/json")], body).into_response()
}

/// Parse a config pointing at `api_base`, with test credentials filled in.
pub fn test_config(api_base: &str, extra: &[&str]) -> anyhow::Result<GateConfig> {
    let mut args = vec![
        "rolegate",
        "--client-id",
        "client-1",
        "--client-secret",
        "secret-1",
        "--bot-token",
        "bot-1",
        "--redirect-uri",
        "http://127.0.0.1:9810/callback",
        "--api-base",
        api_base,
        "--batch-max-retries",
        "2",
    ];
    args.extend_from_slice(extra);
    Ok(GateConfig::try_parse_from(args)?)
}

/// Builder for [`GateState`] with memory-only stores and an in-process relay.
pub struct GateStateBuilder {
    config: GateConfig,
    sessions: Option<Arc<SessionStore>>,
    credentials: Option<Arc<CredentialStore>>,
}

impl GateStateBuilder {
    pub fn new(config: GateConfig) -> Self {
        Self { config, sessions: None, credentials: None }
    }

    pub fn sessions(mut self, sessions: Arc<SessionStore>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn credentials(mut self, credentials: Arc<CredentialStore>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Build the state and the receiving end of its local relay.
    pub fn build(self) -> (Arc<GateState>, mpsc::Receiver<Inbound>) {
        let sessions = self.sessions.unwrap_or_else(|| {
            let codec = TokenCodec::new(self.config.state_secret.as_deref());
            Arc::new(SessionStore::new(codec, self.config.session_ttl(), None))
        });
        let credentials =
            self.credentials.unwrap_or_else(|| Arc::new(CredentialStore::new(None)));
        let api = Arc::new(DiscordClient::from_config(&self.config));
        let (relay, rx) = Relay::local(64);
        let state = GateState::new(
            self.config,
            sessions,
            credentials,
            api,
            relay,
            CancellationToken::new(),
        );
        (Arc::new(state), rx)
    }
}
