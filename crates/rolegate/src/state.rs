// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::batch::BatchRunner;
use crate::config::GateConfig;
use crate::correlate::relay::Relay;
use crate::correlate::Correlator;
use crate::credential::refresh::TokenRefresher;
use crate::credential::CredentialStore;
use crate::discord::DiscordClient;
use crate::session::SessionStore;

/// Shared gate state.
pub struct GateState {
    pub config: GateConfig,
    pub sessions: Arc<SessionStore>,
    pub credentials: Arc<CredentialStore>,
    pub api: Arc<DiscordClient>,
    pub refresher: Arc<TokenRefresher>,
    /// Where the callback handler sends notifications.
    pub relay: Relay,
    pub shutdown: CancellationToken,
}

impl GateState {
    pub fn new(
        config: GateConfig,
        sessions: Arc<SessionStore>,
        credentials: Arc<CredentialStore>,
        api: Arc<DiscordClient>,
        relay: Relay,
        shutdown: CancellationToken,
    ) -> Self {
        let refresher = Arc::new(TokenRefresher::new(Arc::clone(&api), Arc::clone(&credentials)));
        Self { config, sessions, credentials, api, refresher, relay, shutdown }
    }

    pub fn correlator(&self) -> Correlator {
        Correlator::new(
            Arc::clone(&self.sessions),
            Arc::clone(&self.credentials),
            Arc::clone(&self.api),
            &self.config.public_url,
        )
    }

    pub fn batch_runner(&self) -> BatchRunner {
        BatchRunner::new(
            Arc::clone(&self.credentials),
            Arc::clone(&self.refresher),
            Arc::clone(&self.api),
            self.config.batch_max_retries,
        )
    }
}

/// Return current epoch millis.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
