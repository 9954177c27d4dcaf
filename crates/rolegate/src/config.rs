// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the rolegate bot and callback service.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "rolegate", version, about)]
pub struct GateConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "ROLEGATE_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 9810, env = "ROLEGATE_PORT")]
    pub port: u16,

    /// Bearer token for the operator API. If unset, auth is disabled.
    #[arg(long, env = "ROLEGATE_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// OAuth application client ID.
    #[arg(long, env = "DISCORD_CLIENT_ID")]
    pub client_id: String,

    /// OAuth application client secret.
    #[arg(long, env = "DISCORD_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: String,

    /// Bot token used for every privileged call.
    #[arg(long, env = "DISCORD_BOT_TOKEN", hide_env_values = true)]
    pub bot_token: String,

    /// Redirect URI registered with the OAuth application (points at `/callback`).
    #[arg(long, env = "ROLEGATE_REDIRECT_URI")]
    pub redirect_uri: String,

    /// Public base URL used to build `/auth?session=` links.
    #[arg(long, default_value = "http://127.0.0.1:9810", env = "ROLEGATE_PUBLIC_URL")]
    pub public_url: String,

    /// Provider REST API base.
    #[arg(long, default_value = "https://discord.com/api/v10", env = "ROLEGATE_API_BASE")]
    pub api_base: String,

    /// Provider authorize endpoint.
    #[arg(
        long,
        default_value = "https://discord.com/oauth2/authorize",
        env = "ROLEGATE_AUTHORIZE_URL"
    )]
    pub authorize_url: String,

    /// OAuth scopes requested on the authorize redirect.
    #[arg(long, default_value = "identify guilds.join", env = "ROLEGATE_SCOPES")]
    pub scopes: String,

    /// Guild used when a grant or batch request names none.
    #[arg(long, env = "DISCORD_GUILD_ID")]
    pub default_guild_id: Option<String>,

    /// Channel that carries callback notifications. Unset = in-process relay.
    #[arg(long, env = "ROLEGATE_NOTIFY_CHANNEL_ID")]
    pub notify_channel_id: Option<String>,

    /// Notification channel poll interval in milliseconds.
    #[arg(long, default_value_t = 3000, env = "ROLEGATE_RELAY_POLL_MS")]
    pub relay_poll_ms: u64,

    /// Directory for `sessions.json` and `credentials.json`.
    #[arg(long, env = "ROLEGATE_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Session time-to-live in seconds.
    #[arg(long, default_value_t = 86_400, env = "ROLEGATE_SESSION_TTL_SECS")]
    pub session_ttl_secs: u64,

    /// Periodic flush (and expired-session sweep) interval in seconds.
    #[arg(long, default_value_t = 300, env = "ROLEGATE_FLUSH_INTERVAL_SECS")]
    pub flush_interval_secs: u64,

    /// Secret used to sign session tokens. Unsigned tokens when unset.
    #[arg(long, env = "ROLEGATE_STATE_SECRET", hide_env_values = true)]
    pub state_secret: Option<String>,

    /// Per-user retries for rate-limited or failed member-add calls in a batch.
    #[arg(long, default_value_t = 2, env = "ROLEGATE_BATCH_MAX_RETRIES")]
    pub batch_max_retries: u32,

    /// Outbound HTTP request timeout in seconds.
    #[arg(long, default_value_t = 30, env = "ROLEGATE_HTTP_TIMEOUT_SECS")]
    pub http_timeout_secs: u64,

    /// Log filter (tracing `EnvFilter` syntax).
    #[arg(long, default_value = "info", env = "ROLEGATE_LOG_LEVEL")]
    pub log_level: String,

    /// Log format: `text` or `json`.
    #[arg(long, default_value = "text", env = "ROLEGATE_LOG_FORMAT")]
    pub log_format: String,
}

impl GateConfig {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs.max(1))
    }

    pub fn relay_poll_interval(&self) -> Duration {
        Duration::from_millis(self.relay_poll_ms.max(100))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Resolve the state directory.
    ///
    /// Checks `--state-dir`, then `$XDG_STATE_HOME/rolegate`,
    /// then `$HOME/.local/state/rolegate`.
    pub fn state_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.state_dir {
            return dir.clone();
        }
        if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
            return PathBuf::from(xdg).join("rolegate");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".local/state/rolegate");
        }
        PathBuf::from(".rolegate")
    }

    pub fn sessions_path(&self) -> PathBuf {
        self.state_dir().join("sessions.json")
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.state_dir().join("credentials.json")
    }

    /// Link an end-user follows to start authentication for a session.
    pub fn auth_link(&self, session_id: &str) -> String {
        auth_link(&self.public_url, session_id)
    }
}

/// `<public_url>/auth?session=<id>`.
pub fn auth_link(public_url: &str, session_id: &str) -> String {
    format!(
        "{}/auth?session={}",
        public_url.trim_end_matches('/'),
        crate::discord::urlencoding(session_id)
    )
}
