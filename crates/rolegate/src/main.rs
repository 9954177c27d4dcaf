// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use rolegate::config::GateConfig;

fn init_tracing(config: &GateConfig) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match config.log_format.as_str() {
        "json" => {
            fmt::fmt().with_env_filter(filter).json().init();
        }
        _ => {
            fmt::fmt().with_env_filter(filter).init();
        }
    }
}

#[tokio::main]
async fn main() {
    let config = GateConfig::parse();
    init_tracing(&config);

    if let Err(e) = rolegate::run(config).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
