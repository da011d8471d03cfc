mod config;
mod routes;
mod service_exec;
mod state;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env()?;

    let public_key = hex::encode(cfg.signing_key.verifying_key().as_bytes());
    if cfg.signing_key_from_env {
        info!(public_key=%public_key, "ledgerd: signing roots");
    } else {
        warn!(
            public_key=%public_key,
            "ledgerd: LEDGERD_SIGNING_KEY not set, signing roots with an ephemeral key"
        );
    }
    if !cfg.require_auth {
        warn!("ledgerd: authentication disabled");
    }

    let app_state = Arc::new(AppState::new(&cfg));
    let app = routes::router(app_state);

    let addr = &cfg.bind_addr;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(addr=%addr, users=%cfg.users.len(), "ledgerd: listening");
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
