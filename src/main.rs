//! Mode Chat server entry point.

use mimalloc::MiMalloc;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::sync::Arc;

use dotenvy::dotenv;
use tracing::{info, warn};

use mode_chat::config::{AppConfig, load_llm_settings};
use mode_chat::{server, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present)
    let _ = dotenv();

    telemetry::init();

    let config = Arc::new(AppConfig::load()?);
    info!(
        name: "config.loaded",
        host = %config.server.host,
        port = config.server.port,
        rate_limit_enabled = config.resilience.rate_limit_enabled,
        "Configuration loaded"
    );

    let settings = match load_llm_settings(&config.chat) {
        Ok(s) => Some(s),
        Err(msg) => {
            warn!(
                name: "llm.config.missing",
                reason = %msg,
                "Provider not configured; chat and image requests will report it unavailable"
            );
            None
        }
    };

    server::start_server(config, settings).await
}
