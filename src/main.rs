//! Gemini Relay Server
//!
//! Entry point for the query relay.

use mimalloc::MiMalloc;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::sync::Arc;

use dotenvy::dotenv;
use tracing::{error, info, warn};

use gemini_relay::config::AppConfig;
use gemini_relay::keepalive::LivenessProber;
use gemini_relay::llm::{ChatModel, GeminiDriver};
use gemini_relay::{server, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing (M-LOG-STRUCTURED)
    telemetry::init();

    // Load .env (if present)
    let _ = dotenv();

    let config = match AppConfig::load() {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!(error = %e, "Configuration error");
            std::process::exit(1);
        }
    };

    let settings = match config.gemini_settings() {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "Configuration error");
            std::process::exit(1);
        }
    };

    info!(
        name: "llm.config.loaded",
        base_url = %settings.base_url,
        model = %settings.model,
        "LLM configuration loaded"
    );

    if config.keepalive.enabled {
        let (target, interval) = match config
            .keepalive_target()
            .and_then(|t| config.keepalive_interval().map(|i| (t, i)))
        {
            Ok(pair) => pair,
            Err(e) => {
                error!(error = %e, "Configuration error");
                std::process::exit(1);
            }
        };
        if config.keepalive_uses_loopback() {
            warn!(
                target_url = %target,
                "No keepalive.url configured; loopback pings do not keep a hosted process awake"
            );
        }
        tokio::spawn(LivenessProber::new(target, interval).run());
    }

    let model: Arc<dyn ChatModel> = Arc::new(GeminiDriver::new(settings));
    server::start_server(config, model).await
}
