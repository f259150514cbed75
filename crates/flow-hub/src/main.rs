use clap::Parser;
use flow_loki::{HttpCaller, QueryCaller};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;
mod error;
mod flows;
#[cfg(test)]
mod testing;

use config::Config;

// =============================================================================
// CLI
// =============================================================================

#[derive(Parser)]
#[command(name = "flow-hub", version, about = "FLOWSCOPE flow query service")]
struct Args {
    /// Path to config file
    #[arg(long, default_value = "flow-hub.toml")]
    config: PathBuf,

    /// Server bind address (overrides [server] bind)
    #[arg(long)]
    bind: Option<String>,

    /// Loki base URL (overrides [loki] url)
    #[arg(long, env = "FLOW_LOKI_URL")]
    loki_url: Option<String>,
}

// =============================================================================
// Application State
// =============================================================================

pub struct AppState {
    config: Config,
    /// Shared by every request; built once at startup.
    caller: Arc<dyn QueryCaller>,
    start_time: Instant,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "flow_hub=info,flow_loki=info,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(url) = args.loki_url {
        config.loki.url = url;
    }

    let caller = match HttpCaller::new(&config.loki) {
        Ok(caller) => Arc::new(caller),
        Err(e) => {
            tracing::error!("Failed to create Loki client: {}", e);
            std::process::exit(1);
        }
    };

    let addr: SocketAddr = match config.server.bind.parse() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!("Invalid bind address {:?}: {}", config.server.bind, e);
            std::process::exit(1);
        }
    };

    tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    tracing::info!("  FLOWSCOPE v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("  Flows:   http://{}/api/loki/flows", addr);
    tracing::info!("  Status:  http://{}/api/status", addr);
    tracing::info!("  Loki:    {}", config.loki.base_url());
    tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let state = Arc::new(AppState {
        config,
        caller,
        start_time: Instant::now(),
    });
    let app = api::router(state);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
