pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod logs;
pub mod metrics;
pub mod server;
pub mod signals;

use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::ServerConfig;
use crate::logs::{CaptureLayer, LogService};

/// Initialize tracing for the server
///
/// Events that pass the filter go to stdout (text or JSON per
/// `server.log_format`) and into the log service via [`CaptureLayer`], so the
/// service's own diagnostics are queryable over HTTP. `RUST_LOG` overrides
/// `server.log_level`.
///
/// Can only be called once per process.
pub fn init_tracing(server: &ServerConfig, service: Arc<LogService>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&server.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let (json_layer, text_layer) = if server.log_format == "json" {
        (Some(fmt::layer().json().with_target(true)), None)
    } else {
        (None, Some(fmt::layer().with_target(true)))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .with(CaptureLayer::new(service))
        .try_init()?;

    Ok(())
}

/// Initialize console-only tracing for client commands
pub fn init_cli_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init();
}
