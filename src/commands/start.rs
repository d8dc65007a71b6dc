use anyhow::Result;
use colored::Colorize;
use opslog::{config, init_tracing, logs::LogService, server};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Execute the start command
///
/// Loads configuration, builds the log service, routes tracing into it and
/// serves until SIGTERM/SIGINT.
pub async fn execute(config_path: &Path) -> Result<()> {
    println!("{}", "Starting opslog...".green());

    let cfg = config::load_config(config_path)?;
    let service = Arc::new(LogService::new(&cfg.logs, &cfg.ingest));

    init_tracing(&cfg.server, service.clone())?;
    info!(config = %config_path.display(), "Starting opslog");

    server::start_server(cfg, config_path.to_path_buf(), service).await
}
