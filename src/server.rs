use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::{future::Future, net::SocketAddr, path::PathBuf, sync::Arc};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::{
    config::Config,
    handlers::{self, AppState},
    logs::LogService,
    metrics,
    signals::setup_signal_handlers,
};

/// Ingest payloads are single entries; anything bigger is a client bug
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Start the log service HTTP server
///
/// This function:
/// 1. Initializes metrics
/// 2. Sets up signal handlers for graceful shutdown and ingest key reload
/// 3. Creates the Axum application
/// 4. Binds to the configured address
/// 5. Serves requests with graceful shutdown support
pub async fn start_server(
    config: Config,
    config_path: PathBuf,
    service: Arc<LogService>,
) -> Result<()> {
    info!("Initializing Prometheus metrics...");
    let state = match metrics::init_metrics() {
        Ok(handle) => AppState::new(service.clone()).with_metrics(Arc::new(handle)),
        Err(e) => {
            warn!("Metrics disabled: {}", e);
            AppState::new(service.clone())
        }
    };

    // SIGTERM, SIGINT for shutdown; SIGHUP for reload
    let (shutdown_tx, signal_handle) = setup_signal_handlers(config_path, service.clone())?;
    let mut shutdown_rx = shutdown_tx.subscribe();

    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));

    info!("Starting opslog on {}", addr);
    info!(
        buffer_size = config.logs.buffer_size,
        stream_queue_size = config.logs.stream_queue_size,
        ingest_auth = config.ingest.key().is_some(),
        "Log service configured"
    );

    let listener = TcpListener::bind(addr).await?;

    serve(listener, state, async move {
        let _ = shutdown_rx.recv().await;
        info!("Shutdown signal received, draining connections...");
    })
    .await?;

    signal_handle.await?;
    info!("Server stopped gracefully");

    Ok(())
}

/// Serve `state` on `listener` until `shutdown` resolves
///
/// Open log streams are closed once shutdown begins; graceful shutdown waits
/// for every response to finish, and an SSE response otherwise never does.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let service = state.service.clone();
    let app = create_router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!(streams = service.subscriber_count(), "Closing log streams");
            service.shutdown();
        })
        .await?;

    Ok(())
}

/// Create the Axum router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/logs", get(handlers::logs::get_logs))
        .route("/logs/stream", get(handlers::logs::stream_logs))
        .route("/logs/download", get(handlers::logs::download_logs))
        .route("/logs/ingest", post(handlers::ingest::ingest_log))
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        .route("/metrics", get(handlers::metrics_handler::metrics))
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        // Browser dashboards and frontends call these endpoints cross-origin
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
