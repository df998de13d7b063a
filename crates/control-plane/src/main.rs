//! flowrun Control Plane Server
//!
//! Runs the execution controller against the configured store and serves
//! the HTTP API for templates, executions and runs.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use flowrun_control_plane::{
    bootstrap,
    config::{AppConfig, DatabaseConfig, StoreBackend},
    controller::{Controller, ControllerConfig},
    db::create_pool,
    handlers,
    services::WorkflowService,
    state::AppState,
    store::{Client, MemoryStore, PgStore, Store},
};

/// Initialize tracing/logging.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,flowrun_control_plane=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Open the configured store backend.
async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn Store>> {
    match config.store {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store, state is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Postgres => {
            let db_config = DatabaseConfig::from_env().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to load database config, using defaults");
                DatabaseConfig::default()
            });
            tracing::info!(database = %db_config.display_target(), "Connecting to PostgreSQL store");
            let pool = create_pool(&db_config).await?;
            Ok(Arc::new(PgStore::connect(pool).await?))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    let config_result = AppConfig::from_env();
    let log_json = config_result.as_ref().map(|c| c.log_json).unwrap_or(false);
    init_tracing(log_json);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting flowrun Control Plane"
    );

    let app_config = config_result.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load app config, using defaults");
        AppConfig::default()
    });

    tracing::info!(
        host = %app_config.host,
        port = app_config.port,
        store = ?app_config.store,
        workers = app_config.workers,
        debug = app_config.debug,
        "Configuration loaded"
    );

    let client = Client::new(open_store(&app_config).await?);

    if let Some(dir) = &app_config.bootstrap_dir {
        bootstrap::load_workflows(&WorkflowService::new(client.clone()), dir).await?;
    }

    let controller = Arc::new(Controller::new(
        client.clone(),
        ControllerConfig::from(&app_config),
    ));
    let controller_handle = controller.start().await?;

    let state = AppState::new(client, controller_handle.queue(), app_config.clone());
    let app = handlers::router(state);

    // Bind to address
    let addr: SocketAddr = app_config.bind_address().parse()?;
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(address = %addr, "Server listening");

    // Run the server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    controller_handle.shutdown().await;

    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
