mod api;
mod config;
mod scan;
mod state;
mod utils;

use std::sync::Arc;

use api::api_router;
use axum::Router;
use config::{config_path_from_env, load_or_create_config, resolve_path};
use library::{CoverStore, RedbCatalog, Scanner};
use parking_lot::RwLock;
use scan::{start_scan, StartScanError};
use state::AppState;
use tower_http::request_id::{MakeRequestUuid, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = config_path_from_env();
    let (config, created) = load_or_create_config(&config_path)?;
    if created {
        info!("Created default config at {:?}", config_path);
    } else {
        info!("Loaded config from {:?}", config_path);
    }

    let index_path = resolve_path(&config_path, config.index_path.trim());
    let covers_path = resolve_path(&config_path, config.covers_path.trim());
    let catalog = RedbCatalog::open(&index_path)?;
    info!("Opened catalog at {:?}", index_path);
    let scanner = Scanner::new(Arc::new(catalog), CoverStore::new(covers_path));

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let state = AppState {
        config_path,
        config: Arc::new(RwLock::new(config.clone())),
        scanner,
    };

    if config.scan_on_start {
        match start_scan(&state, config.default_scan_mode) {
            Ok(()) => {}
            Err(StartScanError::Unconfigured) => {
                info!("Music directory not configured yet; set music_root in the config file.")
            }
            Err(err) => warn!("Startup scan not started: {}", err),
        }
    }

    let app = Router::new()
        .nest("/api/v1", api_router(state.clone()))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Listening on {}", bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;
    Ok(())
}

async fn shutdown_signal(state: AppState) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(err) => {
                warn!("Failed to install terminate signal handler: {}", err);
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", err);
        }
    }

    info!("Shutdown signal received.");
    if state.scanner.cancel() {
        info!("Cancelled the running scan.");
    }
}
