mod handlers;
mod routes;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use runlet_engine::{run_reaper, ExecutionRouter, RouterConfig};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

const REAPER_INTERVAL: Duration = Duration::from_secs(60);
const REAPER_MAX_JOB_AGE: Duration = Duration::from_secs(300);

pub struct AppState {
    pub router: ExecutionRouter,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Runlet API booting...");

    let use_kubernetes = std::env::var("USE_KUBERNETES")
        .map(|v| v.to_lowercase() == "true")
        .unwrap_or(false);
    let namespace =
        std::env::var("KUBERNETES_NAMESPACE").unwrap_or_else(|_| "runlet".to_string());
    let port: u16 = std::env::var("APP_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    let config = RouterConfig {
        use_kubernetes,
        namespace,
    };
    let router = ExecutionRouter::new(&config)
        .await
        .context("failed to initialize execution router")?;
    info!(backend = router.backend_name(), "execution backend ready");

    // The reaper only runs against the orchestrated backend; its shutdown is
    // an explicit watch channel, flipped after the server drains.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    if let Some(backend) = router.kubernetes_backend() {
        tokio::spawn(run_reaper(
            backend.clone(),
            REAPER_INTERVAL,
            REAPER_MAX_JOB_AGE,
            shutdown_rx,
        ));
    }

    let state = Arc::new(AppState { router });
    let app = routes::routes().with_state(state);

    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("received shutdown signal");
        })
        .await
        .context("server error")?;

    let _ = shutdown_tx.send(true);
    info!("shutdown complete");
    Ok(())
}
