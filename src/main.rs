use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pulsefeed_push_service::config::Settings;
use pulsefeed_push_service::server::{create_app, AppState};
use pulsefeed_push_service::tasks::FallbackTask;
use pulsefeed_push_service::transport::WebPushTransport;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    init_tracing();

    // Load configuration
    let settings = Settings::new()?;
    tracing::info!("Configuration loaded");

    // Set up the push transport and application state
    let transport = Arc::new(WebPushTransport::new(settings.vapid.clone())?);
    let (state, event_rx) = AppState::new(settings.clone(), transport);
    tracing::info!("Application state initialized");

    let (shutdown_tx, _) = broadcast::channel(1);

    // Start the stream ingester in background; the stream-source
    // collaborator feeds events through state.event_tx.
    let ingester = state.ingester.clone();
    let ingester_shutdown = shutdown_tx.subscribe();
    let ingester_handle = tokio::spawn(async move {
        ingester.run(event_rx, ingester_shutdown).await;
    });

    // Start fallback trigger in background
    let fallback_task = FallbackTask::new(
        settings.fallback.clone(),
        state.composer.clone(),
        state.engine.clone(),
        shutdown_tx.subscribe(),
    );
    let fallback_handle = tokio::spawn(async move {
        fallback_task.run().await;
    });

    // Create Axum app
    let app = create_app(state);

    // Start server
    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_handler(shutdown_tx))
        .await?;

    // Wait for background tasks to finish
    tracing::info!("Waiting for background tasks to finish...");
    let _ = tokio::join!(ingester_handle, fallback_handle);

    tracing::info!("Server shutdown complete");
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal_handler(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }

    // Stop the ingester and fallback trigger
    let _ = shutdown_tx.send(());
}
