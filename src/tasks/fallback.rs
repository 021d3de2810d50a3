use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::config::FallbackConfig;
use crate::dispatch::DispatchEngine;
use crate::notification::NotificationComposer;

/// Background task firing a synthetic notification on a fixed interval.
///
/// Lets an operator verify the delivery path independently of live
/// stream traffic. Off by default; the loop exits immediately when the
/// config leaves it disabled.
pub struct FallbackTask {
    config: FallbackConfig,
    composer: Arc<NotificationComposer>,
    engine: Arc<DispatchEngine>,
    shutdown: broadcast::Receiver<()>,
}

impl FallbackTask {
    pub fn new(
        config: FallbackConfig,
        composer: Arc<NotificationComposer>,
        engine: Arc<DispatchEngine>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            composer,
            engine,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        if !self.config.enabled {
            tracing::info!("Fallback trigger disabled");
            return;
        }

        let mut timer = tokio::time::interval(Duration::from_secs(self.config.interval_secs));
        // Skip immediate first tick
        timer.tick().await;

        tracing::info!(
            interval_secs = self.config.interval_secs,
            "Fallback trigger started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Fallback trigger received shutdown signal");
                    break;
                }
                _ = timer.tick() => {
                    self.tick().await;
                }
            }
        }

        tracing::info!("Fallback trigger stopped");
    }

    /// One tick: compose the fixed liveness payload and broadcast it.
    pub async fn tick(&self) {
        let payload = self.composer.from_fallback_tick();
        let report = self.engine.broadcast(&payload).await;

        tracing::debug!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            "Fallback tick dispatched"
        );
    }
}
