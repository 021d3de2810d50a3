//! Live stream consumption.
//!
//! The stream-source collaborator owns the connection and its
//! reconnect/backoff behavior; it hands raw events over an mpsc
//! channel. Malformed events are upstream noise, dropped without
//! raising an error.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};

use crate::dispatch::{DispatchEngine, DispatchReport};
use crate::notification::{NotificationComposer, StreamEvent};

/// Wire shape of a raw stream event; every field optional until
/// validated.
#[derive(Debug, Deserialize)]
struct RawStreamEvent {
    id: Option<String>,
    author: Option<RawAuthor>,
    text: Option<String>,
    lang: Option<String>,
    timestamp_ms: Option<u64>,
    media_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawAuthor {
    name: Option<String>,
    avatar_url: Option<String>,
}

impl RawStreamEvent {
    /// Promote to a `StreamEvent`, requiring a non-empty source id and
    /// author name. Everything else gets a defensible default.
    fn validate(self) -> Option<StreamEvent> {
        let source_id = self.id.filter(|id| !id.is_empty())?;
        let author = self.author?;
        let author_name = author.name.filter(|name| !name.is_empty())?;

        Some(StreamEvent {
            source_id,
            author_name,
            author_avatar_url: author.avatar_url.unwrap_or_default(),
            text: self.text.unwrap_or_default(),
            lang: self.lang.unwrap_or_else(|| "en".to_string()),
            timestamp_ms: self.timestamp_ms.unwrap_or_default(),
            media_url: self.media_url,
        })
    }
}

#[derive(Debug, Default)]
struct IngestCounters {
    received: AtomicU64,
    dropped: AtomicU64,
    dispatched: AtomicU64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct IngestStatsSnapshot {
    pub received: u64,
    pub dropped: u64,
    pub dispatched: u64,
}

/// Consumes the external event stream and forwards valid events into
/// the composer + dispatch pipeline.
pub struct StreamIngester {
    composer: Arc<NotificationComposer>,
    engine: Arc<DispatchEngine>,
    counters: IngestCounters,
}

impl StreamIngester {
    pub fn new(composer: Arc<NotificationComposer>, engine: Arc<DispatchEngine>) -> Self {
        Self {
            composer,
            engine,
            counters: IngestCounters::default(),
        }
    }

    pub fn stats(&self) -> IngestStatsSnapshot {
        IngestStatsSnapshot {
            received: self.counters.received.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
        }
    }

    /// Handle one raw event from the stream. Malformed events produce
    /// no payload and no broadcast.
    pub async fn on_event(&self, raw: serde_json::Value) -> Option<DispatchReport> {
        self.counters.received.fetch_add(1, Ordering::Relaxed);

        let event = match serde_json::from_value::<RawStreamEvent>(raw)
            .ok()
            .and_then(RawStreamEvent::validate)
        {
            Some(event) => event,
            None => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Dropped malformed stream event");
                return None;
            }
        };

        let payload = self.composer.from_stream_event(&event);
        let report = self.engine.broadcast(&payload).await;
        self.counters.dispatched.fetch_add(1, Ordering::Relaxed);

        tracing::info!(
            source_id = %event.source_id,
            author = %event.author_name,
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            "Dispatched stream event"
        );

        Some(report)
    }

    /// Lifetime-of-process loop over the channel the stream source
    /// feeds. Ends when the source hangs up or shutdown is signaled.
    pub async fn run(
        &self,
        mut events: mpsc::Receiver<serde_json::Value>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        tracing::info!("Stream ingester started");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Stream ingester received shutdown signal");
                    break;
                }
                event = events.recv() => {
                    match event {
                        Some(raw) => {
                            self.on_event(raw).await;
                        }
                        None => {
                            tracing::warn!("Stream source closed the event channel");
                            break;
                        }
                    }
                }
            }
        }

        tracing::info!("Stream ingester stopped");
    }
}
