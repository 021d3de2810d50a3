use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;

use crate::config::Settings;
use crate::dispatch::DispatchEngine;
use crate::ingest::StreamIngester;
use crate::notification::NotificationComposer;
use crate::registry::SubscriptionRegistry;
use crate::transport::PushTransport;

/// Capacity of the raw-event channel between the stream source and the
/// ingester.
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub registry: Arc<SubscriptionRegistry>,
    pub composer: Arc<NotificationComposer>,
    pub engine: Arc<DispatchEngine>,
    pub ingester: Arc<StreamIngester>,
    /// Feed for raw stream events; the ingester consumes the other end.
    pub event_tx: mpsc::Sender<serde_json::Value>,
    pub started_at: Instant,
}

impl AppState {
    /// Build the state plus the receiving end of the event channel,
    /// which the caller hands to `StreamIngester::run`.
    pub fn new(
        settings: Settings,
        transport: Arc<dyn PushTransport>,
    ) -> (Self, mpsc::Receiver<serde_json::Value>) {
        let registry = Arc::new(SubscriptionRegistry::new());
        let composer = Arc::new(NotificationComposer::new(&settings.notification));
        let engine = Arc::new(DispatchEngine::new(
            registry.clone(),
            transport,
            settings.dispatch.clone(),
        ));
        let ingester = Arc::new(StreamIngester::new(composer.clone(), engine.clone()));
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        (
            Self {
                settings: Arc::new(settings),
                registry,
                composer,
                engine,
                ingester,
                event_tx,
                started_at: Instant::now(),
            },
            event_rx,
        )
    }
}
