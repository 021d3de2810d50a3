use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;

use crate::config::DispatchConfig;
use crate::notification::NotificationPayload;
use crate::registry::{Subscription, SubscriptionRegistry};
use crate::transport::{PushError, PushTransport};

/// A single failed delivery attempt within a fan-out.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryFailure {
    pub endpoint: String,
    #[serde(serialize_with = "serialize_error")]
    pub error: PushError,
}

fn serialize_error<S: serde::Serializer>(err: &PushError, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(err)
}

/// Structured result of one fan-out call.
///
/// Failures are isolated per subscriber and recorded here instead of
/// aborting the broadcast; nothing in the engine retries.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failures: Vec<DeliveryFailure>,
    /// Endpoints removed from the registry because the transport
    /// reported them permanently gone (only when pruning is enabled).
    pub pruned: Vec<String>,
}

impl DispatchReport {
    fn record(&mut self, endpoint: &str, result: Result<(), PushError>) {
        self.attempted += 1;
        match result {
            Ok(()) => self.succeeded += 1,
            Err(error) => {
                self.failed += 1;
                self.failures.push(DeliveryFailure {
                    endpoint: endpoint.to_string(),
                    error,
                });
            }
        }
    }
}

/// Running counters for the dispatch engine.
#[derive(Debug, Default)]
pub struct DispatchStats {
    pub broadcasts: AtomicU64,
    pub attempted: AtomicU64,
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
    pub pruned: AtomicU64,
}

impl DispatchStats {
    pub fn snapshot(&self) -> DispatchStatsSnapshot {
        DispatchStatsSnapshot {
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            attempted: self.attempted.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            pruned: self.pruned.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatchStatsSnapshot {
    pub broadcasts: u64,
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub pruned: u64,
}

/// Delivers composed payloads to subscriptions concurrently.
///
/// Every fan-out operates on a registry snapshot taken at dispatch
/// time: a subscriber added afterwards misses the event, one removed
/// afterwards may still receive this one delivery.
pub struct DispatchEngine {
    registry: Arc<SubscriptionRegistry>,
    transport: Arc<dyn PushTransport>,
    config: DispatchConfig,
    stats: DispatchStats,
}

impl DispatchEngine {
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        transport: Arc<dyn PushTransport>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            registry,
            transport,
            config,
            stats: DispatchStats::default(),
        }
    }

    pub fn stats(&self) -> DispatchStatsSnapshot {
        self.stats.snapshot()
    }

    /// Single-target delivery primitive.
    pub async fn send_to(
        &self,
        payload_bytes: &[u8],
        subscription: &Subscription,
    ) -> Result<(), PushError> {
        self.transport.deliver(subscription, payload_bytes).await
    }

    /// Deliver a payload to every current subscription.
    #[tracing::instrument(name = "dispatch.broadcast", skip(self, payload), fields(tag = %payload.tag))]
    pub async fn broadcast(&self, payload: &NotificationPayload) -> DispatchReport {
        let snapshot = self.registry.snapshot().await;
        self.fan_out(payload, snapshot).await
    }

    /// Deliver a payload to the subscriptions whose owner appears in
    /// `owners`. Explicitly separate from `broadcast`: a targeted send
    /// never silently widens to the whole registry.
    #[tracing::instrument(
        name = "dispatch.send_to_owners",
        skip(self, payload, owners),
        fields(tag = %payload.tag, owner_count = owners.len())
    )]
    pub async fn send_to_owners(
        &self,
        payload: &NotificationPayload,
        owners: &[String],
    ) -> DispatchReport {
        let snapshot = self.registry.snapshot().await;
        let targets: Vec<Subscription> = snapshot
            .into_iter()
            .filter(|s| s.owner.as_deref().is_some_and(|o| owners.iter().any(|w| w == o)))
            .collect();
        self.fan_out(payload, targets).await
    }

    /// Fan a payload out to the given subscriptions with bounded
    /// concurrency. One slow or failing transport call never delays or
    /// aborts the others.
    async fn fan_out(
        &self,
        payload: &NotificationPayload,
        subscriptions: Vec<Subscription>,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();

        if subscriptions.is_empty() {
            return report;
        }

        // Serialize once and share across all deliveries.
        let bytes = match payload.to_bytes() {
            Ok(bytes) => Arc::new(bytes),
            Err(e) => {
                tracing::error!(error = %e, tag = %payload.tag, "Failed to serialize payload");
                for subscription in &subscriptions {
                    report.record(
                        &subscription.endpoint,
                        Err(PushError::Payload(e.to_string())),
                    );
                }
                return report;
            }
        };

        let mut futures = FuturesUnordered::new();
        let mut pending = 0usize;

        for subscription in subscriptions {
            let bytes = bytes.clone();
            futures.push(async move {
                let result = self.send_to(&bytes, &subscription).await;
                (subscription, result)
            });
            pending += 1;

            // Drain completed futures when we hit the concurrency limit
            while pending >= self.config.max_concurrent {
                match futures.next().await {
                    Some((subscription, result)) => {
                        pending -= 1;
                        self.observe(&mut report, &subscription, result);
                    }
                    None => break,
                }
            }
        }

        while let Some((subscription, result)) = futures.next().await {
            self.observe(&mut report, &subscription, result);
        }

        if !report.pruned.is_empty() {
            self.prune(&report.pruned).await;
        }

        self.stats.broadcasts.fetch_add(1, Ordering::Relaxed);
        self.stats
            .attempted
            .fetch_add(report.attempted as u64, Ordering::Relaxed);
        self.stats
            .succeeded
            .fetch_add(report.succeeded as u64, Ordering::Relaxed);
        self.stats
            .failed
            .fetch_add(report.failed as u64, Ordering::Relaxed);

        tracing::debug!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            pruned = report.pruned.len(),
            "Fan-out completed"
        );

        report
    }

    fn observe(
        &self,
        report: &mut DispatchReport,
        subscription: &Subscription,
        result: Result<(), PushError>,
    ) {
        if let Err(error) = &result {
            tracing::warn!(
                endpoint = %subscription.endpoint,
                error = %error,
                "Push delivery failed"
            );
            if error.is_permanent() && self.config.prune_invalid {
                report.pruned.push(subscription.endpoint.clone());
            }
        }
        report.record(&subscription.endpoint, result);
    }

    /// Remove permanently-invalid endpoints, loudly.
    async fn prune(&self, endpoints: &[String]) {
        for endpoint in endpoints {
            if self.registry.remove(endpoint).await {
                self.stats.pruned.fetch_add(1, Ordering::Relaxed);
                tracing::info!(endpoint = %endpoint, "Pruned permanently-invalid subscription");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SubscriptionKeys;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Records every delivery; fails endpoints listed in `failures`.
    struct RecordingTransport {
        delivered: Mutex<Vec<(String, Vec<u8>)>>,
        failures: HashMap<String, PushError>,
    }

    impl RecordingTransport {
        fn new() -> Self {
            Self {
                delivered: Mutex::new(Vec::new()),
                failures: HashMap::new(),
            }
        }

        fn failing(failures: impl IntoIterator<Item = (&'static str, PushError)>) -> Self {
            Self {
                delivered: Mutex::new(Vec::new()),
                failures: failures
                    .into_iter()
                    .map(|(e, err)| (e.to_string(), err))
                    .collect(),
            }
        }

        fn deliveries(&self) -> Vec<(String, Vec<u8>)> {
            self.delivered.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PushTransport for RecordingTransport {
        async fn deliver(
            &self,
            subscription: &Subscription,
            payload: &[u8],
        ) -> Result<(), PushError> {
            self.delivered
                .lock()
                .unwrap()
                .push((subscription.endpoint.clone(), payload.to_vec()));
            match self.failures.get(&subscription.endpoint) {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            }
        }
    }

    fn sub(endpoint: &str) -> Subscription {
        Subscription::new(
            endpoint,
            SubscriptionKeys {
                p256dh: "p256".to_string(),
                auth: "auth".to_string(),
            },
        )
    }

    fn payload() -> NotificationPayload {
        use crate::config::NotificationConfig;
        use crate::notification::NotificationComposer;
        NotificationComposer::new(&NotificationConfig::default()).from_fallback_tick()
    }

    fn engine(
        registry: Arc<SubscriptionRegistry>,
        transport: Arc<RecordingTransport>,
        prune_invalid: bool,
    ) -> DispatchEngine {
        DispatchEngine::new(
            registry,
            transport,
            DispatchConfig {
                max_concurrent: 4,
                prune_invalid,
            },
        )
    }

    #[tokio::test]
    async fn test_send_to_delivers_to_single_target() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let transport = Arc::new(RecordingTransport::new());
        let engine = engine(registry, transport.clone(), false);

        let bytes = payload().to_bytes().unwrap();
        engine.send_to(&bytes, &sub("solo")).await.unwrap();

        let deliveries = transport.deliveries();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].0, "solo");
        assert_eq!(deliveries[0].1, bytes);
    }

    #[tokio::test]
    async fn test_send_to_surfaces_transport_error() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let transport = Arc::new(RecordingTransport::failing([(
            "gone",
            PushError::EndpointGone,
        )]));
        let engine = engine(registry, transport, false);

        let bytes = payload().to_bytes().unwrap();
        let result = engine.send_to(&bytes, &sub("gone")).await;
        assert_eq!(result, Err(PushError::EndpointGone));
    }

    #[tokio::test]
    async fn test_broadcast_report_counts_with_partial_failure() {
        let registry = Arc::new(SubscriptionRegistry::new());
        for endpoint in ["a", "b", "c", "d", "e"] {
            registry.add(sub(endpoint)).await;
        }
        let transport = Arc::new(RecordingTransport::failing([
            ("b", PushError::Transient("connection reset".to_string())),
            ("d", PushError::Transient("timeout".to_string())),
        ]));
        let engine = engine(registry, transport.clone(), false);

        let report = engine.broadcast(&payload()).await;

        assert_eq!(report.attempted, 5);
        assert_eq!(report.succeeded, 3);
        assert_eq!(report.failed, 2);
        // No short-circuit: all five attempts were made
        assert_eq!(transport.deliveries().len(), 5);
        let failed: Vec<_> = report.failures.iter().map(|f| f.endpoint.as_str()).collect();
        assert!(failed.contains(&"b"));
        assert!(failed.contains(&"d"));
    }

    #[tokio::test]
    async fn test_broadcast_delivers_identical_bytes_to_all() {
        let registry = Arc::new(SubscriptionRegistry::new());
        registry.add(sub("A")).await;
        registry.add(sub("B")).await;
        let transport = Arc::new(RecordingTransport::new());
        let engine = engine(registry, transport.clone(), false);

        engine.broadcast(&payload()).await;

        let deliveries = transport.deliveries();
        assert_eq!(deliveries.len(), 2);
        let endpoints: Vec<_> = deliveries.iter().map(|(e, _)| e.as_str()).collect();
        assert!(endpoints.contains(&"A"));
        assert!(endpoints.contains(&"B"));
        assert_eq!(deliveries[0].1, deliveries[1].1);
    }

    #[tokio::test]
    async fn test_broadcast_bounded_concurrency_covers_all_targets() {
        let registry = Arc::new(SubscriptionRegistry::new());
        for i in 0..20 {
            registry.add(sub(&format!("endpoint-{i}"))).await;
        }
        let transport = Arc::new(RecordingTransport::new());
        let engine = engine(registry, transport.clone(), false);

        let report = engine.broadcast(&payload()).await;

        assert_eq!(report.attempted, 20);
        assert_eq!(report.succeeded, 20);
        assert_eq!(transport.deliveries().len(), 20);
    }

    #[tokio::test]
    async fn test_gone_endpoint_pruned_when_policy_enabled() {
        let registry = Arc::new(SubscriptionRegistry::new());
        registry.add(sub("alive")).await;
        registry.add(sub("gone")).await;
        let transport = Arc::new(RecordingTransport::failing([(
            "gone",
            PushError::EndpointGone,
        )]));
        let engine = engine(registry.clone(), transport, true);

        let report = engine.broadcast(&payload()).await;

        assert_eq!(report.pruned, vec!["gone".to_string()]);
        assert_eq!(registry.count().await, 1);
        assert!(!registry.snapshot().await.iter().any(|s| s.endpoint == "gone"));
    }

    #[tokio::test]
    async fn test_gone_endpoint_kept_when_policy_disabled() {
        let registry = Arc::new(SubscriptionRegistry::new());
        registry.add(sub("gone")).await;
        let transport = Arc::new(RecordingTransport::failing([(
            "gone",
            PushError::EndpointGone,
        )]));
        let engine = engine(registry.clone(), transport, false);

        let report = engine.broadcast(&payload()).await;

        assert!(report.pruned.is_empty());
        assert_eq!(report.failed, 1);
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn test_transient_failure_never_pruned() {
        let registry = Arc::new(SubscriptionRegistry::new());
        registry.add(sub("flaky")).await;
        let transport = Arc::new(RecordingTransport::failing([(
            "flaky",
            PushError::Transient("503".to_string()),
        )]));
        let engine = engine(registry.clone(), transport, true);

        let report = engine.broadcast(&payload()).await;

        assert!(report.pruned.is_empty());
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn test_send_to_owners_is_strictly_targeted() {
        let registry = Arc::new(SubscriptionRegistry::new());
        registry.add(sub("anon")).await;
        registry.add(sub("for-ada").with_owner("ada")).await;
        registry.add(sub("for-brin").with_owner("brin")).await;
        let transport = Arc::new(RecordingTransport::new());
        let engine = engine(registry, transport.clone(), false);

        let report = engine
            .send_to_owners(&payload(), &["ada".to_string()])
            .await;

        assert_eq!(report.attempted, 1);
        let deliveries = transport.deliveries();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].0, "for-ada");
    }

    #[tokio::test]
    async fn test_send_to_owners_unknown_owner_reaches_nobody() {
        let registry = Arc::new(SubscriptionRegistry::new());
        registry.add(sub("for-ada").with_owner("ada")).await;
        let transport = Arc::new(RecordingTransport::new());
        let engine = engine(registry, transport.clone(), false);

        let report = engine
            .send_to_owners(&payload(), &["nobody".to_string()])
            .await;

        assert_eq!(report.attempted, 0);
        assert!(transport.deliveries().is_empty());
    }

    #[tokio::test]
    async fn test_stats_accumulate_across_broadcasts() {
        let registry = Arc::new(SubscriptionRegistry::new());
        registry.add(sub("a")).await;
        registry.add(sub("b")).await;
        let transport = Arc::new(RecordingTransport::failing([(
            "b",
            PushError::Transient("reset".to_string()),
        )]));
        let engine = engine(registry, transport, false);

        engine.broadcast(&payload()).await;
        engine.broadcast(&payload()).await;

        let stats = engine.stats();
        assert_eq!(stats.broadcasts, 2);
        assert_eq!(stats.attempted, 4);
        assert_eq!(stats.succeeded, 2);
        assert_eq!(stats.failed, 2);
    }
}
