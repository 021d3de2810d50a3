use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Encryption keys supplied by the browser alongside the push endpoint.
///
/// Stored verbatim and handed to the push transport; never interpreted
/// by the registry itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

/// A registered client's push-delivery descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Opaque push-service URL, unique per client subscription.
    pub endpoint: String,
    pub keys: SubscriptionKeys,
    /// Optional display identity, used by targeted sends.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

impl Subscription {
    pub fn new(endpoint: impl Into<String>, keys: SubscriptionKeys) -> Self {
        Self {
            endpoint: endpoint.into(),
            keys,
            owner: None,
        }
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }
}

/// Outcome of a registration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AddOutcome {
    /// Position of the subscription in the registry.
    pub index: usize,
    /// True if an entry with the same endpoint was already present
    /// (no duplicate was inserted).
    pub already_existed: bool,
}

/// Owns the set of active subscriptions.
///
/// Invariant: at most one entry per distinct endpoint. Mutation goes
/// through `add`/`remove` exclusively; fan-out code only ever sees
/// owned copies from `snapshot`, so registry changes during an
/// in-flight broadcast cannot affect it.
pub struct SubscriptionRegistry {
    entries: RwLock<Vec<Subscription>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Register a subscription, deduplicating by endpoint.
    pub async fn add(&self, subscription: Subscription) -> AddOutcome {
        let mut entries = self.entries.write().await;

        if let Some(index) = entries
            .iter()
            .position(|s| s.endpoint == subscription.endpoint)
        {
            tracing::debug!(endpoint = %subscription.endpoint, index, "Subscription already registered");
            return AddOutcome {
                index,
                already_existed: true,
            };
        }

        entries.push(subscription);
        let index = entries.len() - 1;
        tracing::info!(
            endpoint = %entries[index].endpoint,
            owner = ?entries[index].owner,
            total = entries.len(),
            "Subscription registered"
        );
        AddOutcome {
            index,
            already_existed: false,
        }
    }

    /// Remove the subscription with the given endpoint, compacting
    /// storage so indices stay dense. Returns whether one was found.
    pub async fn remove(&self, endpoint: &str) -> bool {
        let mut entries = self.entries.write().await;

        match entries.iter().position(|s| s.endpoint == endpoint) {
            Some(index) => {
                entries.remove(index);
                tracing::info!(endpoint = %endpoint, total = entries.len(), "Subscription removed");
                true
            }
            None => false,
        }
    }

    /// Point-in-time copy of all current subscriptions, safe to iterate
    /// during fan-out without holding any registry lock.
    pub async fn snapshot(&self) -> Vec<Subscription> {
        self.entries.read().await.clone()
    }

    pub async fn count(&self) -> usize {
        self.entries.read().await.len()
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(endpoint: &str) -> Subscription {
        Subscription::new(
            endpoint,
            SubscriptionKeys {
                p256dh: "p256".to_string(),
                auth: "auth".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn test_add_deduplicates_by_endpoint() {
        let registry = SubscriptionRegistry::new();

        let first = registry.add(sub("https://push.example/a")).await;
        assert_eq!(first.index, 0);
        assert!(!first.already_existed);

        let second = registry.add(sub("https://push.example/b")).await;
        assert_eq!(second.index, 1);
        assert!(!second.already_existed);

        let repeat = registry.add(sub("https://push.example/a")).await;
        assert_eq!(repeat.index, 0);
        assert!(repeat.already_existed);

        assert_eq!(registry.count().await, 2);
    }

    #[tokio::test]
    async fn test_distinct_endpoints_collapse() {
        let registry = SubscriptionRegistry::new();
        for endpoint in ["e1", "e2", "e1", "e3", "e2", "e1"] {
            registry.add(sub(endpoint)).await;
        }
        assert_eq!(registry.count().await, 3);
    }

    #[tokio::test]
    async fn test_add_remove_round_trip() {
        let registry = SubscriptionRegistry::new();
        registry.add(sub("keep")).await;

        let before = registry.snapshot().await;
        registry.add(sub("transient")).await;
        assert!(registry.remove("transient").await);

        assert_eq!(registry.snapshot().await, before);
    }

    #[tokio::test]
    async fn test_remove_unknown_endpoint() {
        let registry = SubscriptionRegistry::new();
        registry.add(sub("known")).await;

        assert!(!registry.remove("never-added").await);
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn test_removal_keeps_indices_dense() {
        let registry = SubscriptionRegistry::new();
        registry.add(sub("a")).await;
        registry.add(sub("b")).await;
        registry.add(sub("c")).await;

        registry.remove("b").await;

        let outcome = registry.add(sub("c")).await;
        assert!(outcome.already_existed);
        assert_eq!(outcome.index, 1);
    }

    #[tokio::test]
    async fn test_snapshot_isolated_from_later_mutation() {
        let registry = SubscriptionRegistry::new();
        registry.add(sub("a")).await;

        let snapshot = registry.snapshot().await;
        registry.add(sub("b")).await;
        registry.remove("a").await;

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].endpoint, "a");
    }
}
