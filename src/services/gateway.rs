use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::warn;

use crate::cache::ResultCache;
use crate::retry::{Outcome, RetryPolicy, ServiceFault};
use crate::TARGET_CACHE;

/// Cache lookup, retry and cache write-back shared by every adapter.
#[derive(Clone)]
pub struct ServiceGateway {
    cache: Arc<ResultCache>,
    policy: RetryPolicy,
}

impl ServiceGateway {
    pub fn new(cache: Arc<ResultCache>, policy: RetryPolicy) -> Self {
        ServiceGateway { cache, policy }
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Answers from the cache when possible; otherwise runs `call` under the
    /// retry policy and caches a `Found` answer. Absent and failed answers are
    /// never cached. A cached value that no longer decodes as `T` is dropped
    /// so the fresh answer can take its place.
    pub async fn call<T, F, Fut>(&self, operation: &str, args: &[&str], call: F) -> Outcome<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, ServiceFault>>,
    {
        if let Some(cached) = self.cache.get(operation, args) {
            match serde_json::from_value(cached) {
                Ok(value) => return Outcome::Found(value),
                Err(err) => {
                    warn!(target: TARGET_CACHE, "Discarding cached {} value with an unexpected shape: {}", operation, err);
                    self.cache.remove(operation, args);
                }
            }
        }

        let outcome = self.policy.run(operation, call).await;

        if let Outcome::Found(value) = &outcome {
            match serde_json::to_value(value) {
                Ok(json) => self.cache.set(operation, args, json),
                Err(err) => {
                    warn!(target: TARGET_CACHE, "Could not serialize {} result for caching: {}", operation, err);
                }
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn gateway() -> ServiceGateway {
        ServiceGateway::new(
            Arc::new(ResultCache::in_memory()),
            RetryPolicy::scaled(Duration::from_millis(1)),
        )
    }

    #[tokio::test]
    async fn test_identical_calls_reach_the_service_once() {
        let gateway = gateway();
        let calls = Arc::new(AtomicU32::new(0));

        for _ in 0..2 {
            let counter = calls.clone();
            let outcome = gateway
                .call("sonar_owner", &["FIG", "Charleston", "SC"], || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, ServiceFault>(Some("Mike Lata".to_string()))
                    }
                })
                .await;
            assert_eq!(outcome, Outcome::Found("Mike Lata".to_string()));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_absent_and_failed_answers_are_not_cached() {
        let gateway = gateway();

        let absent: Outcome<String> = gateway
            .call("op", &["a"], || async { Ok::<_, ServiceFault>(None) })
            .await;
        assert_eq!(absent, Outcome::Absent);

        let failed: Outcome<String> = gateway
            .call("op", &["b"], || async { Err(ServiceFault::Unauthorized) })
            .await;
        assert_eq!(failed, Outcome::Failed(ServiceFault::Unauthorized));

        assert!(gateway.cache().is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_cached_value_is_replaced() {
        let gateway = gateway();
        gateway
            .cache()
            .set("sonar_owner", &["FIG", "Charleston", "SC"], serde_json::json!({"stale": 1}));
        let calls = Arc::new(AtomicU32::new(0));

        for _ in 0..2 {
            let counter = calls.clone();
            let outcome = gateway
                .call("sonar_owner", &["FIG", "Charleston", "SC"], || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, ServiceFault>(Some("Mike Lata".to_string()))
                    }
                })
                .await;
            assert_eq!(outcome, Outcome::Found("Mike Lata".to_string()));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            gateway.cache().get("sonar_owner", &["FIG", "Charleston", "SC"]),
            Some(serde_json::json!("Mike Lata"))
        );
    }

    #[tokio::test]
    async fn test_different_arguments_are_cached_separately() {
        let gateway = gateway();
        let calls = Arc::new(AtomicU32::new(0));

        for city in ["Charleston", "Columbia", "Charleston"] {
            let counter = calls.clone();
            let _: Outcome<String> = gateway
                .call("sonar_owner", &["FIG", city, "SC"], || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, ServiceFault>(Some("Owner".to_string()))
                    }
                })
                .await;
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(gateway.cache().len(), 2);
    }
}
