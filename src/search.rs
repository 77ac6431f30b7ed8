//! Debounced, cancel-on-supersede beneficiary search.
//!
//! Search-as-you-type must not fire a backend call per keystroke, and a
//! slow response for an old query must never overwrite the results of a
//! newer one. Each keystroke takes a generation token; the request only
//! runs if its token is still current after the debounce window, and its
//! result only applies if the token is still current when it lands
//! (last-request-wins). Generations are scoped per search box through
//! [`SearchRegistry`]: two operators typing at once never cancel each
//! other.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::debug;

use crate::backend::{BeneficiarySummary, UpasApi};

/// Pause after the last keystroke before a request is sent.
pub const DEBOUNCE_INTERVAL: Duration = Duration::from_millis(300);

/// Shared debounce state for one search box.
#[derive(Clone, Default)]
pub struct SearchDebouncer {
    generation: Arc<AtomicU64>,
}

impl SearchDebouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a keystroke, invalidating any in-flight request.
    pub fn supersede(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_current(&self, token: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == token
    }

    /// Debounce, then run the search if this keystroke is still the latest.
    ///
    /// Returns `None` when superseded, either during the debounce window or
    /// while the request was in flight; stale results are discarded rather
    /// than surfaced.
    pub async fn search(
        &self,
        api: &dyn UpasApi,
        query: String,
    ) -> Option<Result<Vec<BeneficiarySummary>, crate::backend::BackendError>> {
        let token = self.supersede();

        tokio::time::sleep(DEBOUNCE_INTERVAL).await;
        if !self.is_current(token) {
            debug!("Search '{}' superseded during debounce", query);
            return None;
        }

        let result = api.search_beneficiaires(query.clone()).await;
        if !self.is_current(token) {
            debug!("Search '{}' superseded in flight, result dropped", query);
            return None;
        }

        Some(result)
    }
}

/// One [`SearchDebouncer`] per client key. Keys follow the import
/// sessions: the client sends its session id, falling back to a shared
/// default for callers that do not identify themselves.
#[derive(Clone, Default)]
pub struct SearchRegistry {
    inner: Arc<RwLock<HashMap<String, SearchDebouncer>>>,
}

impl SearchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The debouncer for this client, created on first use.
    pub fn for_client(&self, key: &str) -> SearchDebouncer {
        if let Some(debouncer) = self.inner.read().unwrap().get(key) {
            return debouncer.clone();
        }
        self.inner
            .write()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::mock::MockApi;

    #[tokio::test(start_paused = true)]
    async fn test_single_search_completes() {
        let api = MockApi::default();
        let debouncer = SearchDebouncer::new();
        let result = debouncer.search(&api, "alami".into()).await;
        assert!(result.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_search_is_dropped() {
        let api = Arc::new(MockApi::default());
        let debouncer = SearchDebouncer::new();

        let first = {
            let api = api.clone();
            let debouncer = debouncer.clone();
            tokio::spawn(async move { debouncer.search(api.as_ref(), "al".into()).await })
        };
        // Let the first search enter its debounce sleep before typing again.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let second = debouncer.search(&*api, "alami".into()).await;

        assert!(first.await.unwrap().is_none());
        assert!(second.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clients_debounce_independently() {
        let api = Arc::new(MockApi::default());
        let registry = SearchRegistry::new();

        let first = {
            let api = api.clone();
            let debouncer = registry.for_client("poste-1");
            tokio::spawn(async move { debouncer.search(api.as_ref(), "alami".into()).await })
        };
        // A second operator typing concurrently must not cancel the first.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let second = registry.for_client("poste-2").search(&*api, "ben".into()).await;

        assert!(first.await.unwrap().is_some());
        assert!(second.is_some());
    }

    #[test]
    fn test_registry_returns_the_same_debouncer_per_key() {
        let registry = SearchRegistry::new();
        let token = registry.for_client("poste-1").supersede();
        assert!(registry.for_client("poste-1").is_current(token));

        registry.for_client("poste-2").supersede();
        // A keystroke on another key leaves this one current.
        assert!(registry.for_client("poste-1").is_current(token));
    }

    #[test]
    fn test_tokens_are_monotonic() {
        let debouncer = SearchDebouncer::new();
        let a = debouncer.supersede();
        let b = debouncer.supersede();
        assert!(b > a);
        assert!(debouncer.is_current(b));
        assert!(!debouncer.is_current(a));
    }
}
