use crate::{
    error::{EngineError, EngineResult},
    models::{CatalogItem, Settled},
    services::providers::SearchProvider,
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, PoisonError, RwLock,
};

/// Results of the latest applied search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResults {
    pub query: String,
    pub items: Vec<CatalogItem>,
}

/// Resolves free-text queries to catalog items
///
/// Within one resolver the last issued query wins: a response that arrives after a newer
/// query was issued is dropped instead of replacing the visible results.
pub struct SearchResolver {
    provider: Arc<dyn SearchProvider>,
    generation: AtomicU64,
    visible: RwLock<Option<SearchResults>>,
}

impl SearchResolver {
    pub fn new(provider: Arc<dyn SearchProvider>) -> Self {
        Self {
            provider,
            generation: AtomicU64::new(0),
            visible: RwLock::new(None),
        }
    }

    /// Searches the catalog, returning [`Settled::Superseded`] if a newer query overtook this one
    pub async fn search(&self, query: &str) -> EngineResult<Settled<Vec<CatalogItem>>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(EngineError::InvalidQuery);
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let result = self.provider.search(query).await;

        let mut visible = self.visible.write().unwrap_or_else(PoisonError::into_inner);
        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!(query = %query, generation, "Discarding superseded search response");
            return Ok(Settled::Superseded);
        }

        match result {
            Ok(items) => {
                tracing::info!(query = %query, results = items.len(), "Title search completed");
                *visible = Some(SearchResults {
                    query: query.to_string(),
                    items: items.clone(),
                });
                Ok(Settled::Current(items))
            }
            Err(e) => {
                tracing::warn!(query = %query, error = %e, "Title search failed");
                Err(EngineError::SearchUnavailable(e.to_string()))
            }
        }
    }

    /// Results of the latest applied query, if any
    pub fn visible_results(&self) -> Option<SearchResults> {
        self.visible
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Hides the visible results and drops any response still in flight
    pub fn clear(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        *self.visible.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ProviderError, services::providers::MockSearchProvider};

    fn matrix_items() -> Vec<CatalogItem> {
        vec![
            CatalogItem::new(2571, "Matrix, The (1999)"),
            CatalogItem::new(6365, "Matrix Reloaded, The (2003)"),
        ]
    }

    #[tokio::test]
    async fn test_search_returns_and_exposes_results() {
        let mut provider = MockSearchProvider::new();
        provider
            .expect_search()
            .withf(|q| q == "matrix")
            .times(1)
            .returning(|_| Ok(matrix_items()));

        let resolver = SearchResolver::new(Arc::new(provider));
        let found = resolver.search("  matrix ").await.unwrap();

        assert_eq!(found, Settled::Current(matrix_items()));
        let visible = resolver.visible_results().unwrap();
        assert_eq!(visible.query, "matrix");
        assert_eq!(visible.items.len(), 2);
    }

    #[tokio::test]
    async fn test_blank_query_is_rejected_without_network_call() {
        let mut provider = MockSearchProvider::new();
        provider.expect_search().times(0);

        let resolver = SearchResolver::new(Arc::new(provider));

        assert_eq!(resolver.search("").await, Err(EngineError::InvalidQuery));
        assert_eq!(resolver.search("   \t").await, Err(EngineError::InvalidQuery));
        assert_eq!(resolver.visible_results(), None);
    }

    #[tokio::test]
    async fn test_service_failure_maps_to_search_unavailable() {
        let mut provider = MockSearchProvider::new();
        provider.expect_search().times(1).returning(|_| {
            Err(ProviderError::Status {
                status: 504,
                body: "gateway timeout".to_string(),
            })
        });

        let resolver = SearchResolver::new(Arc::new(provider));
        let err = resolver.search("matrix").await.unwrap_err();

        assert!(matches!(err, EngineError::SearchUnavailable(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_resolver_usable_after_failure() {
        let mut provider = MockSearchProvider::new();
        let mut seq = mockall::Sequence::new();
        provider
            .expect_search()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(ProviderError::NotFound));
        provider
            .expect_search()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(matrix_items()));

        let resolver = SearchResolver::new(Arc::new(provider));
        assert!(resolver.search("matrix").await.is_err());
        assert_eq!(
            resolver.search("matrix").await.unwrap(),
            Settled::Current(matrix_items())
        );
    }

    #[tokio::test]
    async fn test_clear_hides_results() {
        let mut provider = MockSearchProvider::new();
        provider
            .expect_search()
            .returning(|_| Ok(matrix_items()));

        let resolver = SearchResolver::new(Arc::new(provider));
        resolver.search("matrix").await.unwrap();
        resolver.clear();

        assert_eq!(resolver.visible_results(), None);
    }
}
