use crate::{
    config::EngineConfig,
    error::EngineResult,
    models::{
        Algorithm, CatalogItem, EnrichedItem, InteractionState, ItemId, ScoredItem, Settled,
    },
    services::{
        enrichment::{EnrichmentSettings, MetadataEnrichmentCache},
        interactions::{InteractionEvent, InteractionStateStore},
        providers::{
            CatalogApiClient, FavoritesProvider, IdentityProvider, MetadataProvider,
            RankingProvider, SearchProvider, TmdbClient,
        },
        recommendations::{DisplayWindow, RecommendationBuffer, RecommendationFetcher},
        title_search::{SearchResolver, SearchResults},
        view::{project_with_details, FilterState},
    },
};
use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Identifier attached to every log span of one session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// External collaborators a session is wired to
#[derive(Clone)]
pub struct Collaborators {
    pub search: Arc<dyn SearchProvider>,
    pub ranking: Arc<dyn RankingProvider>,
    pub metadata: Arc<dyn MetadataProvider>,
    pub favorites: Arc<dyn FavoritesProvider>,
    pub identity: Arc<dyn IdentityProvider>,
}

#[derive(Debug, Clone)]
struct ViewState {
    locale: String,
    filter: FilterState,
    selected: Option<CatalogItem>,
    algorithm: Algorithm,
}

struct SessionInner {
    id: SessionId,
    buffer_size: usize,
    search: SearchResolver,
    recommendations: RecommendationFetcher,
    enrichment: MetadataEnrichmentCache,
    interactions: InteractionStateStore,
    view: RwLock<ViewState>,
    details: RwLock<HashMap<ItemId, EnrichedItem>>,
}

/// One user's browsing session
///
/// Owns every session-scoped cache, so several sessions in one process never share state.
/// Cloning is cheap and clones observe the same session.
#[derive(Clone)]
pub struct RecommendationSession {
    inner: Arc<SessionInner>,
}

impl RecommendationSession {
    pub fn new(config: &EngineConfig, collaborators: Collaborators) -> Self {
        let id = SessionId::new();
        tracing::info!(session = %id, locale = %config.default_locale, "Session started");

        Self {
            inner: Arc::new(SessionInner {
                id,
                buffer_size: config.buffer_size,
                search: SearchResolver::new(collaborators.search),
                recommendations: RecommendationFetcher::new(
                    collaborators.ranking,
                    config.page_increment,
                ),
                enrichment: MetadataEnrichmentCache::new(
                    collaborators.metadata,
                    EnrichmentSettings::from(config),
                ),
                interactions: InteractionStateStore::new(
                    collaborators.favorites,
                    collaborators.identity,
                ),
                view: RwLock::new(ViewState {
                    locale: config.default_locale.clone(),
                    filter: FilterState::default(),
                    selected: None,
                    algorithm: Algorithm::Hybrid,
                }),
                details: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Session talking HTTP to the catalog backend and TMDB
    pub fn from_config(
        config: &EngineConfig,
        identity: Arc<dyn IdentityProvider>,
    ) -> anyhow::Result<Self> {
        let catalog = Arc::new(CatalogApiClient::new(
            config.catalog_api_url.clone(),
            config.http_timeout(),
        )?);
        let tmdb = Arc::new(TmdbClient::new(
            config.tmdb_api_key.clone(),
            config.tmdb_api_url.clone(),
            config.http_timeout(),
        )?);

        Ok(Self::new(
            config,
            Collaborators {
                search: catalog.clone(),
                ranking: catalog.clone(),
                metadata: tmdb,
                favorites: catalog,
                identity,
            },
        ))
    }

    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    fn view(&self) -> std::sync::RwLockReadGuard<'_, ViewState> {
        self.inner.view.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn view_mut(&self) -> std::sync::RwLockWriteGuard<'_, ViewState> {
        self.inner.view.write().unwrap_or_else(PoisonError::into_inner)
    }

    // Search

    #[tracing::instrument(skip(self), fields(session = %self.inner.id))]
    pub async fn search(&self, query: &str) -> EngineResult<Settled<Vec<CatalogItem>>> {
        self.inner.search.search(query).await
    }

    pub fn visible_search_results(&self) -> Option<SearchResults> {
        self.inner.search.visible_results()
    }

    // Recommendations

    /// Selects the source item and fetches its recommendations with `algorithm`
    #[tracing::instrument(skip(self, item), fields(session = %self.inner.id, item = %item.id))]
    pub async fn select(
        &self,
        item: CatalogItem,
        algorithm: Algorithm,
    ) -> EngineResult<Settled<Arc<RecommendationBuffer>>> {
        let source = item.id;
        {
            let mut view = self.view_mut();
            view.selected = Some(item);
            view.algorithm = algorithm;
        }
        self.inner
            .recommendations
            .fetch(source, algorithm, self.inner.buffer_size)
            .await
    }

    /// Refetches for the selected item with another algorithm
    ///
    /// Returns `Ok(None)` when nothing is selected yet; the choice is still recorded.
    #[tracing::instrument(skip(self), fields(session = %self.inner.id))]
    pub async fn change_algorithm(
        &self,
        algorithm: Algorithm,
    ) -> EngineResult<Option<Settled<Arc<RecommendationBuffer>>>> {
        let source = {
            let mut view = self.view_mut();
            view.algorithm = algorithm;
            view.selected.as_ref().map(|item| item.id)
        };

        let Some(source) = source else {
            tracing::debug!("No item selected, algorithm recorded");
            return Ok(None);
        };

        self.inner
            .recommendations
            .fetch(source, algorithm, self.inner.buffer_size)
            .await
            .map(Some)
    }

    pub fn selected(&self) -> Option<CatalogItem> {
        self.view().selected.clone()
    }

    pub fn algorithm(&self) -> Algorithm {
        self.view().algorithm
    }

    /// Buffer currently held for the selected item and algorithm
    pub fn buffer(&self) -> Option<Arc<RecommendationBuffer>> {
        self.inner.recommendations.current()
    }

    pub fn load_more(&self) -> DisplayWindow {
        self.inner.recommendations.load_more()
    }

    pub fn window(&self) -> DisplayWindow {
        self.inner.recommendations.window()
    }

    // Filtering

    pub fn set_filter(&self, filter: FilterState) {
        tracing::debug!(session = %self.inner.id, filter = ?filter, "Filter changed");
        self.view_mut().filter = filter;
    }

    pub fn clear_filter(&self) {
        self.view_mut().filter = FilterState::default();
    }

    pub fn filter(&self) -> FilterState {
        self.view().filter.clone()
    }

    /// Revealed recommendations under the current filter
    pub fn visible_items(&self) -> Vec<ScoredItem> {
        let Some((buffer, window)) = self.inner.recommendations.snapshot() else {
            return Vec::new();
        };
        let filter = self.filter();
        let details = self
            .inner
            .details
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        project_with_details(&buffer, window, &filter, &details)
            .into_iter()
            .cloned()
            .collect()
    }

    // Enrichment

    pub fn locale(&self) -> String {
        self.view().locale.clone()
    }

    /// Display data for `item` in the active locale; never fails
    pub async fn enrich(&self, item: &CatalogItem) -> EnrichedItem {
        let locale = self.locale();
        let enriched = self.inner.enrichment.enrich(item, &locale).await;

        if !enriched.is_degraded() && self.view().locale == enriched.locale {
            self.inner
                .details
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(item.id, enriched.clone());
        }

        enriched
    }

    /// Enriches every revealed recommendation concurrently, in display order
    #[tracing::instrument(skip(self), fields(session = %self.inner.id))]
    pub async fn enrich_visible(&self) -> Vec<EnrichedItem> {
        let items = self.visible_items();
        futures::future::join_all(items.iter().map(|scored| self.enrich(&scored.item))).await
    }

    /// Switches the display locale
    ///
    /// Enrichment data of other locales stays cached, so switching back costs no lookups.
    #[tracing::instrument(skip(self), fields(session = %self.inner.id))]
    pub async fn set_locale(&self, locale: &str) {
        let changed = {
            let mut view = self.view_mut();
            let changed = view.locale != locale;
            view.locale = locale.to_string();
            changed
        };

        if changed {
            self.inner
                .details
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
            tracing::info!(locale = %locale, "Locale switched");
        }

        self.inner.enrichment.prefetch_genres(locale).await;
    }

    // Interactions

    #[tracing::instrument(skip(self), fields(session = %self.inner.id))]
    pub async fn set_liked(&self, item: ItemId, liked: bool) -> EngineResult<()> {
        self.inner.interactions.set_liked(item, liked).await
    }

    #[tracing::instrument(skip(self), fields(session = %self.inner.id))]
    pub async fn toggle_liked(&self, item: ItemId) -> EngineResult<bool> {
        self.inner.interactions.toggle_liked(item).await
    }

    #[tracing::instrument(skip(self), fields(session = %self.inner.id))]
    pub async fn set_rating(&self, item: ItemId, rating: u8) -> EngineResult<()> {
        self.inner.interactions.set_rating(item, rating).await
    }

    pub fn get_state(&self, item: ItemId) -> InteractionState {
        self.inner.interactions.get_state(item)
    }

    #[tracing::instrument(skip(self), fields(session = %self.inner.id))]
    pub async fn refresh_favorites(&self) -> EngineResult<Vec<ItemId>> {
        self.inner.interactions.refresh_favorites().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InteractionEvent> {
        self.inner.interactions.subscribe()
    }
}
