use crate::{
    config::EngineConfig,
    error::{EngineError, EngineResult},
    models::{
        clean_title, extract_year, title_signature, CatalogItem, EnrichedItem, EnrichmentSource,
        GenreTable, MetadataMatch,
    },
    services::{coalesce::Coalescer, providers::MetadataProvider},
};
use chrono::Utc;
use moka::future::Cache;
use std::{
    collections::HashMap,
    fmt::Display,
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

/// Keys of the locale-scoped metadata caches
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    GenreTable(String),
    Detail {
        signature: String,
        year: Option<i32>,
        locale: String,
    },
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::GenreTable(locale) => write!(f, "genres:{}", locale.to_lowercase()),
            CacheKey::Detail {
                signature,
                year: Some(year),
                locale,
            } => write!(f, "detail:{}:{}:{}", locale.to_lowercase(), signature, year),
            CacheKey::Detail {
                signature,
                year: None,
                locale,
            } => write!(f, "detail:{}:{}", locale.to_lowercase(), signature),
        }
    }
}

/// Settings of [`MetadataEnrichmentCache`]
#[derive(Debug, Clone)]
pub struct EnrichmentSettings {
    pub image_base: String,
    pub placeholder_url: String,
    pub detail_capacity: u64,
    pub detail_ttl: Duration,
}

impl From<&EngineConfig> for EnrichmentSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            image_base: config.tmdb_image_base.trim_end_matches('/').to_string(),
            placeholder_url: config.placeholder_poster_url.clone(),
            detail_capacity: config.detail_cache_capacity as u64,
            detail_ttl: Duration::from_secs(config.detail_cache_ttl_secs),
        }
    }
}

/// Locale-scoped memoized lookup of display metadata
///
/// Genre tables are fetched once per locale and kept for the session. Detail lookups are
/// memoized per `(title signature, year, locale)` in a size-bounded cache whose entries
/// expire after a fixed age. Both coalesce
/// concurrent identical requests into one call to the metadata service, and entries for
/// one locale survive a switch to another.
pub struct MetadataEnrichmentCache {
    provider: Arc<dyn MetadataProvider>,
    settings: EnrichmentSettings,
    genres: Arc<RwLock<HashMap<String, Arc<GenreTable>>>>,
    genre_calls: Coalescer<CacheKey, Arc<GenreTable>>,
    details: Cache<CacheKey, Option<MetadataMatch>>,
}

impl MetadataEnrichmentCache {
    pub fn new(provider: Arc<dyn MetadataProvider>, settings: EnrichmentSettings) -> Self {
        let details = Cache::builder()
            .max_capacity(settings.detail_capacity)
            .time_to_live(settings.detail_ttl)
            .build();
        Self {
            provider,
            settings,
            genres: Arc::new(RwLock::new(HashMap::new())),
            genre_calls: Coalescer::new("genres"),
            details,
        }
    }

    /// Enriches `item`, falling back to a placeholder when metadata is unavailable
    pub async fn enrich(&self, item: &CatalogItem, locale: &str) -> EnrichedItem {
        match self.try_enrich(item, locale).await {
            Ok(enriched) => enriched,
            Err(e) => {
                tracing::warn!(item = %item.id, locale = %locale, error = %e, "Enrichment degraded to placeholder");
                EnrichedItem::degraded(item.clone(), locale, &self.settings.placeholder_url)
            }
        }
    }

    pub async fn try_enrich(&self, item: &CatalogItem, locale: &str) -> EngineResult<EnrichedItem> {
        let year = extract_year(&item.title);
        let key = CacheKey::Detail {
            signature: title_signature(&item.title),
            year,
            locale: locale.to_string(),
        };

        let found = match self.details.get(&key).await {
            Some(hit) => {
                tracing::debug!(key = %key, "Detail cache hit");
                hit
            }
            None => self.lookup_detail(key, clean_title(&item.title), year, locale).await?,
        };

        let Some(found) = found else {
            return Err(EngineError::EnrichmentUnavailable(format!(
                "No metadata match for '{}'",
                item.title
            )));
        };

        let genre_names = self.genre_names(&found, locale).await;

        let release_year = found
            .release_date
            .as_deref()
            .and_then(|date| date.get(..4))
            .and_then(|y| y.parse().ok());

        let poster_url = match found.poster_path.as_deref() {
            Some(path) => format!("{}/{}", self.settings.image_base, path.trim_start_matches('/')),
            None => self.settings.placeholder_url.clone(),
        };

        Ok(EnrichedItem {
            item: item.clone(),
            poster_url,
            year: release_year.or(year),
            genre_names,
            overview: found.overview,
            locale: locale.to_string(),
            source: EnrichmentSource::Metadata,
            enriched_at: Utc::now(),
        })
    }

    /// Genre table for `locale`, fetched on first need
    pub async fn genre_table(&self, locale: &str) -> EngineResult<Arc<GenreTable>> {
        if let Some(table) = self
            .genres
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(locale)
        {
            return Ok(Arc::clone(table));
        }

        let provider = Arc::clone(&self.provider);
        let genres = Arc::clone(&self.genres);
        let locale_owned = locale.to_string();

        self.genre_calls
            .run(CacheKey::GenreTable(locale.to_string()), move || async move {
                let table = Arc::new(provider.genre_table(&locale_owned).await?);
                genres
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(locale_owned, Arc::clone(&table));
                Ok(table)
            })
            .await
            .map_err(|e| EngineError::EnrichmentUnavailable(e.to_string()))
    }

    /// Warms the genre table for `locale`; failures are logged and absorbed
    pub async fn prefetch_genres(&self, locale: &str) {
        if let Err(e) = self.genre_table(locale).await {
            tracing::warn!(locale = %locale, error = %e, "Genre table prefetch failed");
        }
    }

    /// Locales whose genre table is cached
    pub fn cached_locales(&self) -> Vec<String> {
        let mut locales: Vec<String> = self
            .genres
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        locales.sort();
        locales
    }

    /// Approximate number of memoized detail lookups
    pub fn cached_details(&self) -> u64 {
        self.details.entry_count()
    }

    async fn lookup_detail(
        &self,
        key: CacheKey,
        query: String,
        year: Option<i32>,
        locale: &str,
    ) -> EngineResult<Option<MetadataMatch>> {
        // Concurrent misses for one key share a single lookup; errors are not stored
        self.details
            .try_get_with(key, self.provider.find_title(&query, year, locale))
            .await
            .map_err(|e| EngineError::EnrichmentUnavailable(e.to_string()))
    }

    async fn genre_names(&self, found: &MetadataMatch, locale: &str) -> Vec<String> {
        if !found.genre_names.is_empty() || found.genre_ids.is_empty() {
            return found.genre_names.clone();
        }

        match self.genre_table(locale).await {
            Ok(table) => table.resolve(&found.genre_ids),
            Err(e) => {
                tracing::warn!(locale = %locale, error = %e, "Genre names unavailable");
                Vec::new()
            }
        }
    }
}
