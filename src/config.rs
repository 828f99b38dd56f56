use serde::Deserialize;
use std::time::Duration;

/// Engine configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    /// Base URL of the catalog backend (search, recommend, like, rate)
    #[serde(default = "default_catalog_api_url")]
    pub catalog_api_url: String,

    /// TMDB API key
    pub tmdb_api_key: String,

    /// TMDB API base URL
    #[serde(default = "default_tmdb_api_url")]
    pub tmdb_api_url: String,

    /// Prefix joined with TMDB poster paths
    #[serde(default = "default_tmdb_image_base")]
    pub tmdb_image_base: String,

    /// Image shown when enrichment is unavailable
    #[serde(default = "default_placeholder_poster_url")]
    pub placeholder_poster_url: String,

    /// Locale a new session starts in
    #[serde(default = "default_locale")]
    pub default_locale: String,

    /// Items revealed initially and per "load more"
    #[serde(default = "default_page_increment")]
    pub page_increment: usize,

    /// Candidates requested from the ranking service per fetch
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Maximum memoized detail lookups
    #[serde(default = "default_detail_cache_capacity")]
    pub detail_cache_capacity: usize,

    /// Age after which a memoized detail lookup is refetched
    #[serde(default = "default_detail_cache_ttl_secs")]
    pub detail_cache_ttl_secs: u64,

    /// Per-request timeout of the HTTP collaborators
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_catalog_api_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_tmdb_api_url() -> String {
    "https://api.themoviedb.org/3".to_string()
}

fn default_tmdb_image_base() -> String {
    "https://image.tmdb.org/t/p/w500".to_string()
}

fn default_placeholder_poster_url() -> String {
    "https://via.placeholder.com/500x750?text=No+Image".to_string()
}

fn default_locale() -> String {
    "uk-UA".to_string()
}

fn default_page_increment() -> usize {
    8
}

fn default_buffer_size() -> usize {
    100
}

fn default_detail_cache_capacity() -> usize {
    512
}

fn default_detail_cache_ttl_secs() -> u64 {
    3600
}

fn default_http_timeout_secs() -> u64 {
    10
}

impl EngineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<EngineConfig>()
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    /// Configuration with every default and the given TMDB key
    pub fn with_api_key(tmdb_api_key: impl Into<String>) -> Self {
        Self {
            catalog_api_url: default_catalog_api_url(),
            tmdb_api_key: tmdb_api_key.into(),
            tmdb_api_url: default_tmdb_api_url(),
            tmdb_image_base: default_tmdb_image_base(),
            placeholder_poster_url: default_placeholder_poster_url(),
            default_locale: default_locale(),
            page_increment: default_page_increment(),
            buffer_size: default_buffer_size(),
            detail_cache_capacity: default_detail_cache_capacity(),
            detail_cache_ttl_secs: default_detail_cache_ttl_secs(),
            http_timeout_secs: default_http_timeout_secs(),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
