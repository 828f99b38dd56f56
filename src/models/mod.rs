use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt::Display, str::FromStr};

pub mod title;

pub use title::{clean_title, extract_year, genre_tokens, title_signature};

/// Internal catalog identifier of a recommendable item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u64);

impl Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ItemId {
    fn from(id: u64) -> Self {
        ItemId(id)
    }
}

/// A catalog entry as returned by the backend; read-only here
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogItem {
    #[serde(rename = "movieId")]
    pub id: ItemId,
    pub title: String,
    /// Pipe-delimited genre field, e.g. "Action|Sci-Fi"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genres: Option<String>,
}

impl CatalogItem {
    pub fn new(id: impl Into<ItemId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            genres: None,
        }
    }

    pub fn with_genres(mut self, genres: impl Into<String>) -> Self {
        self.genres = Some(genres.into());
        self
    }
}

/// A ranked candidate: catalog item plus the score attached by the ranking service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredItem {
    #[serde(flatten)]
    pub item: CatalogItem,
    #[serde(default)]
    pub score: f64,
}

/// Ranking strategy identifier passed verbatim to the ranking service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    #[serde(rename = "knn")]
    NearestNeighbor,
    #[serde(rename = "content")]
    ContentBased,
    #[serde(rename = "svd")]
    Factorized,
    #[serde(rename = "hybrid")]
    Hybrid,
}

impl Algorithm {
    pub const ALL: [Algorithm; 4] = [
        Algorithm::NearestNeighbor,
        Algorithm::ContentBased,
        Algorithm::Factorized,
        Algorithm::Hybrid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::NearestNeighbor => "knn",
            Algorithm::ContentBased => "content",
            Algorithm::Factorized => "svd",
            Algorithm::Hybrid => "hybrid",
        }
    }
}

impl Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "knn" | "nearest-neighbor" => Ok(Algorithm::NearestNeighbor),
            "content" | "content-based" => Ok(Algorithm::ContentBased),
            "svd" | "factorized" => Ok(Algorithm::Factorized),
            "hybrid" => Ok(Algorithm::Hybrid),
            other => Err(format!("Unknown algorithm: {}", other)),
        }
    }
}

/// Where the display data of an [`EnrichedItem`] came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentSource {
    Metadata,
    Placeholder,
}

/// Catalog item plus locale-specific display metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnrichedItem {
    pub item: CatalogItem,
    pub poster_url: String,
    pub year: Option<i32>,
    pub genre_names: Vec<String>,
    pub overview: Option<String>,
    pub locale: String,
    pub source: EnrichmentSource,
    pub enriched_at: DateTime<Utc>,
}

impl EnrichedItem {
    /// Fallback carrying only the original title and a placeholder image
    pub fn degraded(item: CatalogItem, locale: &str, placeholder_url: &str) -> Self {
        Self {
            item,
            poster_url: placeholder_url.to_string(),
            year: None,
            genre_names: Vec::new(),
            overview: None,
            locale: locale.to_string(),
            source: EnrichmentSource::Placeholder,
            enriched_at: Utc::now(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.source == EnrichmentSource::Placeholder
    }
}

/// Best match returned by the external metadata service for a title query
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetadataMatch {
    pub poster_path: Option<String>,
    #[serde(default)]
    pub genre_ids: Vec<u32>,
    #[serde(default)]
    pub genre_names: Vec<String>,
    pub overview: Option<String>,
    pub release_date: Option<String>,
}

/// External genre id to localized name
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GenreTable(pub HashMap<u32, String>);

impl GenreTable {
    pub fn name(&self, id: u32) -> Option<&str> {
        self.0.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Names for the given ids in order; unknown ids are skipped
    pub fn resolve(&self, ids: &[u32]) -> Vec<String> {
        ids.iter()
            .filter_map(|id| self.name(*id))
            .map(str::to_string)
            .collect()
    }
}

impl FromIterator<(u32, String)> for GenreTable {
    fn from_iter<I: IntoIterator<Item = (u32, String)>>(iter: I) -> Self {
        GenreTable(iter.into_iter().collect())
    }
}

/// Per-item like and rating state
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InteractionState {
    pub liked: bool,
    pub rating: u8,
}

/// Authenticated user as supplied by the identity collaborator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub token: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            token: token.into(),
            permissions: Vec::new(),
        }
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

/// Outcome of an operation whose result may be overtaken by a newer request
#[derive(Debug, Clone, PartialEq)]
pub enum Settled<T> {
    /// The result belongs to the latest request and has been applied
    Current(T),
    /// A newer request was issued before this one resolved; the result was dropped
    Superseded,
}

impl<T> Settled<T> {
    pub fn into_current(self) -> Option<T> {
        match self {
            Settled::Current(value) => Some(value),
            Settled::Superseded => None,
        }
    }

    pub fn is_superseded(&self) -> bool {
        matches!(self, Settled::Superseded)
    }
}
