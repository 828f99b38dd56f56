use crate::models::ItemId;

/// Engine-level errors surfaced to the presentation layer
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Search query cannot be empty")]
    InvalidQuery,

    #[error("Search service unavailable: {0}")]
    SearchUnavailable(String),

    #[error("Recommendation service unavailable: {0}")]
    RecommendationUnavailable(String),

    #[error("Metadata enrichment unavailable: {0}")]
    EnrichmentUnavailable(String),

    #[error("Favorites unavailable: {0}")]
    FavoritesUnavailable(String),

    #[error("Failed to update like for item {item}: {reason}")]
    LikeUpdateFailed { item: ItemId, reason: String },

    #[error("Failed to update rating for item {item}: {reason}")]
    RatingUpdateFailed { item: ItemId, reason: String },

    #[error("Rating must be between 0 and 5, got {0}")]
    InvalidRating(u8),

    #[error("Authentication required")]
    AuthenticationRequired,
}

impl EngineError {
    /// Whether re-issuing the same operation may succeed without user action
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::SearchUnavailable(_)
                | EngineError::RecommendationUnavailable(_)
                | EngineError::EnrichmentUnavailable(_)
                | EngineError::FavoritesUnavailable(_)
                | EngineError::LikeUpdateFailed { .. }
                | EngineError::RatingUpdateFailed { .. }
        )
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised by external collaborators (search, ranking, metadata, favorites)
#[derive(thiserror::Error, Debug)]
pub enum ProviderError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Resource not found")]
    NotFound,
}

pub type ProviderResult<T> = Result<T, ProviderError>;
