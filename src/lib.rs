//! Session engine for browsing movie recommendations
//!
//! Resolves searches, fetches and pages ranked recommendations, enriches items with
//! locale-specific metadata and keeps like/rating state consistent across every rendering
//! of an item. Presentation code drives a [`RecommendationSession`]; all network access
//! goes through the collaborator traits in [`services::providers`].

pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod services;
pub mod session;

pub use config::EngineConfig;
pub use error::{EngineError, EngineResult, ProviderError, ProviderResult};
pub use models::{
    Algorithm, CatalogItem, EnrichedItem, Identity, InteractionState, ItemId, ScoredItem, Settled,
};
pub use services::{
    interactions::InteractionEvent,
    recommendations::{grow_window, DisplayWindow, RecommendationBuffer},
    view::{project, FilterState, SortKey},
};
pub use session::{Collaborators, RecommendationSession, SessionId};
