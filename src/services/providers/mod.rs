/// External collaborator abstraction
///
/// Every engine component depends only on these traits. The HTTP implementations
/// (`CatalogApiClient` for the backend, `TmdbClient` for the metadata service) are one
/// choice of transport; tests substitute mocks or in-memory fakes.
use crate::{
    error::ProviderResult,
    models::{Algorithm, CatalogItem, GenreTable, Identity, ItemId, MetadataMatch, ScoredItem},
};
use std::sync::{PoisonError, RwLock};

pub mod catalog_api;
pub mod tmdb;

pub use catalog_api::CatalogApiClient;
pub use tmdb::TmdbClient;

/// Free-text search over the internal catalog
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> ProviderResult<Vec<CatalogItem>>;
}

/// Opaque ranking service returning scored candidates for a source item
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RankingProvider: Send + Sync {
    async fn recommend(
        &self,
        source: ItemId,
        algorithm: Algorithm,
        size: usize,
    ) -> ProviderResult<Vec<ScoredItem>>;
}

/// External descriptive-metadata service
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Best match for a title query in the given locale, `None` when nothing matches
    async fn find_title(
        &self,
        title: &str,
        year: Option<i32>,
        locale: &str,
    ) -> ProviderResult<Option<MetadataMatch>>;

    /// Full genre id to name table for the locale
    async fn genre_table(&self, locale: &str) -> ProviderResult<GenreTable>;
}

/// Favorites and ratings writes, scoped to an authenticated identity
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait FavoritesProvider: Send + Sync {
    async fn like(&self, identity: &Identity, item: ItemId) -> ProviderResult<()>;

    async fn unlike(&self, identity: &Identity, item: ItemId) -> ProviderResult<()>;

    async fn rate(&self, identity: &Identity, item: ItemId, rating: u8) -> ProviderResult<()>;

    async fn favorites(&self, identity: &Identity) -> ProviderResult<Vec<CatalogItem>>;
}

/// Supplies the current authenticated identity, if any
#[cfg_attr(test, mockall::automock)]
pub trait IdentityProvider: Send + Sync {
    fn current(&self) -> Option<Identity>;
}

/// In-memory identity holder the presentation layer signs in and out of
#[derive(Debug, Default)]
pub struct StaticIdentity {
    identity: RwLock<Option<Identity>>,
}

impl StaticIdentity {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn signed_in(identity: Identity) -> Self {
        Self {
            identity: RwLock::new(Some(identity)),
        }
    }

    pub fn sign_in(&self, identity: Identity) {
        tracing::info!(user_id = %identity.user_id, "Identity signed in");
        *self.identity.write().unwrap_or_else(PoisonError::into_inner) = Some(identity);
    }

    pub fn sign_out(&self) {
        tracing::info!("Identity signed out");
        *self.identity.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl IdentityProvider for StaticIdentity {
    fn current(&self) -> Option<Identity> {
        self.identity
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
