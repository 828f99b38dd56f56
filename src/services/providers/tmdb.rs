/// TMDB metadata provider
///
/// Supplies posters, genres and overviews for catalog titles. The catalog only knows
/// titles, so lookups go through `/search/movie` and take the first result as best match.
use crate::{
    error::{ProviderError, ProviderResult},
    models::{GenreTable, MetadataMatch},
    services::providers::MetadataProvider,
};
use reqwest::{Client as HttpClient, StatusCode};
use serde::Deserialize;
use std::time::Duration;

#[derive(Clone)]
pub struct TmdbClient {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<TmdbMovie>,
}

#[derive(Debug, Deserialize)]
struct TmdbMovie {
    #[serde(default)]
    poster_path: Option<String>,
    #[serde(default)]
    genre_ids: Vec<u32>,
    #[serde(default)]
    overview: Option<String>,
    #[serde(default)]
    release_date: Option<String>,
}

impl From<TmdbMovie> for MetadataMatch {
    fn from(movie: TmdbMovie) -> Self {
        MetadataMatch {
            poster_path: movie.poster_path,
            genre_ids: movie.genre_ids,
            genre_names: Vec::new(),
            overview: movie.overview.filter(|o| !o.trim().is_empty()),
            release_date: movie.release_date.filter(|d| !d.is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenreListResponse {
    genres: Vec<TmdbGenre>,
}

#[derive(Debug, Deserialize)]
struct TmdbGenre {
    id: u32,
    name: String,
}

impl TmdbClient {
    pub fn new(
        api_key: impl Into<String>,
        api_url: impl Into<String>,
        timeout: Duration,
    ) -> ProviderResult<Self> {
        Ok(Self {
            http_client: HttpClient::builder().timeout(timeout).build()?,
            api_key: api_key.into(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> ProviderResult<T> {
        let url = format!("{}{}", self.api_url, endpoint);

        let response = self
            .http_client
            .get(&url)
            .query(&[("api_key", self.api_key.as_str())])
            .query(params)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let body = response.text().await?;
                serde_json::from_str(&body).map_err(|e| {
                    tracing::error!(error = %e, endpoint = %endpoint, "Failed to parse TMDB response");
                    ProviderError::Decode(e.to_string())
                })
            }
            StatusCode::NOT_FOUND => Err(ProviderError::NotFound),
            status => {
                let body = response.text().await.unwrap_or_default();
                tracing::error!(status = %status, endpoint = %endpoint, "TMDB request failed");
                Err(ProviderError::Status {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}

#[async_trait::async_trait]
impl MetadataProvider for TmdbClient {
    async fn find_title(
        &self,
        title: &str,
        year: Option<i32>,
        locale: &str,
    ) -> ProviderResult<Option<MetadataMatch>> {
        let mut params = vec![
            ("query", title.to_string()),
            ("language", locale.to_string()),
        ];
        if let Some(year) = year {
            params.push(("year", year.to_string()));
        }

        let response: SearchResponse = self.get("/search/movie", &params).await?;
        let best = response.results.into_iter().next().map(MetadataMatch::from);

        tracing::debug!(
            title = %title,
            locale = %locale,
            matched = best.is_some(),
            provider = "tmdb",
            "Title lookup completed"
        );

        Ok(best)
    }

    async fn genre_table(&self, locale: &str) -> ProviderResult<GenreTable> {
        let response: GenreListResponse = self
            .get("/genre/movie/list", &[("language", locale.to_string())])
            .await?;

        let table: GenreTable = response
            .genres
            .into_iter()
            .map(|g| (g.id, g.name))
            .collect();

        tracing::info!(locale = %locale, genres = table.len(), provider = "tmdb", "Genre table fetched");

        Ok(table)
    }
}
