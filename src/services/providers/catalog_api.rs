/// Catalog backend client
///
/// Serves catalog search, ranked recommendations and the user's favorites/ratings.
///
/// API Flow:
/// 1. Search: /search?q= → `[{movieId, title, genres?}]`
/// 2. Recommend: /recommend/{algorithm}/{movieId}?size= → `[{movieId, title, genres?, score}]`
/// 3. Writes: POST|DELETE /like/{movieId}, POST /rate, GET /favorites (bearer token)
use crate::{
    error::{ProviderError, ProviderResult},
    models::{Algorithm, CatalogItem, Identity, ItemId, ScoredItem},
    services::providers::{FavoritesProvider, RankingProvider, SearchProvider},
};
use reqwest::{Client as HttpClient, Response};
use serde::Serialize;
use std::time::Duration;

#[derive(Clone)]
pub struct CatalogApiClient {
    http_client: HttpClient,
    api_url: String,
}

#[derive(Debug, Serialize)]
struct RateRequest {
    #[serde(rename = "movieId")]
    movie_id: ItemId,
    score: u8,
}

impl CatalogApiClient {
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> ProviderResult<Self> {
        Ok(Self {
            http_client: HttpClient::builder().timeout(timeout).build()?,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Turns non-success statuses into [`ProviderError::Status`]
    async fn check_status(response: Response) -> ProviderResult<Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        tracing::error!(status = %status, body = %body, "Catalog API request failed");

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound);
        }

        Err(ProviderError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> ProviderResult<T> {
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            tracing::error!(error = %e, response = %text, "Failed to deserialize catalog response");
            ProviderError::Decode(e.to_string())
        })
    }
}

#[async_trait::async_trait]
impl SearchProvider for CatalogApiClient {
    async fn search(&self, query: &str) -> ProviderResult<Vec<CatalogItem>> {
        let url = format!("{}/search", self.api_url);

        let response = self
            .http_client
            .get(&url)
            .query(&[("q", query)])
            .send()
            .await?;

        let items: Vec<CatalogItem> = Self::decode(Self::check_status(response).await?).await?;

        tracing::debug!(query = %query, results = items.len(), "Catalog search completed");

        Ok(items)
    }
}

#[async_trait::async_trait]
impl RankingProvider for CatalogApiClient {
    async fn recommend(
        &self,
        source: ItemId,
        algorithm: Algorithm,
        size: usize,
    ) -> ProviderResult<Vec<ScoredItem>> {
        let url = format!("{}/recommend/{}/{}", self.api_url, algorithm, source);

        let response = self
            .http_client
            .get(&url)
            .query(&[("size", size)])
            .send()
            .await?;

        let candidates: Vec<ScoredItem> =
            Self::decode(Self::check_status(response).await?).await?;

        tracing::debug!(
            source = %source,
            algorithm = %algorithm,
            candidates = candidates.len(),
            "Ranking request completed"
        );

        Ok(candidates)
    }
}

#[async_trait::async_trait]
impl FavoritesProvider for CatalogApiClient {
    async fn like(&self, identity: &Identity, item: ItemId) -> ProviderResult<()> {
        let url = format!("{}/like/{}", self.api_url, item);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&identity.token)
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn unlike(&self, identity: &Identity, item: ItemId) -> ProviderResult<()> {
        let url = format!("{}/like/{}", self.api_url, item);
        let response = self
            .http_client
            .delete(&url)
            .bearer_auth(&identity.token)
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn rate(&self, identity: &Identity, item: ItemId, rating: u8) -> ProviderResult<()> {
        let url = format!("{}/rate", self.api_url);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&identity.token)
            .json(&RateRequest {
                movie_id: item,
                score: rating,
            })
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn favorites(&self, identity: &Identity) -> ProviderResult<Vec<CatalogItem>> {
        let url = format!("{}/favorites", self.api_url);
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&identity.token)
            .send()
            .await?;
        Self::decode(Self::check_status(response).await?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn client_for(server: &Server) -> CatalogApiClient {
        CatalogApiClient::new(server.url(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_slow_response_hits_configured_timeout() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/search")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_chunked_body(|w| {
                std::thread::sleep(Duration::from_millis(500));
                w.write_all(b"[]")
            })
            .create_async()
            .await;

        let client = CatalogApiClient::new(server.url(), Duration::from_millis(50)).unwrap();
        let err = client.search("matrix").await.unwrap_err();

        assert!(matches!(err, ProviderError::Http(ref e) if e.is_timeout()));
    }

    #[tokio::test]
    async fn test_search_parses_items() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/search")
            .match_query(Matcher::UrlEncoded("q".into(), "matrix".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[
                    {"movieId": 2571, "title": "Matrix, The (1999)"},
                    {"movieId": 6365, "title": "Matrix Reloaded, The (2003)", "genres": "Action|Sci-Fi"}
                ]"#,
            )
            .create_async()
            .await;

        let items = client_for(&server).search("matrix").await.unwrap();

        mock.assert_async().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, ItemId(2571));
        assert_eq!(items[1].genres.as_deref(), Some("Action|Sci-Fi"));
    }

    #[tokio::test]
    async fn test_recommend_passes_algorithm_and_size() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/recommend/hybrid/2571")
            .match_query(Matcher::UrlEncoded("size".into(), "100".into()))
            .with_status(200)
            .with_body(r#"[{"movieId": 6365, "title": "Matrix Reloaded, The (2003)", "score": 0.93}]"#)
            .create_async()
            .await;

        let candidates = client_for(&server)
            .recommend(ItemId(2571), Algorithm::Hybrid, 100)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].score, 0.93);
    }

    #[tokio::test]
    async fn test_server_error_maps_to_status() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/search")
            .match_query(Matcher::Any)
            .with_status(503)
            .with_body("maintenance")
            .create_async()
            .await;

        let err = client_for(&server).search("matrix").await.unwrap_err();
        match err {
            ProviderError::Status { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "maintenance");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_body_maps_to_decode() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/search")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let err = client_for(&server).search("matrix").await.unwrap_err();
        assert!(matches!(err, ProviderError::Decode(_)));
    }

    #[tokio::test]
    async fn test_like_and_unlike_send_bearer_token() {
        let mut server = Server::new_async().await;
        let like = server
            .mock("POST", "/like/42")
            .match_header("authorization", "Bearer secret")
            .with_status(200)
            .create_async()
            .await;
        let unlike = server
            .mock("DELETE", "/like/42")
            .match_header("authorization", "Bearer secret")
            .with_status(200)
            .create_async()
            .await;

        let client = client_for(&server);
        let identity = Identity::new("1", "secret");
        client.like(&identity, ItemId(42)).await.unwrap();
        client.unlike(&identity, ItemId(42)).await.unwrap();

        like.assert_async().await;
        unlike.assert_async().await;
    }

    #[tokio::test]
    async fn test_rate_posts_score() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/rate")
            .match_header("authorization", "Bearer secret")
            .match_body(Matcher::Json(json!({ "movieId": 42, "score": 4 })))
            .with_status(200)
            .create_async()
            .await;

        client_for(&server)
            .rate(&Identity::new("1", "secret"), ItemId(42), 4)
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_favorites_lists_items() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/favorites")
            .with_status(200)
            .with_body(r#"[{"movieId": 1, "title": "Toy Story (1995)"}]"#)
            .create_async()
            .await;

        let favorites = client_for(&server)
            .favorites(&Identity::new("1", "secret"))
            .await
            .unwrap();

        assert_eq!(favorites, vec![CatalogItem::new(1, "Toy Story (1995)")]);
    }
}
