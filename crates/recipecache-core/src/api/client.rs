//! API client for the recipe catalog REST API.
//!
//! This module provides the `ApiClient` struct for searching the catalog and
//! fetching individual recipes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::Config;
use crate::models::{Recipe, RecipeResponse, RecipeSearchResponse};
use crate::resource::ApiResponse;

use super::{ApiError, RecipeApi};

// ============================================================================
// Constants
// ============================================================================

/// Base URL of the public recipe catalog
pub const DEFAULT_BASE_URL: &str = "https://recipesapi.herokuapp.com";

/// HTTP request timeout in seconds
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting, doubled per retry
const INITIAL_BACKOFF_MS: u64 = 1000;

/// API client for the recipe catalog.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self { client, base_url })
    }

    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        Self::new(
            config.api_base_url(),
            Duration::from_secs(config.request_timeout_secs()),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>, ApiError> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status() == StatusCode::TOO_MANY_REQUESTS {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Decode a successful response. 204 and blank bodies are `None`.
    async fn read_body<T: DeserializeOwned>(
        response: reqwest::Response,
        url: &str,
    ) -> Result<Option<T>, ApiError> {
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            debug!(url, "Empty response body");
            return Ok(None);
        }

        serde_json::from_str(&text).map(Some).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", url, e))
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Option<T>, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self.client.get(&url).query(query).send().await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => return Self::read_body(response, &url).await,
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(url = %url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }

    // ===== Data Fetching Methods =====

    /// Search the catalog. `page` is 1-based.
    pub async fn search(&self, query: &str, page: u32) -> Result<Option<RecipeSearchResponse>, ApiError> {
        let page = page.to_string();
        self.get("/api/search", &[("q", query), ("page", page.as_str())])
            .await
    }

    /// Fetch one recipe. A `{"recipe": null}` answer is treated as no content.
    pub async fn fetch_recipe(&self, recipe_id: &str) -> Result<Option<Recipe>, ApiError> {
        let response: Option<RecipeResponse> = self.get("/api/get", &[("rId", recipe_id)]).await?;
        Ok(response.and_then(|r| r.recipe))
    }
}

#[async_trait]
impl RecipeApi for ApiClient {
    async fn search_recipes(&self, query: &str, page: u32) -> ApiResponse<RecipeSearchResponse> {
        let result = self.search(query, page).await;
        if let Err(ref e) = result {
            warn!(query, page, transient = e.is_transient(), error = %e, "Recipe search failed");
        }
        ApiResponse::from_result(result)
    }

    async fn get_recipe(&self, recipe_id: &str) -> ApiResponse<Recipe> {
        let result = self.fetch_recipe(recipe_id).await;
        if let Err(ref e) = result {
            warn!(recipe_id, transient = e.is_transient(), error = %e, "Recipe fetch failed");
        }
        ApiResponse::from_result(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let client = ApiClient::new("http://localhost:8080/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080");
    }
}
