//! REST API client module for the recipe catalog.
//!
//! `ApiClient` talks to the catalog over HTTP. The sync engine only sees the
//! `RecipeApi` trait, whose calls resolve to exactly one `ApiResponse`: a
//! body, an empty response, or an error message.

pub mod client;
pub mod error;

use async_trait::async_trait;

use crate::models::{Recipe, RecipeSearchResponse};
use crate::resource::ApiResponse;

pub use client::ApiClient;
pub use error::ApiError;

#[async_trait]
pub trait RecipeApi: Send + Sync {
    /// One page of catalog search results.
    async fn search_recipes(&self, query: &str, page: u32) -> ApiResponse<RecipeSearchResponse>;

    /// A single recipe with its ingredients.
    async fn get_recipe(&self, recipe_id: &str) -> ApiResponse<Recipe>;
}
