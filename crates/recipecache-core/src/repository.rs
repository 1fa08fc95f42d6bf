//! Recipe lookups bound to the local cache and the catalog.
//!
//! `RecipeRepository` is constructed once by whatever composes the
//! application and handed to the search controller and detail screens.
//! Each call starts one sync cycle through one of two bound resources:
//!
//! - `SearchRecipes`: always refreshes; each page is upserted as one batch
//!   so a recipe seen in several searches stays a single row.
//! - `RecipeDetail`: refreshes only when the cached row is missing or older
//!   than the refresh threshold; the saved row is stamped with the save time.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{BoxStream, StreamExt};
use tracing::debug;

use crate::api::RecipeApi;
use crate::cache::{RecipeCache, RowOutcome};
use crate::models::{Recipe, RecipeSearchResponse};
use crate::resource::ApiResponse;
use crate::sync::{self, NetworkBoundResource, ResourceStream};

#[derive(Clone)]
pub struct RecipeRepository {
    cache: Arc<RecipeCache>,
    api: Arc<dyn RecipeApi>,
    refresh_threshold: chrono::Duration,
}

impl RecipeRepository {
    pub fn new(cache: Arc<RecipeCache>, api: Arc<dyn RecipeApi>, refresh_threshold: chrono::Duration) -> Self {
        Self {
            cache,
            api,
            refresh_threshold,
        }
    }

    pub fn cache(&self) -> &Arc<RecipeCache> {
        &self.cache
    }

    /// Refresh one search page and follow its cached rows.
    pub fn search_recipes(&self, query: &str, page: u32) -> ResourceStream<Vec<Recipe>> {
        sync::run(Arc::new(SearchRecipes {
            cache: Arc::clone(&self.cache),
            api: Arc::clone(&self.api),
            query: query.to_string(),
            page: page.max(1),
        }))
    }

    /// Look up one recipe, refreshing it if the cached copy is stale.
    pub fn get_recipe(&self, recipe_id: &str) -> ResourceStream<Recipe> {
        sync::run(Arc::new(RecipeDetail {
            cache: Arc::clone(&self.cache),
            api: Arc::clone(&self.api),
            recipe_id: recipe_id.to_string(),
            refresh_threshold: self.refresh_threshold,
        }))
    }
}

/// Whether a cached recipe is due for a refresh at `now` (Unix seconds).
pub fn needs_refresh(cached: Option<&Recipe>, now: i64, threshold: chrono::Duration) -> bool {
    match cached {
        None => true,
        Some(recipe) => recipe.age_secs(now) >= threshold.num_seconds(),
    }
}

struct SearchRecipes {
    cache: Arc<RecipeCache>,
    api: Arc<dyn RecipeApi>,
    query: String,
    page: u32,
}

#[async_trait]
impl NetworkBoundResource for SearchRecipes {
    type Cache = Vec<Recipe>;
    type Wire = RecipeSearchResponse;

    fn should_fetch(&self, _cached: Option<&Vec<Recipe>>) -> bool {
        true
    }

    fn load_from_cache(&self) -> BoxStream<'static, Option<Vec<Recipe>>> {
        self.cache.watch_search(&self.query, self.page).map(Some).boxed()
    }

    async fn create_call(&self) -> ApiResponse<RecipeSearchResponse> {
        self.api.search_recipes(&self.query, self.page).await
    }

    fn save_call_result(&self, body: RecipeSearchResponse) -> anyhow::Result<()> {
        let outcomes = self.cache.upsert_recipes(&body.recipes)?;
        let updated = outcomes
            .iter()
            .filter(|o| **o == RowOutcome::ConflictOnKey)
            .count();
        debug!(total = outcomes.len(), updated, "Upserted search results");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("search({:?}, page {})", self.query, self.page)
    }
}

struct RecipeDetail {
    cache: Arc<RecipeCache>,
    api: Arc<dyn RecipeApi>,
    recipe_id: String,
    refresh_threshold: chrono::Duration,
}

#[async_trait]
impl NetworkBoundResource for RecipeDetail {
    type Cache = Recipe;
    type Wire = Recipe;

    fn should_fetch(&self, cached: Option<&Recipe>) -> bool {
        needs_refresh(cached, Utc::now().timestamp(), self.refresh_threshold)
    }

    fn load_from_cache(&self) -> BoxStream<'static, Option<Recipe>> {
        self.cache.watch_recipe(&self.recipe_id)
    }

    async fn create_call(&self) -> ApiResponse<Recipe> {
        self.api.get_recipe(&self.recipe_id).await
    }

    fn save_call_result(&self, mut recipe: Recipe) -> anyhow::Result<()> {
        recipe.timestamp = Utc::now().timestamp();
        self.cache.replace_recipe(recipe)?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("recipe({})", self.recipe_id)
    }
}
