//! Test utilities shared across the crate.
//!
//! This module is only compiled during tests (`#[cfg(test)]`).

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::api::RecipeApi;
use crate::models::{Recipe, RecipeSearchResponse};
use crate::resource::ApiResponse;

pub fn recipe(id: &str, title: &str, rank: f32) -> Recipe {
    Recipe {
        recipe_id: id.to_string(),
        title: title.to_string(),
        publisher: "Closet Cooking".to_string(),
        ingredients: Vec::new(),
        image_url: format!("http://img/{}.jpg", id),
        social_rank: rank,
        timestamp: 0,
    }
}

/// `count` recipes titled "<query> #n", ids prefixed with `id_prefix`.
pub fn recipes(id_prefix: &str, query: &str, count: usize) -> Vec<Recipe> {
    (0..count)
        .map(|n| {
            recipe(
                &format!("{}{}", id_prefix, n),
                &format!("{} #{}", query, n),
                100.0 - n as f32,
            )
        })
        .collect()
}

pub fn page(recipes: Vec<Recipe>) -> ApiResponse<RecipeSearchResponse> {
    ApiResponse::Success(RecipeSearchResponse {
        count: recipes.len() as u32,
        recipes,
    })
}

/// Scripted catalog. Responses are served in order; when a script runs out
/// the call answers `Empty`. Every call is recorded.
#[derive(Default)]
pub struct FakeApi {
    search_responses: Mutex<VecDeque<ApiResponse<RecipeSearchResponse>>>,
    recipe_responses: Mutex<VecDeque<ApiResponse<Recipe>>>,
    calls: Mutex<Vec<String>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_search(&self, response: ApiResponse<RecipeSearchResponse>) {
        self.search_responses.lock().unwrap().push_back(response);
    }

    pub fn push_recipe(&self, response: ApiResponse<Recipe>) {
        self.recipe_responses.lock().unwrap().push_back(response);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecipeApi for FakeApi {
    async fn search_recipes(&self, query: &str, page: u32) -> ApiResponse<RecipeSearchResponse> {
        self.calls.lock().unwrap().push(format!("search:{}:{}", query, page));
        self.search_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ApiResponse::Empty)
    }

    async fn get_recipe(&self, recipe_id: &str) -> ApiResponse<Recipe> {
        self.calls.lock().unwrap().push(format!("get:{}", recipe_id));
        self.recipe_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ApiResponse::Empty)
    }
}
