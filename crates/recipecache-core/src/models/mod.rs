//! Data models for the recipe catalog.
//!
//! - `Recipe`: the cached entity, keyed by `recipe_id`
//! - `RecipeUpdate`: the fields a search result may refresh on an existing row
//! - `RecipeSearchResponse`, `RecipeResponse`: catalog wire responses

pub mod recipe;

pub use recipe::{Recipe, RecipeResponse, RecipeSearchResponse, RecipeUpdate};
