//! Local recipe cache.
//!
//! `RecipeCache` is the durable side of the sync engine: an insertion-ordered
//! recipe table with change notification, optionally flushed to a JSON
//! snapshot (`recipes.json`) in the cache directory after every write.

pub mod error;
pub mod manager;

pub use error::CacheError;
pub use manager::{CachedData, RecipeCache, RowOutcome, DEFAULT_PAGE_SIZE};
