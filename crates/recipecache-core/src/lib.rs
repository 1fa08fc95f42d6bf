//! Core library for recipecache.
//!
//! The crate is built around a cache-then-network synchronization engine:
//! every lookup first reads the local recipe cache, decides whether the
//! remote catalog must be consulted, and reports its progress as a stream of
//! [`Resource`] states. A paginated [`SearchController`] drives that engine
//! for search screens.
//!
//! - `models`: recipe entities and the catalog's wire responses
//! - `resource`: `Resource<T>` lifecycle and `ApiResponse<W>` outcomes
//! - `observable`: replay-latest publish/subscribe used by presentation
//! - `cache`: the local recipe table with change notification and snapshots
//! - `api`: HTTP client for the recipe catalog
//! - `sync`: the network-bound resource engine
//! - `repository`: recipe lookups bound to the cache and the catalog
//! - `search`: paged search state machine
//! - `config`: on-disk configuration

pub mod api;
pub mod cache;
pub mod config;
pub mod models;
pub mod observable;
pub mod repository;
pub mod resource;
pub mod search;
pub mod sync;

#[cfg(test)]
mod test_support;

pub use api::{ApiClient, ApiError, RecipeApi};
pub use cache::{CacheError, CachedData, RecipeCache, RowOutcome};
pub use config::Config;
pub use models::{Recipe, RecipeResponse, RecipeSearchResponse, RecipeUpdate};
pub use observable::{Observable, Subscription};
pub use repository::RecipeRepository;
pub use resource::{ApiResponse, Resource};
pub use search::{is_exhaustion, RecipeSearch, SearchController, SearchSession, SearchState, ViewState, QUERY_EXHAUSTED};
pub use sync::{NetworkBoundResource, ResourceStream};
