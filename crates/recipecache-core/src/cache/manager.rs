use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::models::{Recipe, RecipeUpdate};

use super::CacheError;

/// Rows per search page.
/// Matches the catalog's own page size so a cached page lines up with a fetched one.
pub const DEFAULT_PAGE_SIZE: usize = 30;

/// Snapshot file name (without extension) in the cache directory
const SNAPSHOT_NAME: &str = "recipes";

/// Envelope for data written to the cache directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }
}

fn age_display(minutes: i64) -> String {
    if minutes < 1 {
        // Also covers clock skew
        "just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if minutes < 1440 {
        let hours = minutes / 60;
        let remaining_mins = minutes % 60;
        if remaining_mins >= 30 {
            format!("{}h ago", hours + 1)
        } else {
            format!("{}h ago", hours)
        }
    } else {
        let days = minutes / 1440;
        let remaining_hours = (minutes % 1440) / 60;
        if remaining_hours >= 12 {
            format!("{}d ago", days + 1)
        } else {
            format!("{}d ago", days)
        }
    }
}

/// Result of writing one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    Inserted,
    /// A row with the same `recipe_id` already exists.
    ConflictOnKey,
}

#[derive(Default, Clone)]
struct Table {
    recipes: Vec<Recipe>,
    index: HashMap<String, usize>,
    saved_at: Option<DateTime<Utc>>,
}

impl Table {
    fn from_rows(recipes: Vec<Recipe>, saved_at: Option<DateTime<Utc>>) -> Self {
        let mut table = Table {
            saved_at,
            ..Default::default()
        };
        for recipe in recipes {
            if let Some(&pos) = table.index.get(&recipe.recipe_id) {
                table.recipes[pos] = recipe;
            } else {
                table.push(recipe);
            }
        }
        table
    }

    fn push(&mut self, recipe: Recipe) {
        self.index.insert(recipe.recipe_id.clone(), self.recipes.len());
        self.recipes.push(recipe);
    }

    fn get_mut(&mut self, recipe_id: &str) -> Option<&mut Recipe> {
        let pos = *self.index.get(recipe_id)?;
        self.recipes.get_mut(pos)
    }

    fn insert(&mut self, recipe: Recipe) -> RowOutcome {
        if self.index.contains_key(&recipe.recipe_id) {
            RowOutcome::ConflictOnKey
        } else {
            self.push(recipe);
            RowOutcome::Inserted
        }
    }
}

/// Keyed recipe storage with change subscriptions.
///
/// Writers are serialized by `writer`, which also holds the commit sequence.
/// A write is applied to a copy of the table, the copy is flushed to the
/// snapshot, and only then swapped in and announced on `changes`. A failed
/// flush leaves the table and subscribers untouched. Readers only ever take
/// the `table` lock, which is never held across disk I/O.
///
/// Writes are synchronous and may touch the disk, so async callers should run
/// them on a blocking thread.
pub struct RecipeCache {
    cache_dir: Option<PathBuf>,
    page_size: usize,
    table: Mutex<Table>,
    writer: Mutex<u64>,
    changes: watch::Sender<u64>,
}

impl RecipeCache {
    /// A cache that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self::with_table(None, Table::default())
    }

    /// Open (or create) a cache backed by `cache_dir`, reloading the last
    /// snapshot if one exists.
    pub fn open(cache_dir: PathBuf) -> Result<Self, CacheError> {
        std::fs::create_dir_all(&cache_dir).map_err(|e| CacheError::io(&cache_dir, e))?;

        let table = match Self::load_snapshot(&cache_dir)? {
            Some(cached) => {
                debug!(rows = cached.data.len(), cached_at = %cached.cached_at, "Loaded recipe snapshot");
                Table::from_rows(cached.data, Some(cached.cached_at))
            }
            None => Table::default(),
        };

        Ok(Self::with_table(Some(cache_dir), table))
    }

    fn with_table(cache_dir: Option<PathBuf>, table: Table) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            cache_dir,
            page_size: DEFAULT_PAGE_SIZE,
            table: Mutex::new(table),
            writer: Mutex::new(0),
            changes,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    fn snapshot_path(cache_dir: &Path) -> PathBuf {
        cache_dir.join(format!("{}.json", SNAPSHOT_NAME))
    }

    fn load_snapshot(cache_dir: &Path) -> Result<Option<CachedData<Vec<Recipe>>>, CacheError> {
        let path = Self::snapshot_path(cache_dir);
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path).map_err(|e| CacheError::io(&path, e))?;
        let cached = serde_json::from_str(&contents)
            .map_err(|source| CacheError::Parse { path, source })?;
        Ok(Some(cached))
    }

    /// Write the snapshot next to the live file, then rename it into place so
    /// a failed flush never truncates the previous snapshot.
    fn write_snapshot(cache_dir: &Path, recipes: &[Recipe]) -> Result<DateTime<Utc>, CacheError> {
        let cached = CachedData::new(recipes);
        let contents = serde_json::to_string_pretty(&cached)?;
        let path = Self::snapshot_path(cache_dir);
        let staging = path.with_extension("json.tmp");

        std::fs::write(&staging, contents).map_err(|e| CacheError::io(&staging, e))?;
        if let Err(e) = std::fs::rename(&staging, &path) {
            let _ = std::fs::remove_file(&staging);
            return Err(CacheError::io(&path, e));
        }
        Ok(cached.cached_at)
    }

    fn table(&self) -> MutexGuard<'_, Table> {
        // The table is only ever replaced whole, so a poisoned lock still holds a consistent table
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one write against a staged copy of the table. `apply` returns its
    /// result and whether it changed anything; unchanged writes skip the
    /// flush and notify no one.
    fn write<R>(&self, apply: impl FnOnce(&mut Table) -> (R, bool)) -> Result<R, CacheError> {
        let mut sequence = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let mut staged = self.table().clone();
        let (result, changed) = apply(&mut staged);
        if !changed {
            return Ok(result);
        }

        if let Some(ref dir) = self.cache_dir {
            match Self::write_snapshot(dir, &staged.recipes) {
                Ok(saved_at) => staged.saved_at = Some(saved_at),
                Err(e) => {
                    warn!(error = %e, "Recipe snapshot write failed, discarding change");
                    return Err(e);
                }
            }
        }

        *self.table() = staged;
        *sequence += 1;
        self.changes.send_replace(*sequence);
        Ok(result)
    }

    // ===== Writes =====

    pub fn insert_recipe(&self, recipe: Recipe) -> Result<RowOutcome, CacheError> {
        self.write(|table| {
            let outcome = table.insert(recipe);
            (outcome, outcome == RowOutcome::Inserted)
        })
    }

    /// Insert a batch, reporting one outcome per row in batch order.
    /// Conflicting rows are left untouched.
    pub fn insert_recipes(&self, recipes: &[Recipe]) -> Result<Vec<RowOutcome>, CacheError> {
        self.write(|table| {
            let outcomes: Vec<RowOutcome> = recipes.iter().map(|r| table.insert(r.clone())).collect();
            let changed = outcomes.contains(&RowOutcome::Inserted);
            (outcomes, changed)
        })
    }

    /// Insert a batch; a row whose key already exists gets the new row's
    /// search fields applied instead (ingredients and timestamp are kept).
    /// Rows resolve in batch order and the whole batch commits once.
    pub fn upsert_recipes(&self, recipes: &[Recipe]) -> Result<Vec<RowOutcome>, CacheError> {
        self.write(|table| {
            let outcomes: Vec<RowOutcome> = recipes
                .iter()
                .map(|recipe| {
                    let outcome = table.insert(recipe.clone());
                    if outcome == RowOutcome::ConflictOnKey {
                        if let Some(row) = table.get_mut(&recipe.recipe_id) {
                            recipe.update_fields().apply(row);
                        }
                    }
                    outcome
                })
                .collect();
            (outcomes, !recipes.is_empty())
        })
    }

    /// Apply `update` to the row keyed by `recipe_id`. Returns false if no such row.
    pub fn update_recipe(&self, recipe_id: &str, update: &RecipeUpdate) -> Result<bool, CacheError> {
        self.write(|table| match table.get_mut(recipe_id) {
            Some(row) => {
                update.apply(row);
                (true, true)
            }
            None => {
                warn!(recipe_id, "Update for unknown recipe ignored");
                (false, false)
            }
        })
    }

    /// Insert, or overwrite every field of an existing row.
    pub fn replace_recipe(&self, recipe: Recipe) -> Result<RowOutcome, CacheError> {
        self.write(|table| {
            let outcome = match table.get_mut(&recipe.recipe_id) {
                Some(row) => {
                    *row = recipe;
                    RowOutcome::ConflictOnKey
                }
                None => {
                    table.push(recipe);
                    RowOutcome::Inserted
                }
            };
            (outcome, true)
        })
    }

    // ===== Reads =====

    pub fn get_recipe(&self, recipe_id: &str) -> Option<Recipe> {
        let table = self.table();
        table
            .index
            .get(recipe_id)
            .and_then(|&pos| table.recipes.get(pos))
            .cloned()
    }

    /// One page of rows whose title or ingredients contain `query`
    /// (case-insensitive), highest social rank first.
    pub fn search_recipes(&self, query: &str, page: u32) -> Vec<Recipe> {
        let query_lower = query.to_lowercase();
        let table = self.table();
        let mut matches: Vec<&Recipe> = table
            .recipes
            .iter()
            .filter(|r| r.matches(&query_lower))
            .collect();
        // Stable sort: equal ranks keep insertion order
        matches.sort_by(|a, b| b.social_rank.total_cmp(&a.social_rank));

        let skip = (page.max(1) as usize - 1) * self.page_size;
        matches
            .into_iter()
            .skip(skip)
            .take(self.page_size)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.table().recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Age of the last snapshot written to disk, e.g. "5m ago".
    pub fn cache_age(&self) -> Option<String> {
        let saved_at = self.table().saved_at?;
        Some(age_display((Utc::now() - saved_at).num_minutes()))
    }

    // ===== Subscriptions =====

    /// Current row for `recipe_id`, then again after every write.
    pub fn watch_recipe(self: &Arc<Self>, recipe_id: &str) -> BoxStream<'static, Option<Recipe>> {
        let recipe_id = recipe_id.to_string();
        self.observe(move |cache| cache.get_recipe(&recipe_id))
    }

    /// Current search page, then again after every write.
    pub fn watch_search(self: &Arc<Self>, query: &str, page: u32) -> BoxStream<'static, Vec<Recipe>> {
        let query = query.to_string();
        self.observe(move |cache| cache.search_recipes(&query, page))
    }

    fn observe<T, F>(self: &Arc<Self>, read: F) -> BoxStream<'static, T>
    where
        T: Send + 'static,
        F: Fn(&RecipeCache) -> T + Send + 'static,
    {
        // Subscribe before the first read so no write can slip between them
        let rx = self.changes.subscribe();
        let state = (Arc::clone(self), rx, read, true);

        stream::unfold(state, |(cache, mut rx, read, first)| async move {
            if !first && rx.changed().await.is_err() {
                return None;
            }
            let value = read(cache.as_ref());
            Some((value, (cache, rx, read, false)))
        })
        .boxed()
    }
}

// ============================================================================
// Tests
// ============================================================================
