//! Paged recipe search.
//!
//! `SearchController` owns the search session and relays one sync cycle at a
//! time to a single combined output. It is driven from one task (the UI
//! loop): `search`, `next_page` and `cancel` mutate the session, and `pump`
//! or `process_next` hand the attached cycle's emissions to the output.
//!
//! A cycle is relayed until its first terminal state. An empty page is
//! reported as `Error("No more results")` carrying the empty list, and no
//! further pages are requested for that query.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::models::Recipe;
use crate::observable::{Observable, Subscription};
use crate::repository::RecipeRepository;
use crate::resource::Resource;
use crate::sync::{ResourceStream, TryRecvError};

/// Message of the synthetic error emitted when a page comes back empty.
pub const QUERY_EXHAUSTED: &str = "No more results";

/// Source of search cycles for the controller.
pub trait RecipeSearch {
    fn search_recipes(&self, query: &str, page: u32) -> ResourceStream<Vec<Recipe>>;
}

impl RecipeSearch for RecipeRepository {
    fn search_recipes(&self, query: &str, page: u32) -> ResourceStream<Vec<Recipe>> {
        RecipeRepository::search_recipes(self, query, page)
    }
}

impl<T: RecipeSearch + ?Sized> RecipeSearch for Arc<T> {
    fn search_recipes(&self, query: &str, page: u32) -> ResourceStream<Vec<Recipe>> {
        (**self).search_recipes(query, page)
    }
}

/// What the list screen shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub enum ViewState {
    Categories,
    Results,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    Idle,
    Searching,
    Exhausted,
}

/// True for the synthetic "no more results" error.
pub fn is_exhaustion<T>(resource: &Resource<T>) -> bool {
    resource.error_message() == Some(QUERY_EXHAUSTED)
}

#[derive(Debug, Clone)]
pub struct SearchSession {
    query: String,
    page_number: u32,
    is_query_exhausted: bool,
    is_in_flight: bool,
    cancel_requested: bool,
    started_at: Option<Instant>,
}

impl Default for SearchSession {
    fn default() -> Self {
        Self {
            query: String::new(),
            page_number: 1,
            is_query_exhausted: false,
            is_in_flight: false,
            cancel_requested: false,
            started_at: None,
        }
    }
}

impl SearchSession {
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    pub fn is_query_exhausted(&self) -> bool {
        self.is_query_exhausted
    }

    pub fn is_in_flight(&self) -> bool {
        self.is_in_flight
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested
    }
}

pub struct SearchController<S = RecipeRepository> {
    source: S,
    session: SearchSession,
    active: Option<ResourceStream<Vec<Recipe>>>,
    recipes: Observable<Resource<Vec<Recipe>>>,
    view_state: Observable<ViewState>,
}

impl<S: RecipeSearch> SearchController<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            session: SearchSession::default(),
            active: None,
            recipes: Observable::new(),
            view_state: Observable::with_value(ViewState::Categories),
        }
    }

    // =========================================================================
    // Observation
    // =========================================================================

    /// Combined output of every relayed cycle. Replays the latest state.
    pub fn subscribe_recipes(&mut self) -> Subscription<Resource<Vec<Recipe>>> {
        self.recipes.subscribe()
    }

    pub fn subscribe_view_state(&mut self) -> Subscription<ViewState> {
        self.view_state.subscribe()
    }

    pub fn latest(&self) -> Option<&Resource<Vec<Recipe>>> {
        self.recipes.get()
    }

    pub fn view_state(&self) -> ViewState {
        self.view_state.get().copied().unwrap_or(ViewState::Categories)
    }

    pub fn session(&self) -> &SearchSession {
        &self.session
    }

    pub fn query(&self) -> &str {
        &self.session.query
    }

    pub fn page_number(&self) -> u32 {
        self.session.page_number
    }

    pub fn state(&self) -> SearchState {
        if self.session.is_in_flight {
            SearchState::Searching
        } else if self.session.is_query_exhausted {
            SearchState::Exhausted
        } else {
            SearchState::Idle
        }
    }

    /// Whether a cycle is still attached (including a cancelled one that
    /// hasn't emitted since).
    pub fn is_attached(&self) -> bool {
        self.active.is_some()
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Start a new search at page 1. Ignored while a search is in flight.
    pub fn search(&mut self, query: &str) -> bool {
        if self.session.is_in_flight {
            debug!(query, pending = %self.session.query, "Search already in flight, ignoring");
            return false;
        }

        self.session.query = query.to_string();
        self.session.page_number = 1;
        self.session.is_query_exhausted = false;
        self.execute_search();
        true
    }

    /// Request the next page of the current query. Ignored while a search is
    /// in flight or once the query is exhausted.
    pub fn next_page(&mut self) -> bool {
        if self.session.is_query_exhausted || self.session.is_in_flight {
            return false;
        }

        self.session.page_number += 1;
        self.execute_search();
        true
    }

    /// Stop relaying the current cycle. The cycle itself keeps running; its
    /// next emission is dropped and detaches it.
    pub fn cancel(&mut self) {
        if self.session.is_in_flight {
            info!(query = %self.session.query, "Cancelling search request");
            self.session.cancel_requested = true;
            self.session.is_in_flight = false;
            self.session.page_number = 1;
        }
    }

    /// Back to the category list.
    pub fn set_view_categories(&mut self) {
        self.set_view_state(ViewState::Categories);
    }

    fn set_view_state(&mut self, state: ViewState) {
        if self.view_state.get() != Some(&state) {
            self.view_state.set(state);
        }
    }

    fn execute_search(&mut self) {
        self.session.started_at = Some(Instant::now());
        self.session.cancel_requested = false;
        self.session.is_in_flight = true;
        self.set_view_state(ViewState::Results);

        debug!(query = %self.session.query, page = self.session.page_number, "Starting search");
        let stream = self
            .source
            .search_recipes(&self.session.query, self.session.page_number);
        // Replacing drops any cancelled cycle still attached
        self.active = Some(stream);
    }

    // =========================================================================
    // Relaying
    // =========================================================================

    /// Handle every emission already queued on the attached cycle without
    /// waiting. Returns how many were handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Some(stream) = self.active.as_mut() {
            match stream.try_recv() {
                Ok(resource) => {
                    self.handle(resource);
                    handled += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.on_closed();
                    break;
                }
            }
        }
        handled
    }

    /// Wait for the next emission on the attached cycle and handle it.
    /// Returns false if nothing is attached.
    pub async fn process_next(&mut self) -> bool {
        let Some(stream) = self.active.as_mut() else {
            return false;
        };
        match stream.recv().await {
            Some(resource) => self.handle(resource),
            None => self.on_closed(),
        }
        true
    }

    fn handle(&mut self, resource: Resource<Vec<Recipe>>) {
        if self.session.cancel_requested {
            debug!(status = resource.status(), "Dropping emission from cancelled search");
            self.detach();
            return;
        }

        match resource {
            Resource::Loading(_) => self.recipes.set(resource),
            Resource::Success(recipes) => {
                self.finish_request();
                if recipes.is_empty() {
                    info!(query = %self.session.query, page = self.session.page_number, "Query exhausted");
                    self.session.is_query_exhausted = true;
                    self.recipes.set(Resource::error(QUERY_EXHAUSTED, Some(recipes)));
                } else {
                    self.recipes.set(Resource::Success(recipes));
                }
                self.detach();
            }
            Resource::Error { .. } => {
                self.finish_request();
                self.recipes.set(resource);
                self.detach();
            }
        }
    }

    fn finish_request(&mut self) {
        self.session.is_in_flight = false;
        if let Some(started) = self.session.started_at.take() {
            debug!(
                query = %self.session.query,
                page = self.session.page_number,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Search request finished"
            );
        }
    }

    fn on_closed(&mut self) {
        if self.session.is_in_flight {
            warn!(query = %self.session.query, "Search cycle ended without a result");
            self.session.is_in_flight = false;
        }
        self.detach();
    }

    fn detach(&mut self) {
        self.active = None;
    }
}
