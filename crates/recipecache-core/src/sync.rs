//! Cache-then-network synchronization.
//!
//! A [`NetworkBoundResource`] describes one lookup: how to read it from the
//! cache, whether the cached value needs a refresh, how to call the catalog,
//! and how to store what the catalog returned. [`run`] drives one refresh
//! cycle on a background task and reports it as a [`ResourceStream`]:
//!
//! ```text
//! Loading(None) ──► read cache once ──► should_fetch?
//!                                          │ no  ──► Success(v) for every cache change
//!                                          │ yes
//!                                          ▼
//!                               Loading(cached) ──► create_call (once)
//!                                          │ Success(body) ──► save (blocking thread) ──► track cache
//!                                          │ Empty         ──► track cache
//!                                          │ Error(msg)    ──► re-read cache once ──► Error(msg, cached), end
//! ```
//!
//! The engine never retries. A failed refresh ends the cycle; the caller
//! starts a new one if it wants to try again. Dropping the stream detaches
//! the consumer: cache tracking stops, but a call already in flight still
//! completes and its result is still saved.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::stream::{BoxStream, Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::resource::{ApiResponse, Resource};

pub use tokio::sync::mpsc::error::TryRecvError;

/// Error message emitted while tracking a cache that holds no value.
pub const NO_CACHED_DATA: &str = "No cached data";

#[async_trait]
pub trait NetworkBoundResource: Send + Sync + 'static {
    /// Value type read from the cache and handed to consumers.
    type Cache: Clone + Send + Sync + 'static;
    /// Body type returned by the catalog.
    type Wire: Send + 'static;

    /// Decide from the cached value whether the catalog must be consulted.
    fn should_fetch(&self, cached: Option<&Self::Cache>) -> bool;

    /// Current cached value, then again after every change.
    fn load_from_cache(&self) -> BoxStream<'static, Option<Self::Cache>>;

    /// Call the catalog. Invoked at most once per cycle.
    async fn create_call(&self) -> ApiResponse<Self::Wire>;

    /// Store a successful body. Runs on a blocking thread.
    fn save_call_result(&self, body: Self::Wire) -> anyhow::Result<()>;

    /// Label used in log output.
    fn describe(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

/// Start one refresh cycle. Must be called from within a tokio runtime.
pub fn run<R: NetworkBoundResource>(resource: Arc<R>) -> ResourceStream<R::Cache> {
    let (tx, stream) = ResourceStream::channel();
    tokio::spawn(drive(resource, tx));
    stream
}

type Sender<T> = mpsc::UnboundedSender<Resource<T>>;

async fn drive<R: NetworkBoundResource>(resource: Arc<R>, tx: Sender<R::Cache>) {
    let name = resource.describe();

    if tx.send(Resource::Loading(None)).is_err() {
        return;
    }

    let cached = read_once(resource.as_ref()).await;
    if !resource.should_fetch(cached.as_ref()) {
        debug!(resource = %name, "Cache is fresh, tracking cache");
        track_cache(resource.as_ref(), &tx).await;
        return;
    }

    if tx.send(Resource::Loading(cached.clone())).is_err() {
        debug!(resource = %name, "Consumer detached before fetch");
        return;
    }

    match resource.create_call().await {
        ApiResponse::Success(body) => {
            debug!(resource = %name, "Fetch succeeded, saving result");
            let writer = Arc::clone(&resource);
            let saved = tokio::task::spawn_blocking(move || writer.save_call_result(body)).await;

            let failure = match saved {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(format!("Failed to save results: {:#}", e)),
                Err(e) => Some(format!("Save task failed: {}", e)),
            };
            if let Some(message) = failure {
                error!(resource = %name, error = %message, "Could not persist fetched data");
                let latest = read_once(resource.as_ref()).await.or(cached);
                let _ = tx.send(Resource::error(message, latest));
                return;
            }

            track_cache(resource.as_ref(), &tx).await;
        }
        ApiResponse::Empty => {
            debug!(resource = %name, "Empty response, reading cache");
            track_cache(resource.as_ref(), &tx).await;
        }
        ApiResponse::Error(message) => {
            debug!(resource = %name, error = %message, "Fetch failed");
            let latest = read_once(resource.as_ref()).await.or(cached);
            let _ = tx.send(Resource::Error {
                message,
                data: latest,
            });
        }
    }
}

/// First value of a fresh cache subscription; the subscription is dropped.
async fn read_once<R: NetworkBoundResource>(resource: &R) -> Option<R::Cache> {
    resource.load_from_cache().next().await.flatten()
}

/// Forward every cache change as `Success` until the consumer detaches.
async fn track_cache<R: NetworkBoundResource>(resource: &R, tx: &Sender<R::Cache>) {
    let mut changes = resource.load_from_cache();
    loop {
        tokio::select! {
            _ = tx.closed() => break,
            value = changes.next() => {
                let state = match value {
                    Some(Some(value)) => Resource::Success(value),
                    Some(None) => Resource::error(NO_CACHED_DATA, None),
                    None => break,
                };
                if tx.send(state).is_err() {
                    break;
                }
            }
        }
    }
    debug!(resource = %resource.describe(), "Stopped tracking cache");
}

/// Ordered states of one refresh cycle.
///
/// Ends after a terminal `Error`; after `Success` it stays open and follows
/// the cache until dropped.
#[derive(Debug)]
pub struct ResourceStream<T> {
    rx: mpsc::UnboundedReceiver<Resource<T>>,
}

impl<T> ResourceStream<T> {
    /// A stream fed by the returned sender. Lets alternative sources (and
    /// tests) produce cycles without going through [`run`].
    pub fn channel() -> (mpsc::UnboundedSender<Resource<T>>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }

    pub async fn recv(&mut self) -> Option<Resource<T>> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Result<Resource<T>, TryRecvError> {
        self.rx.try_recv()
    }
}

impl<T> Stream for ResourceStream<T> {
    type Item = Resource<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::watch;

    struct Fake {
        cache: watch::Sender<Option<String>>,
        response: Mutex<Option<ApiResponse<String>>>,
        fetches: AtomicUsize,
        fetch: bool,
        fail_save: bool,
    }

    impl Fake {
        fn new(cached: Option<&str>, response: ApiResponse<String>) -> Self {
            let (cache, _) = watch::channel(cached.map(str::to_string));
            Self {
                cache,
                response: Mutex::new(Some(response)),
                fetches: AtomicUsize::new(0),
                fetch: true,
                fail_save: false,
            }
        }

        fn fresh(cached: &str) -> Self {
            Self {
                fetch: false,
                ..Self::new(Some(cached), ApiResponse::Empty)
            }
        }
    }

    #[async_trait]
    impl NetworkBoundResource for Fake {
        type Cache = String;
        type Wire = String;

        fn should_fetch(&self, _cached: Option<&String>) -> bool {
            self.fetch
        }

        fn load_from_cache(&self) -> BoxStream<'static, Option<String>> {
            let rx = self.cache.subscribe();
            stream::unfold((rx, true), |(mut rx, first)| async move {
                if !first && rx.changed().await.is_err() {
                    return None;
                }
                let value = rx.borrow_and_update().clone();
                Some((value, (rx, false)))
            })
            .boxed()
        }

        async fn create_call(&self) -> ApiResponse<String> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.response.lock().unwrap().take().unwrap_or(ApiResponse::Empty)
        }

        fn save_call_result(&self, body: String) -> anyhow::Result<()> {
            if self.fail_save {
                anyhow::bail!("disk full");
            }
            // Normalize on write so tests can tell the read-back apart from the body
            self.cache.send_replace(Some(body.to_uppercase()));
            Ok(())
        }
    }

    async fn next(stream: &mut ResourceStream<String>) -> Option<Resource<String>> {
        tokio::time::timeout(Duration::from_secs(5), stream.recv())
            .await
            .expect("timed out waiting for emission")
    }

    #[tokio::test]
    async fn test_fresh_cache_skips_fetch_and_tracks_changes() {
        let fake = Arc::new(Fake::fresh("cached"));
        let mut stream = run(Arc::clone(&fake));

        assert_eq!(next(&mut stream).await, Some(Resource::Loading(None)));
        assert_eq!(next(&mut stream).await, Some(Resource::Success("cached".to_string())));

        fake.cache.send_replace(Some("changed".to_string()));
        assert_eq!(next(&mut stream).await, Some(Resource::Success("changed".to_string())));
        assert_eq!(fake.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_success_persists_then_reads_back() {
        let fake = Arc::new(Fake::new(Some("old"), ApiResponse::Success("new".to_string())));
        let mut stream = run(Arc::clone(&fake));

        assert_eq!(next(&mut stream).await, Some(Resource::Loading(None)));
        assert_eq!(next(&mut stream).await, Some(Resource::Loading(Some("old".to_string()))));
        assert_eq!(next(&mut stream).await, Some(Resource::Success("NEW".to_string())));
        assert_eq!(fake.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_response_reads_cache_without_writing() {
        let fake = Arc::new(Fake::new(Some("old"), ApiResponse::Empty));
        let mut stream = run(Arc::clone(&fake));

        assert_eq!(next(&mut stream).await, Some(Resource::Loading(None)));
        assert_eq!(next(&mut stream).await, Some(Resource::Loading(Some("old".to_string()))));
        assert_eq!(next(&mut stream).await, Some(Resource::Success("old".to_string())));
    }

    #[tokio::test]
    async fn test_error_keeps_cached_value_and_ends() {
        let fake = Arc::new(Fake::new(Some("cached"), ApiResponse::Error("HTTP 500".to_string())));
        let mut stream = run(Arc::clone(&fake));

        assert_eq!(next(&mut stream).await, Some(Resource::Loading(None)));
        assert_eq!(next(&mut stream).await, Some(Resource::Loading(Some("cached".to_string()))));
        assert_eq!(
            next(&mut stream).await,
            Some(Resource::error("HTTP 500", Some("cached".to_string())))
        );
        assert_eq!(next(&mut stream).await, None);
        assert_eq!(fake.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_response_with_no_cache() {
        let fake = Arc::new(Fake::new(None, ApiResponse::Empty));
        let mut stream = run(fake);

        assert_eq!(next(&mut stream).await, Some(Resource::Loading(None)));
        assert_eq!(next(&mut stream).await, Some(Resource::Loading(None)));
        assert_eq!(next(&mut stream).await, Some(Resource::error(NO_CACHED_DATA, None)));
    }

    #[tokio::test]
    async fn test_save_failure_is_reported_with_cached_value() {
        let fake = Arc::new(Fake {
            fail_save: true,
            ..Fake::new(Some("old"), ApiResponse::Success("new".to_string()))
        });
        let mut stream = run(fake);

        next(&mut stream).await;
        next(&mut stream).await;
        let terminal = next(&mut stream).await.unwrap();
        assert!(terminal.error_message().unwrap().contains("disk full"));
        assert_eq!(terminal.data(), Some(&"old".to_string()));
    }

    #[tokio::test]
    async fn test_dropping_stream_stops_tracking() {
        let fake = Arc::new(Fake::fresh("cached"));
        let mut stream = run(Arc::clone(&fake));
        next(&mut stream).await;
        next(&mut stream).await;
        drop(stream);

        let released = tokio::time::timeout(Duration::from_secs(5), async {
            while Arc::strong_count(&fake) > 1 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(released.is_ok(), "background task kept running after detach");
    }
}
