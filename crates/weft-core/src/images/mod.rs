//! Placeholder resolver: asynchronous image resolution, decoupled from
//! block ordering.
//!
//! Documents carry `ImagePlaceholder` blocks that reference resources by
//! id; the resolver owns the resolution state and sinks re-query it. The
//! transformer registers resources and never waits on them; resolution
//! runs fire-and-forget. Finalization only reads the live pending count
//! (after yielding so already-scheduled callbacks run).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::future::BoxFuture;
use tokio::sync::Notify;
use weft_types::image::ImageState;

/// Fetches the display URL for an image resource id.
///
/// Returned futures are spawned fire-and-forget; failures are recorded as
/// `ImageState::Failed` and never raised.
pub trait ImageFetcher: Send + Sync + 'static {
    fn fetch(&self, id: &str) -> BoxFuture<'static, anyhow::Result<String>>;
}

/// Shared registry of image resources for one turn.
///
/// Cheap to clone; all clones share state.
#[derive(Clone, Default)]
pub struct ImageResolver {
    inner: Arc<ResolverInner>,
}

#[derive(Default)]
struct ResolverInner {
    states: Mutex<HashMap<String, ImageState>>,
    pending: AtomicUsize,
    idle: Notify,
    fetcher: Option<Arc<dyn ImageFetcher>>,
}

impl ImageResolver {
    /// Creates a resolver with no fetcher attached; registered resources
    /// stay `Pending` and do not count toward the pending total.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a resolver that resolves registrations through `fetcher`.
    ///
    /// Registration spawns the fetch, so a tokio runtime must be current.
    pub fn with_fetcher(fetcher: impl ImageFetcher) -> Self {
        Self {
            inner: Arc::new(ResolverInner {
                states: Mutex::new(HashMap::new()),
                pending: AtomicUsize::new(0),
                idle: Notify::new(),
                fetcher: Some(Arc::new(fetcher)),
            }),
        }
    }

    /// Registers a resource as pending and launches its resolution.
    /// Idempotent: re-registering a known id does nothing.
    pub fn register(&self, id: &str) {
        {
            let mut states = self
                .inner
                .states
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if states.contains_key(id) {
                return;
            }
            states.insert(id.to_string(), ImageState::Pending);
        }

        let Some(fetcher) = self.inner.fetcher.clone() else {
            return;
        };

        self.inner.pending.fetch_add(1, Ordering::SeqCst);
        let resolver = self.clone();
        let id = id.to_string();
        let fut = fetcher.fetch(&id);
        tokio::spawn(async move {
            match fut.await {
                Ok(url) => resolver.complete(&id, ImageState::Resolved { url }),
                Err(err) => {
                    tracing::debug!(id = %id, error = %err, "image resolution failed");
                    resolver.complete(&id, ImageState::Failed);
                }
            }
        });
    }

    fn complete(&self, id: &str, state: ImageState) {
        {
            let mut states = self
                .inner
                .states
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            states.insert(id.to_string(), state);
        }
        if self.inner.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.idle.notify_waiters();
        }
    }

    /// Current resolution state for a resource, if registered.
    pub fn get(&self, id: &str) -> Option<ImageState> {
        self.inner
            .states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Number of resolutions still in flight.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.load(Ordering::SeqCst)
    }

    /// Waits until no resolutions are in flight. Callers bound this with
    /// a timeout; the settle window is advisory.
    pub async fn wait_idle(&self) {
        loop {
            if self.pending_count() == 0 {
                return;
            }
            self.inner.idle.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::FutureExt;

    use super::*;

    struct StaticFetcher;

    impl ImageFetcher for StaticFetcher {
        fn fetch(&self, id: &str) -> BoxFuture<'static, anyhow::Result<String>> {
            let id = id.to_string();
            async move {
                if id.starts_with("bad") {
                    anyhow::bail!("resource {id} not found");
                }
                Ok(format!("https://img.example/{id}"))
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_register_resolves_through_fetcher() {
        let resolver = ImageResolver::with_fetcher(StaticFetcher);
        resolver.register("pic-1");

        tokio::time::timeout(Duration::from_secs(1), resolver.wait_idle())
            .await
            .expect("resolution should drain");

        assert_eq!(
            resolver.get("pic-1"),
            Some(ImageState::Resolved {
                url: "https://img.example/pic-1".to_string()
            })
        );
        assert_eq!(resolver.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_resolution_is_recorded_not_raised() {
        let resolver = ImageResolver::with_fetcher(StaticFetcher);
        resolver.register("bad-2");

        tokio::time::timeout(Duration::from_secs(1), resolver.wait_idle())
            .await
            .expect("resolution should drain");

        assert_eq!(resolver.get("bad-2"), Some(ImageState::Failed));
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let resolver = ImageResolver::with_fetcher(StaticFetcher);
        resolver.register("pic-1");
        resolver.register("pic-1");
        resolver.register("pic-1");

        tokio::time::timeout(Duration::from_secs(1), resolver.wait_idle())
            .await
            .expect("resolution should drain");
        assert_eq!(resolver.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_without_fetcher_resources_stay_pending() {
        let resolver = ImageResolver::new();
        resolver.register("pic-1");

        assert_eq!(resolver.get("pic-1"), Some(ImageState::Pending));
        // Nothing in flight, so finalization never waits on it.
        assert_eq!(resolver.pending_count(), 0);
    }
}
