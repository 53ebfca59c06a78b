//! Fetch interception strategies.
//!
//! Each intercepted request runs one sequential pipeline:
//! classify, try the primary source, try the fallback, return a [`FetchOutcome`].
//!
//! - **Network-first** (API, script, document): network, then exact cache
//!   match, then a class-specific last resort (synthetic 503 for API, root
//!   document for documents, nothing for scripts).
//! - **Cache-first** (static assets): cache, then network.
//!
//! Cache writes never sit on the response path. They are spawned onto
//! [`BackgroundWrites`] and their failures are logged and dropped.

use std::future::Future;
use std::sync::Arc;

use bloom_core::{AppConfig, CacheDb, CacheNames, Error, Request, ResponseSnapshot};
use tokio_util::task::TaskTracker;

use crate::classify::{RequestClass, classify};
use crate::fetch::{FetchMode, Network};

/// How an intercepted request was answered.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Fresh response from the network.
    Network(ResponseSnapshot),
    /// Exact match from the cache.
    CacheHit(ResponseSnapshot),
    /// Root document served in place of an uncached navigation.
    Fallback(ResponseSnapshot),
    /// Response made up by the interceptor (offline API call).
    Synthetic(ResponseSnapshot),
    /// Nothing to serve; the page sees a failed fetch.
    Failed(Error),
    /// Not intercepted (non-GET, or no active worker).
    Passthrough,
}

impl FetchOutcome {
    pub fn response(&self) -> Option<&ResponseSnapshot> {
        match self {
            FetchOutcome::Network(r)
            | FetchOutcome::CacheHit(r)
            | FetchOutcome::Fallback(r)
            | FetchOutcome::Synthetic(r) => Some(r),
            FetchOutcome::Failed(_) | FetchOutcome::Passthrough => None,
        }
    }

    /// Short label for logs and the wire protocol.
    pub fn source(&self) -> &'static str {
        match self {
            FetchOutcome::Network(_) => "network",
            FetchOutcome::CacheHit(_) => "cache",
            FetchOutcome::Fallback(_) => "fallback",
            FetchOutcome::Synthetic(_) => "synthetic",
            FetchOutcome::Failed(_) => "failed",
            FetchOutcome::Passthrough => "passthrough",
        }
    }
}

/// Body of the response served for an API call with no network and no cache.
pub fn offline_response() -> ResponseSnapshot {
    ResponseSnapshot::json(
        503,
        &serde_json::json!({
            "error": "Offline",
            "message": "No network connection",
        }),
    )
}

/// Detached cache writes.
///
/// Cloning shares the same set of tasks.
#[derive(Clone, Debug)]
pub struct BackgroundWrites {
    tracker: TaskTracker,
}

impl Default for BackgroundWrites {
    fn default() -> Self {
        Self { tracker: TaskTracker::new() }
    }
}

impl BackgroundWrites {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(task);
    }

    /// Writes spawned but not yet finished.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every write spawned so far has finished.
    pub async fn settle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

/// Serves intercepted requests for one worker version.
pub struct Interceptor {
    cache: CacheDb,
    network: Arc<dyn Network>,
    api_domain: String,
    names: CacheNames,
    root_document: Request,
    writes: BackgroundWrites,
}

impl Interceptor {
    /// Build an interceptor whose cache writes are tracked by `writes`.
    pub fn new(
        cache: CacheDb, network: Arc<dyn Network>, config: &AppConfig, writes: BackgroundWrites,
    ) -> Result<Self, Error> {
        let root_document = config
            .root_document_url()
            .map_err(|e| Error::InvalidInput(e.to_string()))?;
        Ok(Self {
            cache,
            network,
            api_domain: config.api_domain.clone(),
            names: config.cache_names.clone(),
            root_document: Request::get(root_document),
            writes,
        })
    }

    pub fn writes(&self) -> &BackgroundWrites {
        &self.writes
    }

    /// Answer one intercepted request.
    pub async fn handle(&self, request: &Request) -> FetchOutcome {
        if !request.is_get() {
            tracing::debug!(method = %request.method, url = %request.url, "not intercepting");
            return FetchOutcome::Passthrough;
        }

        let class = classify(request, &self.api_domain);
        let outcome = if class.is_network_first() {
            self.network_first(request, class).await
        } else {
            self.cache_first(request).await
        };

        tracing::debug!(url = %request.url, ?class, source = outcome.source(), "fetch handled");
        outcome
    }

    /// Store that successful responses of `class` are written to.
    pub fn store_for(&self, class: RequestClass) -> &str {
        match class {
            RequestClass::Api => &self.names.offline_data,
            RequestClass::Script | RequestClass::Static => &self.names.static_assets,
            RequestClass::Document => &self.names.html,
        }
    }

    /// Network first, falling back to the cache.
    pub async fn network_first(&self, request: &Request, class: RequestClass) -> FetchOutcome {
        let err = match self.network.fetch(request, FetchMode::Default).await {
            Ok(response) => {
                self.store_detached(self.store_for(class), request, response.clone());
                return FetchOutcome::Network(response);
            }
            Err(err) => err,
        };

        tracing::warn!(url = %request.url, error = %err, "network failed, trying cache");

        if let Some(cached) = self.lookup(request).await {
            return FetchOutcome::CacheHit(cached);
        }

        match class {
            RequestClass::Api => FetchOutcome::Synthetic(offline_response()),
            RequestClass::Document => self.root_fallback(err).await,
            RequestClass::Script | RequestClass::Static => FetchOutcome::Failed(err),
        }
    }

    /// Cache first, falling back to the network.
    pub async fn cache_first(&self, request: &Request) -> FetchOutcome {
        if let Some(cached) = self.lookup(request).await {
            return FetchOutcome::CacheHit(cached);
        }

        match self.network.fetch(request, FetchMode::Default).await {
            Ok(response) => {
                if response.status == 200 {
                    self.store_detached(&self.names.static_assets, request, response.clone());
                }
                FetchOutcome::Network(response)
            }
            Err(err) if request.is_navigation() => self.root_fallback(err).await,
            Err(err) => {
                tracing::warn!(url = %request.url, error = %err, "static asset unavailable");
                FetchOutcome::Failed(err)
            }
        }
    }

    async fn root_fallback(&self, err: Error) -> FetchOutcome {
        match self.lookup(&self.root_document).await {
            Some(root) => FetchOutcome::Fallback(root),
            None => FetchOutcome::Failed(err),
        }
    }

    /// Cross-store lookup; storage errors count as a miss.
    async fn lookup(&self, request: &Request) -> Option<ResponseSnapshot> {
        match self.cache.match_request(request).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "cache lookup failed");
                None
            }
        }
    }

    fn store_detached(&self, store: &str, request: &Request, response: ResponseSnapshot) {
        let cache = self.cache.clone();
        let store = store.to_string();
        let request = request.clone();
        self.writes.spawn(async move {
            let result = match cache.open_store(&store).await {
                Ok(handle) => handle.put(&request, &response).await,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                tracing::warn!(store = %store, url = %request.url, error = %e, "cache write dropped");
            }
        });
    }
}
