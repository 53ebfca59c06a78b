//! Worker lifecycle: install, wait, activate, take over.
//!
//! A [`ServiceWorker`] is one version of the offline cache manager, defined by
//! its configuration (store names, static manifest). A [`Registration`] owns
//! at most one active and one waiting worker and moves workers through
//!
//! ```text
//! installing -> installed (waiting) -> activating -> activated -> redundant
//! ```
//!
//! Install pre-populates the static store. Activation deletes every store the
//! new version does not retain and claims all open clients. A waiting worker
//! is promoted when it asked to skip waiting, when there is no active worker,
//! or when the last client of the active worker closes.

use std::sync::Arc;

use bloom_core::{AppConfig, CacheDb, CacheNames, Error, Request};
use futures_util::future::try_join_all;
use serde::Serialize;

use crate::fetch::{FetchMode, Network};
use crate::intercept::{BackgroundWrites, FetchOutcome, Interceptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Installing,
    Installed,
    Activating,
    Activated,
    Redundant,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Installing => write!(f, "installing"),
            WorkerState::Installed => write!(f, "installed"),
            WorkerState::Activating => write!(f, "activating"),
            WorkerState::Activated => write!(f, "activated"),
            WorkerState::Redundant => write!(f, "redundant"),
        }
    }
}

/// Result of an install.
///
/// Pre-population is best effort: `error` is set when it failed, but the
/// worker is installed either way.
#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    pub worker: u64,
    pub precached: usize,
    pub error: Option<String>,
    /// State once the registration has settled (installed or activated).
    pub state: WorkerState,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivateReport {
    pub worker: u64,
    /// Stores deleted because the new version does not retain them.
    pub deleted: Vec<String>,
    /// Clients now controlled by the worker.
    pub claimed: usize,
}

/// One version of the offline cache manager.
pub struct ServiceWorker {
    id: u64,
    config: AppConfig,
    cache: CacheDb,
    network: Arc<dyn Network>,
    state: WorkerState,
    skip_waiting: bool,
    interceptor: Interceptor,
}

impl ServiceWorker {
    pub fn new(
        id: u64, config: AppConfig, cache: CacheDb, network: Arc<dyn Network>, writes: BackgroundWrites,
    ) -> Result<Self, Error> {
        let interceptor = Interceptor::new(cache.clone(), network.clone(), &config, writes)?;
        Ok(Self { id, config, cache, network, state: WorkerState::Installing, skip_waiting: false, interceptor })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn interceptor(&self) -> &Interceptor {
        &self.interceptor
    }

    /// Run the install phase to completion.
    pub async fn install(&mut self) -> InstallReport {
        self.state = WorkerState::Installing;
        tracing::info!(worker = self.id, store = %self.config.cache_names.static_assets, "installing");

        let (precached, error) = match self.precache().await {
            Ok(count) => {
                tracing::info!(worker = self.id, count, "static assets cached");
                (count, None)
            }
            Err(e) => {
                tracing::error!(worker = self.id, error = %e, "static asset caching failed");
                (0, Some(e.to_string()))
            }
        };

        self.state = WorkerState::Installed;
        if self.config.skip_waiting_on_install {
            self.skip_waiting();
        }

        InstallReport { worker: self.id, precached, error, state: self.state }
    }

    /// Fetch every static asset, bypassing HTTP caches, and store them all
    /// or none.
    pub async fn precache(&self) -> Result<usize, Error> {
        let urls = self
            .config
            .static_asset_urls()
            .map_err(|e| Error::InvalidInput(e.to_string()))?;
        let store = self.cache.open_store(&self.config.cache_names.static_assets).await?;

        let fetches = urls.into_iter().map(|url| async move {
            let request = Request::get(url);
            let response = self.network.fetch(&request, FetchMode::Reload).await?;
            if !response.ok() {
                return Err(Error::HttpError(format!("{} returned {}", request.url, response.status)));
            }
            Ok((request, response))
        });
        let entries = try_join_all(fetches).await?;

        let count = entries.len();
        store.put_all(entries).await?;
        Ok(count)
    }

    /// Run the activate phase to completion: purge stores of other versions.
    pub async fn activate(&mut self) -> Vec<String> {
        self.state = WorkerState::Activating;
        tracing::info!(worker = self.id, "activating");

        let deleted = match self.cache.retain_stores(&self.config.cache_names.retained()).await {
            Ok(deleted) => deleted,
            Err(e) => {
                tracing::error!(worker = self.id, error = %e, "stale cache cleanup failed");
                Vec::new()
            }
        };

        self.state = WorkerState::Activated;
        deleted
    }

    /// Ask to be activated without waiting for the current worker's clients.
    pub fn skip_waiting(&mut self) {
        self.skip_waiting = true;
    }

    pub fn wants_to_skip_waiting(&self) -> bool {
        self.skip_waiting
    }

    /// Intercept `request`; only an activated worker intercepts.
    pub async fn handle_fetch(&self, request: &Request) -> FetchOutcome {
        if self.state != WorkerState::Activated {
            return FetchOutcome::Passthrough;
        }
        self.interceptor.handle(request).await
    }

    fn info(&self) -> WorkerInfo {
        WorkerInfo { id: self.id, state: self.state, cache_names: self.config.cache_names.clone() }
    }
}

/// A page of the application shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Client {
    pub id: u64,
    /// Worker currently intercepting this page's fetches.
    pub controller: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerInfo {
    pub id: u64,
    pub state: WorkerState,
    pub cache_names: CacheNames,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistrationStatus {
    pub active: Option<WorkerInfo>,
    pub waiting: Option<WorkerInfo>,
    pub clients: usize,
    pub controlled: usize,
}

/// Owns the active and waiting workers and the open clients.
///
/// Every worker's cache writes go to one shared [`BackgroundWrites`], so a
/// write started by a worker that has since been replaced can still be
/// awaited.
pub struct Registration {
    cache: CacheDb,
    network: Arc<dyn Network>,
    config: AppConfig,
    writes: BackgroundWrites,
    next_worker: u64,
    next_client: u64,
    active: Option<Arc<ServiceWorker>>,
    waiting: Option<ServiceWorker>,
    clients: Vec<Client>,
}

impl Registration {
    pub fn new(config: AppConfig, cache: CacheDb, network: Arc<dyn Network>) -> Self {
        Self {
            cache,
            network,
            config,
            writes: BackgroundWrites::new(),
            next_worker: 0,
            next_client: 0,
            active: None,
            waiting: None,
            clients: Vec::new(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Cache writes started by any worker of this registration.
    pub fn writes(&self) -> &BackgroundWrites {
        &self.writes
    }

    /// The active worker, shared so fetches can run concurrently.
    pub fn controller(&self) -> Option<Arc<ServiceWorker>> {
        self.active.clone()
    }

    pub fn waiting(&self) -> Option<&ServiceWorker> {
        self.waiting.as_ref()
    }

    pub fn clients(&self) -> &[Client] {
        &self.clients
    }

    /// Install a worker for the current configuration.
    ///
    /// The new worker replaces any worker already waiting. It is activated
    /// right away if there is no active worker or if it asked to skip waiting.
    pub async fn install(&mut self) -> Result<InstallReport, Error> {
        self.next_worker += 1;
        let mut worker = ServiceWorker::new(
            self.next_worker,
            self.config.clone(),
            self.cache.clone(),
            self.network.clone(),
            self.writes.clone(),
        )?;
        let mut report = worker.install().await;

        let promote = self.active.is_none() || worker.wants_to_skip_waiting();
        if let Some(old) = self.waiting.replace(worker) {
            tracing::info!(worker = old.id(), "waiting worker replaced");
        }
        if promote {
            self.promote().await;
        }

        if self.active.as_ref().is_some_and(|w| w.id() == report.worker) {
            report.state = WorkerState::Activated;
        }
        Ok(report)
    }

    /// Install a worker for a new configuration (a version bump).
    pub async fn update(&mut self, config: AppConfig) -> Result<InstallReport, Error> {
        config.validate().map_err(|e| Error::InvalidInput(e.to_string()))?;
        self.config = config;
        self.install().await
    }

    /// Promote the waiting worker on demand.
    ///
    /// Returns `None` when nothing is waiting.
    pub async fn skip_waiting(&mut self) -> Option<ActivateReport> {
        self.waiting.as_mut()?.skip_waiting();
        self.promote().await
    }

    /// Activate the waiting worker, if any.
    pub async fn activate(&mut self) -> Option<ActivateReport> {
        self.promote().await
    }

    async fn promote(&mut self) -> Option<ActivateReport> {
        let mut worker = self.waiting.take()?;
        let deleted = worker.activate().await;
        let worker = Arc::new(worker);
        let id = worker.id();

        if let Some(old) = self.active.replace(worker) {
            tracing::info!(worker = old.id(), state = %WorkerState::Redundant, "replaced by worker {}", id);
        }

        for client in &mut self.clients {
            client.controller = Some(id);
        }
        let claimed = self.clients.len();
        tracing::info!(worker = id, claimed, deleted = deleted.len(), "activated");

        Some(ActivateReport { worker: id, deleted, claimed })
    }

    /// Open a page. It is controlled by the active worker, if any.
    pub fn open_client(&mut self) -> u64 {
        self.next_client += 1;
        let controller = self.active.as_ref().map(|w| w.id());
        self.clients.push(Client { id: self.next_client, controller });
        self.next_client
    }

    /// Close a page. Closing the last page of the active worker lets a
    /// waiting worker take over.
    pub async fn close_client(&mut self, id: u64) -> Option<ActivateReport> {
        self.clients.retain(|c| c.id != id);

        let active = self.active.as_ref().map(|w| w.id());
        let still_controlled = self.clients.iter().any(|c| c.controller.is_some() && c.controller == active);
        if self.waiting.is_some() && !still_controlled {
            return self.promote().await;
        }
        None
    }

    /// Route a fetch to the active worker.
    pub async fn fetch(&self, request: &Request) -> FetchOutcome {
        match &self.active {
            Some(worker) => worker.handle_fetch(request).await,
            None => FetchOutcome::Passthrough,
        }
    }

    pub fn status(&self) -> RegistrationStatus {
        RegistrationStatus {
            active: self.active.as_ref().map(|w| w.info()),
            waiting: self.waiting.as_ref().map(|w| w.info()),
            clients: self.clients.len(),
            controlled: self.clients.iter().filter(|c| c.controller.is_some()).count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ORIGIN, get, memory_db, shell_config, shell_network, url};

    #[tokio::test]
    async fn test_fresh_install_precaches_manifest() {
        let db = memory_db().await;
        let mut registration = Registration::new(shell_config(1), db.clone(), shell_network());

        let report = registration.install().await.unwrap();
        assert_eq!(report.precached, 3);
        assert!(report.error.is_none());
        assert_eq!(report.state, WorkerState::Activated);

        let css = db.match_in("kgf-static-v1", &get("/styles.css")).await.unwrap().unwrap();
        assert_eq!(css.status, 200);
    }

    #[tokio::test]
    async fn test_precache_bypasses_http_cache() {
        let network = shell_network();
        let mut registration = Registration::new(shell_config(1), memory_db().await, network.clone());

        registration.install().await.unwrap();
        assert_eq!(network.modes(), vec![FetchMode::Reload; 3]);
    }

    #[tokio::test]
    async fn test_install_twice_is_idempotent() {
        let db = memory_db().await;
        let mut registration = Registration::new(shell_config(1), db.clone(), shell_network());
        let static_store = db.open_store("kgf-static-v1").await.unwrap();

        registration.install().await.unwrap();
        let once = static_store.keys().await.unwrap();
        registration.install().await.unwrap();
        let twice = static_store.keys().await.unwrap();

        assert_eq!(once.len(), 3);
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn test_precache_failure_does_not_abort_install() {
        let network = shell_network();
        network.serve_text(&format!("{ORIGIN}/styles.css"), 500, "oops");
        let db = memory_db().await;
        let mut registration = Registration::new(shell_config(1), db.clone(), network);

        let report = registration.install().await.unwrap();
        assert_eq!(report.precached, 0);
        assert!(report.error.unwrap().contains("HTTP_ERROR"));
        assert_eq!(report.state, WorkerState::Activated);

        // all or nothing
        assert!(db.match_request(&get("/index.html")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_version_bump_purges_old_stores() {
        let network = shell_network();
        let db = memory_db().await;
        let mut registration = Registration::new(shell_config(1), db.clone(), network.clone());
        registration.install().await.unwrap();
        assert!(db.match_in("kgf-static-v1", &get("/styles.css")).await.unwrap().is_some());

        network.set_online(false);
        let report = registration.update(shell_config(2)).await.unwrap();
        assert_eq!(report.state, WorkerState::Activated);
        assert!(report.error.is_some());

        let old = db.match_in("kgf-static-v1", &get("/styles.css")).await;
        assert!(matches!(old, Err(Error::StoreNotFound(_))));
        assert!(db.match_in("kgf-static-v2", &get("/styles.css")).await.unwrap().is_none());

        network.set_online(true);
        let worker = registration.controller().unwrap();
        assert_eq!(registration.fetch(&get("/styles.css")).await.source(), "network");
        worker.interceptor().writes().settle().await;
        assert!(db.match_in("kgf-static-v2", &get("/styles.css")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_activate_keeps_only_retained_stores() {
        let db = memory_db().await;
        for name in ["kgf-static-v0", "kgf-offline-v1", "unrelated"] {
            db.open_store(name).await.unwrap();
        }
        let mut registration = Registration::new(shell_config(1), db.clone(), shell_network());

        registration.install().await.unwrap();

        let mut keys = db.keys().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["kgf-offline-v1", "kgf-static-v1"]);
    }

    #[tokio::test]
    async fn test_update_waits_without_skip_waiting() {
        let db = memory_db().await;
        let mut registration = Registration::new(shell_config(1), db.clone(), shell_network());
        registration.install().await.unwrap();
        let page = registration.open_client();

        let config = AppConfig { skip_waiting_on_install: false, ..shell_config(2) };
        let report = registration.update(config).await.unwrap();
        assert_eq!(report.state, WorkerState::Installed);
        assert_eq!(registration.controller().unwrap().id(), 1);
        assert_eq!(registration.waiting().unwrap().state(), WorkerState::Installed);
        assert!(db.has_store("kgf-static-v1").await.unwrap());

        let activated = registration.skip_waiting().await.unwrap();
        assert_eq!(activated.worker, 2);
        assert_eq!(activated.claimed, 1);
        assert!(activated.deleted.contains(&"kgf-static-v1".to_string()));
        assert!(registration.waiting().is_none());
        assert_eq!(registration.clients(), &[Client { id: page, controller: Some(2) }]);
    }

    #[tokio::test]
    async fn test_skip_waiting_with_nothing_waiting() {
        let mut registration = Registration::new(shell_config(1), memory_db().await, shell_network());
        assert!(registration.skip_waiting().await.is_none());
        registration.install().await.unwrap();
        assert!(registration.skip_waiting().await.is_none());
    }

    #[tokio::test]
    async fn test_closing_last_client_promotes_waiting() {
        let mut registration = Registration::new(shell_config(1), memory_db().await, shell_network());
        registration.install().await.unwrap();
        let first = registration.open_client();
        let second = registration.open_client();

        let config = AppConfig { skip_waiting_on_install: false, ..shell_config(2) };
        registration.update(config).await.unwrap();

        assert!(registration.close_client(first).await.is_none());
        let activated = registration.close_client(second).await.unwrap();
        assert_eq!(activated.worker, 2);
        assert_eq!(activated.claimed, 0);
    }

    #[tokio::test]
    async fn test_activation_claims_uncontrolled_clients() {
        let mut registration = Registration::new(shell_config(1), memory_db().await, shell_network());
        let page = registration.open_client();
        assert_eq!(registration.clients()[0].controller, None);

        registration.install().await.unwrap();
        assert_eq!(registration.clients(), &[Client { id: page, controller: Some(1) }]);

        let status = registration.status();
        assert_eq!(status.clients, 1);
        assert_eq!(status.controlled, 1);
        assert_eq!(status.active.unwrap().state, WorkerState::Activated);
    }

    #[tokio::test]
    async fn test_no_active_worker_passes_through() {
        let network = shell_network();
        let registration = Registration::new(shell_config(1), memory_db().await, network.clone());

        let outcome = registration.fetch(&get("/styles.css")).await;
        assert!(matches!(outcome, FetchOutcome::Passthrough));
        assert_eq!(network.calls(), 0);
    }

    #[tokio::test]
    async fn test_installed_worker_does_not_intercept() {
        let writes = BackgroundWrites::new();
        let mut worker = ServiceWorker::new(7, shell_config(1), memory_db().await, shell_network(), writes).unwrap();
        worker.install().await;
        assert_eq!(worker.state(), WorkerState::Installed);
        assert!(worker.wants_to_skip_waiting());
        assert!(matches!(worker.handle_fetch(&get("/styles.css")).await, FetchOutcome::Passthrough));
    }

    #[tokio::test]
    async fn test_replaced_worker_writes_stay_tracked() {
        let db = memory_db().await;
        let mut registration = Registration::new(shell_config(1), db.clone(), shell_network());
        registration.install().await.unwrap();
        let old = registration.controller().unwrap();

        let home = Request::navigate(url("/"));
        assert_eq!(old.handle_fetch(&home).await.source(), "network");
        assert_eq!(registration.writes().pending(), 1);

        registration.install().await.unwrap();
        assert_eq!(registration.controller().unwrap().id(), 2);

        registration.writes().settle().await;
        assert_eq!(registration.writes().pending(), 0);
        assert!(db.match_in("kgf-html-v1", &home).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_update_rejects_invalid_config() {
        let mut registration = Registration::new(shell_config(1), memory_db().await, shell_network());
        let config = AppConfig { origin: "nope".into(), ..shell_config(2) };
        assert!(matches!(registration.update(config).await, Err(Error::InvalidInput(_))));
    }
}
