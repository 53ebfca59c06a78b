//! Scripted network for strategy tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bloom_core::{AppConfig, CacheDb, Error, Request, ResponseSnapshot};
use url::Url;

use crate::fetch::{FetchMode, Network};

/// In-memory network: fixed responses per URL, 404 for anything else, and an
/// offline switch that makes every attempt fail.
pub(crate) struct ScriptedNetwork {
    responses: Mutex<HashMap<String, ResponseSnapshot>>,
    online: AtomicBool,
    calls: AtomicUsize,
    modes: Mutex<Vec<FetchMode>>,
}

impl ScriptedNetwork {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(HashMap::new()),
            online: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
            modes: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn serve(&self, url: &str, response: ResponseSnapshot) {
        let url = Url::parse(url).unwrap().to_string();
        self.responses.lock().unwrap().insert(url.clone(), response.with_url(url));
    }

    pub(crate) fn serve_text(&self, url: &str, status: u16, body: &str) {
        self.serve(url, ResponseSnapshot::new(status, body.to_string()));
    }

    pub(crate) fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Attempts made so far, successful or not.
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn modes(&self) -> Vec<FetchMode> {
        self.modes.lock().unwrap().clone()
    }
}

#[async_trait]
impl Network for ScriptedNetwork {
    async fn fetch(&self, request: &Request, mode: FetchMode) -> Result<ResponseSnapshot, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.modes.lock().unwrap().push(mode);
        if !self.online.load(Ordering::SeqCst) {
            return Err(Error::Network(format!("{}: offline", request.url)));
        }
        let found = self.responses.lock().unwrap().get(request.url.as_str()).cloned();
        Ok(found.unwrap_or_else(|| ResponseSnapshot::new(404, "not found").with_url(request.url.as_str())))
    }
}

pub(crate) const ORIGIN: &str = "http://localhost:8080";

pub(crate) fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

pub(crate) fn get(path: &str) -> Request {
    Request::get(url(path))
}

/// Config for a small shell: three pre-cached assets, stores at `version`.
pub(crate) fn shell_config(version: u32) -> AppConfig {
    AppConfig {
        origin: ORIGIN.into(),
        cache_names: bloom_core::CacheNames::versioned("kgf", version),
        static_assets: vec!["/".into(), "/index.html".into(), "/styles.css".into()],
        ..Default::default()
    }
}

/// A network serving the shell assets of [`shell_config`].
pub(crate) fn shell_network() -> Arc<ScriptedNetwork> {
    let network = ScriptedNetwork::new();
    network.serve_text(&format!("{ORIGIN}/"), 200, "<html>home</html>");
    network.serve_text(&format!("{ORIGIN}/index.html"), 200, "<html>index</html>");
    network.serve_text(&format!("{ORIGIN}/styles.css"), 200, "body { color: plum; }");
    network
}

pub(crate) async fn memory_db() -> CacheDb {
    CacheDb::open_in_memory().await.unwrap()
}
