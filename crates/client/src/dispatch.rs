//! Lifecycle and fetch events delivered to a [`Registration`].

use bloom_core::{AppConfig, Error, Request};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::intercept::FetchOutcome;
use crate::lifecycle::{ActivateReport, InstallReport, Registration, RegistrationStatus};

/// An event for the registration, tagged by `event`.
///
/// ```json
/// {"event":"fetch","request":{"url":"http://localhost:8080/styles.css"}}
/// {"event":"message","data":{"type":"SKIP_WAITING"}}
/// {"event":"update","config":{"skip_waiting_on_install":false}}
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    Install,
    /// Install a worker for a new configuration. Without a payload the
    /// configuration is reloaded from its sources; fields missing from a
    /// payload take their defaults.
    Update {
        #[serde(default)]
        config: Option<Box<AppConfig>>,
    },
    Activate,
    Fetch { request: Request },
    Message { data: Value },
    OpenClient,
    CloseClient { client: u64 },
    Status,
}

/// A page-to-worker message. `SKIP_WAITING` is the only one recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    SkipWaiting,
}

impl ControlMessage {
    /// Parse a message payload; anything unrecognised is `None`.
    pub fn parse(data: &Value) -> Option<Self> {
        serde_json::from_value(data.clone()).ok()
    }
}

#[derive(Debug)]
pub enum EventOutcome {
    Installed(InstallReport),
    Updated(InstallReport),
    /// `None` when there was nothing to activate.
    Activated(Option<ActivateReport>),
    Fetched(FetchOutcome),
    /// Message was not recognised and was ignored.
    Ignored,
    ClientOpened(u64),
    ClientClosed(Option<ActivateReport>),
    Status(RegistrationStatus),
}

impl Registration {
    /// Deliver one event and wait for it to complete.
    pub async fn dispatch(&mut self, event: Event) -> Result<EventOutcome, Error> {
        let outcome = match event {
            Event::Install => EventOutcome::Installed(self.install().await?),
            Event::Update { config } => {
                let config = match config {
                    Some(config) => *config,
                    None => AppConfig::load().map_err(|e| Error::InvalidInput(e.to_string()))?,
                };
                EventOutcome::Updated(self.update(config).await?)
            }
            Event::Activate => EventOutcome::Activated(self.activate().await),
            Event::Fetch { request } => EventOutcome::Fetched(self.fetch(&request).await),
            Event::Message { data } => match ControlMessage::parse(&data) {
                Some(ControlMessage::SkipWaiting) => EventOutcome::Activated(self.skip_waiting().await),
                None => {
                    tracing::debug!(%data, "ignoring message");
                    EventOutcome::Ignored
                }
            },
            Event::OpenClient => EventOutcome::ClientOpened(self.open_client()),
            Event::CloseClient { client } => EventOutcome::ClientClosed(self.close_client(client).await),
            Event::Status => EventOutcome::Status(self.status()),
        };
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ORIGIN, get, memory_db, shell_config, shell_network, url};
    use bloom_core::RequestMode;
    use serde_json::json;

    fn parse(line: &str) -> Event {
        serde_json::from_str(line).unwrap()
    }

    #[test]
    fn test_parse_events() {
        assert_eq!(parse(r#"{"event":"install"}"#), Event::Install);
        assert_eq!(parse(r#"{"event":"close_client","client":3}"#), Event::CloseClient { client: 3 });

        let Event::Fetch { request } =
            parse(r#"{"event":"fetch","request":{"url":"http://localhost:8080/a.html","mode":"navigate"}}"#)
        else {
            panic!("expected fetch");
        };
        assert_eq!(request.method, "GET");
        assert_eq!(request.mode, RequestMode::Navigate);
    }

    #[test]
    fn test_parse_update() {
        assert_eq!(parse(r#"{"event":"update"}"#), Event::Update { config: None });

        let line = concat!(
            r#"{"event":"update","config":{"skip_waiting_on_install":false,"#,
            r#""cache_names":{"static_assets":"a","offline_data":"b","html":"c"}}}"#,
        );
        let Event::Update { config: Some(config) } = parse(line) else {
            panic!("expected update with config");
        };
        assert!(!config.skip_waiting_on_install);
        assert_eq!(config.cache_names.html, "c");
        assert_eq!(config.root_document, "/index.html");
    }

    #[tokio::test]
    async fn test_update_event_waits_then_skip_waiting() {
        let db = memory_db().await;
        let mut registration = Registration::new(shell_config(1), db.clone(), shell_network());
        registration.dispatch(Event::Install).await.unwrap();

        let config = AppConfig { skip_waiting_on_install: false, ..shell_config(2) };
        let outcome = registration.dispatch(Event::Update { config: Some(Box::new(config)) }).await.unwrap();
        let EventOutcome::Updated(report) = outcome else {
            panic!("expected update report");
        };
        assert_eq!(report.worker, 2);
        assert_eq!(report.state, crate::WorkerState::Installed);
        assert_eq!(registration.config().cache_names.static_assets, "kgf-static-v2");
        assert!(db.has_store("kgf-static-v1").await.unwrap());

        let skip = Event::Message { data: json!({"type": "SKIP_WAITING"}) };
        assert!(matches!(registration.dispatch(skip).await.unwrap(), EventOutcome::Activated(Some(_))));
        assert_eq!(registration.controller().unwrap().id(), 2);
        assert!(!db.has_store("kgf-static-v1").await.unwrap());
    }

    #[tokio::test]
    async fn test_update_event_rejects_invalid_config() {
        let mut registration = Registration::new(shell_config(1), memory_db().await, shell_network());
        let config = AppConfig { api_domain: String::new(), ..shell_config(2) };
        let result = registration.dispatch(Event::Update { config: Some(Box::new(config)) }).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_unknown_event_is_rejected() {
        assert!(serde_json::from_str::<Event>(r#"{"event":"sync"}"#).is_err());
    }

    #[test]
    fn test_control_message() {
        assert_eq!(ControlMessage::parse(&json!({"type": "SKIP_WAITING"})), Some(ControlMessage::SkipWaiting));
        assert_eq!(ControlMessage::parse(&json!({"type": "skip_waiting"})), None);
        assert_eq!(ControlMessage::parse(&json!("SKIP_WAITING")), None);
        assert_eq!(ControlMessage::parse(&json!({"type": "CLEAR_CACHE"})), None);
    }

    #[tokio::test]
    async fn test_skip_waiting_message_activates_waiting_worker() {
        let db = memory_db().await;
        let mut registration = Registration::new(shell_config(1), db.clone(), shell_network());
        registration.dispatch(Event::Install).await.unwrap();

        let config = AppConfig { skip_waiting_on_install: false, ..shell_config(2) };
        registration.update(config).await.unwrap();
        assert!(registration.waiting().is_some());

        let outcome = registration
            .dispatch(Event::Message { data: json!({"type": "SKIP_WAITING"}) })
            .await
            .unwrap();
        let EventOutcome::Activated(Some(report)) = outcome else {
            panic!("expected activation");
        };
        assert_eq!(report.worker, 2);
        assert!(!db.has_store("kgf-static-v1").await.unwrap());
    }

    #[tokio::test]
    async fn test_unrecognised_message_is_ignored() {
        let mut registration = Registration::new(shell_config(1), memory_db().await, shell_network());
        let outcome = registration
            .dispatch(Event::Message { data: json!({"type": "PING"}) })
            .await
            .unwrap();
        assert!(matches!(outcome, EventOutcome::Ignored));
    }

    #[tokio::test]
    async fn test_offline_navigation_gets_cached_root() {
        let network = shell_network();
        let mut registration = Registration::new(shell_config(1), memory_db().await, network.clone());
        registration.dispatch(Event::Install).await.unwrap();
        network.set_online(false);

        let request = Request::navigate(url("/never-visited.html"));
        let outcome = registration.dispatch(Event::Fetch { request }).await.unwrap();
        let EventOutcome::Fetched(outcome) = outcome else {
            panic!("expected fetch outcome");
        };
        assert_eq!(outcome.source(), "fallback");
        let response = outcome.response().unwrap();
        assert_eq!(response.url, format!("{ORIGIN}/index.html"));
        assert_eq!(response.body.as_ref(), b"<html>index</html>");
    }

    #[tokio::test]
    async fn test_offline_static_asset_served_from_precache() {
        let network = shell_network();
        let mut registration = Registration::new(shell_config(1), memory_db().await, network.clone());
        registration.dispatch(Event::Install).await.unwrap();
        network.set_online(false);
        let before = network.calls();

        let outcome = registration.dispatch(Event::Fetch { request: get("/styles.css") }).await.unwrap();
        let EventOutcome::Fetched(outcome) = outcome else {
            panic!("expected fetch outcome");
        };
        assert_eq!(outcome.source(), "cache");
        assert_eq!(network.calls(), before);
    }

    #[tokio::test]
    async fn test_client_events_and_status() {
        let mut registration = Registration::new(shell_config(1), memory_db().await, shell_network());
        registration.dispatch(Event::Install).await.unwrap();

        let EventOutcome::ClientOpened(id) = registration.dispatch(Event::OpenClient).await.unwrap() else {
            panic!("expected client id");
        };
        let EventOutcome::Status(status) = registration.dispatch(Event::Status).await.unwrap() else {
            panic!("expected status");
        };
        assert_eq!(status.clients, 1);
        assert_eq!(status.controlled, 1);

        let closed = registration.dispatch(Event::CloseClient { client: id }).await.unwrap();
        assert!(matches!(closed, EventOutcome::ClientClosed(None)));
        assert!(registration.clients().is_empty());
    }

    #[tokio::test]
    async fn test_activate_with_nothing_waiting() {
        let mut registration = Registration::new(shell_config(1), memory_db().await, shell_network());
        let outcome = registration.dispatch(Event::Activate).await.unwrap();
        assert!(matches!(outcome, EventOutcome::Activated(None)));
    }
}
