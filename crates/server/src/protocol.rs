//! JSON-lines wire format.
//!
//! Input: one event per line, tagged by `event`, with an optional `id` that
//! is echoed back on the reply. Output: one reply per line, tagged the same
//! way. Response bodies are base64 (standard alphabet).
//!
//! A fetch's `request.url` may be relative; it is resolved against the
//! configured origin before the event is decoded.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bloom_client::fetch::resolve;
use bloom_client::{ActivateReport, Event, FetchOutcome, InstallReport, RegistrationStatus};
use bloom_core::ResponseSnapshot;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::ServeError;

#[derive(Debug, Deserialize)]
pub struct Inbound {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(flatten)]
    pub event: Event,
}

impl Inbound {
    pub fn parse(line: &str, origin: &Url) -> Result<Self, ServeError> {
        let mut value: Value = serde_json::from_str(line)?;
        if let Some(url) = value.pointer_mut("/request/url") {
            let raw = url
                .as_str()
                .ok_or_else(|| ServeError::InvalidInput("request.url must be a string".into()))?;
            let resolved = resolve(origin, raw)?;
            *url = Value::String(resolved.to_string());
        }
        Ok(serde_json::from_value(value)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireResponse {
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl From<&ResponseSnapshot> for WireResponse {
    fn from(response: &ResponseSnapshot) -> Self {
        Self {
            url: response.url.clone(),
            status: response.status,
            headers: response.headers.clone(),
            body: STANDARD.encode(&response.body),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Reply {
    Install {
        #[serde(flatten)]
        report: InstallReport,
    },
    Update {
        #[serde(flatten)]
        report: InstallReport,
    },
    Activate {
        activated: Option<ActivateReport>,
    },
    Fetch {
        source: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        response: Option<WireResponse>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// `handled` is false for unrecognised messages.
    Message {
        handled: bool,
        activated: Option<ActivateReport>,
    },
    OpenClient {
        client: u64,
    },
    CloseClient {
        activated: Option<ActivateReport>,
    },
    Status {
        #[serde(flatten)]
        status: RegistrationStatus,
    },
}

impl From<FetchOutcome> for Reply {
    fn from(outcome: FetchOutcome) -> Self {
        let source = outcome.source();
        let response = outcome.response().map(WireResponse::from);
        let error = match outcome {
            FetchOutcome::Failed(e) => Some(e.to_string()),
            _ => None,
        };
        Reply::Fetch { source, response, error }
    }
}

#[derive(Debug, Serialize)]
struct Outbound<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a Value>,
    #[serde(flatten)]
    reply: &'a Reply,
}

#[derive(Debug, Serialize)]
struct ErrorLine<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a Value>,
    error: String,
}

/// Render a reply as one output line (no trailing newline).
pub fn reply_line(id: Option<&Value>, reply: &Reply) -> Result<String, ServeError> {
    serde_json::to_string(&Outbound { id, reply }).map_err(|e| ServeError::InvalidInput(e.to_string()))
}

/// Render an error as one output line.
pub fn error_line(id: Option<&Value>, err: &ServeError) -> String {
    let line = ErrorLine { id, error: err.to_string() };
    serde_json::to_string(&line).unwrap_or_else(|_| r#"{"error":"INVALID_INPUT: unprintable error"}"#.to_string())
}
