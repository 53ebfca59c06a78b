//! Request classification.
//!
//! Every intercepted `GET` falls into exactly one [`RequestClass`]. The checks
//! run in a fixed order and the first match wins:
//!
//! 1. host is the backend API domain
//! 2. destination is a script
//! 3. navigation, document destination, or an `Accept` asking for HTML
//! 4. anything else is a static asset

use bloom_core::{Destination, Request};
use serde::Serialize;

use crate::fetch::host_matches;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestClass {
    Api,
    Script,
    Document,
    Static,
}

impl RequestClass {
    /// Whether the class is served network-first.
    pub fn is_network_first(self) -> bool {
        !matches!(self, RequestClass::Static)
    }
}

/// Classify `request` against the backend's `api_domain`.
///
/// Callers are expected to have filtered out non-`GET` requests already.
pub fn classify(request: &Request, api_domain: &str) -> RequestClass {
    if host_matches(&request.url, api_domain) {
        RequestClass::Api
    } else if request.destination == Destination::Script {
        RequestClass::Script
    } else if request.is_navigation() || request.destination == Destination::Document || request.accepts_html() {
        RequestClass::Document
    } else {
        RequestClass::Static
    }
}
