//! Backend access for test cases
//!
//! Every case gets a local HTTP server standing in front of the backend. In
//! mocked mode it answers from an in-process mock that simulates presence,
//! path settings and canned routes; in live mode it forwards to the real
//! service. Either way the plugin under test, handler scripts and built-in
//! handlers all reach the backend through that server, which records every
//! request it sees.

mod client;
mod mock;
mod recorder;
mod server;

use serde::{Deserialize, Serialize};

pub use client::BackendClient;
pub use mock::{fake_response, MockBackend, PathsConfig, Presence, Route};
pub use recorder::Recorder;
pub use server::{BackendServer, Upstream};

/// Path of the endpoint mocked for every case in mocked mode
pub const PLAN_PATH: &str = "/clientapi/plan";

/// Live backend endpoint that clears the request history
pub const RESET_HISTORY_PATH: &str = "/testapi/request-history/reset";

/// Simulated presence of the backend, as JSON
pub const PRESENCE_PATH: &str = "/testapi/presence";

/// Whitelisted paths of the mocked backend
pub const INCLUSIONS_PATH: &str = "/clientapi/settings/inclusions";

/// Blacklisted paths of the mocked backend
pub const EXCLUSIONS_PATH: &str = "/clientapi/settings/exclusions";

/// Ignored paths of the mocked backend
pub const IGNORED_PATH: &str = "/clientapi/settings/ignored";

/// `?filename=<abs path>`: 200 when the file may be indexed, 403 otherwise
pub const AUTHORIZED_PATH: &str = "/clientapi/permissions/authorized";

/// Response header carrying the reason the simulated backend is unavailable
pub const UNAVAILABLE_HEADER: &str = "x-harness-unavailable";

/// An outbound request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendRequest {
    pub method: String,
    /// Path including the query string
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl BackendRequest {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            path: path.to_string(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// The path without its query string
    pub fn route_path(&self) -> &str {
        self.path.split('?').next().unwrap_or_default()
    }

    /// Decoded value of a query parameter
    pub fn query_param(&self, name: &str) -> Option<String> {
        let url = reqwest::Url::parse(&format!("http://backend{}", self.path)).ok()?;
        url.query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }
}

/// A backend response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendResponse {
    pub status: u16,
    pub body: String,
}

impl BackendResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
