//! Client used by the harness and by handlers to reach the backend

use std::time::Duration;

use crate::common::{Error, Result};

use super::mock::{MockBackend, Presence};
use super::recorder::Recorder;
use super::server::{BackendServer, Upstream};
use super::{BackendRequest, BackendResponse, UNAVAILABLE_HEADER};

/// Request timeout when talking to the mock
const MOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Backend client for one test case
///
/// Owns the case's [`BackendServer`]; requests go through it like requests
/// from the plugin do, so they land in the same recorded history.
pub struct BackendClient {
    http: reqwest::Client,
    server: BackendServer,
}

impl BackendClient {
    /// Client for a live backend at `host:port`, seen through `presence`
    pub fn live(host: &str, port: u16, timeout: Duration, presence: Presence) -> Result<Self> {
        let upstream = Upstream::Live {
            http: reqwest::Client::builder().timeout(timeout).build()?,
            base_url: format!("http://{}:{}", host, port),
        };
        let server = BackendServer::start(presence, upstream, Recorder::default())?;
        Self::new(server, timeout)
    }

    /// Client answered by a mock backend
    pub fn mocked(mock: MockBackend) -> Result<Self> {
        let presence = mock.presence();
        let server = BackendServer::start(presence, Upstream::Mock(mock), Recorder::default())?;
        Self::new(server, MOCK_TIMEOUT)
    }

    fn new(server: BackendServer, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, server })
    }

    pub fn is_live(&self) -> bool {
        self.server.is_live()
    }

    /// The mock configuration, when not running against a live backend
    pub fn mock(&self) -> Option<&MockBackend> {
        self.server.mock()
    }

    /// URL of the case's backend server
    pub fn base_url(&self) -> String {
        self.server.base_url()
    }

    pub fn presence(&self) -> Presence {
        self.server.presence()
    }

    /// Issue a request
    ///
    /// A backend simulated as unavailable answers with
    /// `Error::BackendUnavailable`.
    pub async fn request(&self, request: BackendRequest) -> Result<BackendResponse> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| Error::Config(format!("Invalid HTTP method: {}", e)))?;
        let url = format!("{}{}", self.server.base_url(), request.path);

        let mut builder = self.http.request(method, &url);
        if let Some(body) = &request.body {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body.clone());
        }

        let response = builder.send().await?;
        if let Some(reason) = response.headers().get(UNAVAILABLE_HEADER) {
            let reason = reason.to_str().unwrap_or("unavailable").to_string();
            return Err(Error::BackendUnavailable(reason));
        }

        let status = response.status().as_u16();
        let body = response.text().await?;
        tracing::trace!(method = %request.method, path = %request.path, status, "backend request");

        Ok(BackendResponse { status, body })
    }

    /// Start recording requests, discarding any earlier history
    pub fn install_recorder(&self) -> Result<()> {
        self.server.recorder().install()
    }

    /// Stop recording requests
    pub fn restore_recorder(&self) -> Result<()> {
        self.server.recorder().restore()
    }

    /// Requests that reached the backend since the recorder was installed,
    /// whoever issued them
    pub fn recorded(&self) -> Result<Vec<BackendRequest>> {
        self.server.recorder().recorded()
    }
}
