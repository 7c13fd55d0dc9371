//! Live or mocked backend for a test case

use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::backend::{
    fake_response, BackendClient, MockBackend, Presence, Route, PLAN_PATH, RESET_HISTORY_PATH,
};
use crate::common::config::LiveConfig;
use crate::common::{Error, Result};

use super::config::TestCase;
use super::setup::translate_paths_setup;

/// Where backend requests of a run go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// A real backend service on the local machine
    Live,
    /// The in-process mock
    Mocked,
}

impl ExecutionMode {
    pub fn from_live_flag(live: bool) -> Self {
        if live {
            ExecutionMode::Live
        } else {
            ExecutionMode::Mocked
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Live => write!(f, "live"),
            ExecutionMode::Mocked => write!(f, "mocked"),
        }
    }
}

/// Build the backend client a case runs against
///
/// Both modes serve the case's backend on a local port, with `presence`
/// simulated in front of it. Live: forwards to the configured service after
/// resetting its request history. Mocked: answers from a mock whose path
/// settings point at `root` and whose plan endpoint returns an empty object.
pub async fn prepare_backend(
    mode: ExecutionMode,
    case: &TestCase,
    presence: Presence,
    root: &Path,
    live: &LiveConfig,
) -> Result<BackendClient> {
    match mode {
        ExecutionMode::Live => {
            let timeout = Duration::from_secs(live.request_timeout_secs);
            reset_request_history(live, timeout).await?;

            let client = BackendClient::live(&live.host, live.port, timeout, presence)?;
            tracing::debug!(host = %live.host, port = live.port, %presence, "live backend reset");
            Ok(client)
        }
        ExecutionMode::Mocked => {
            let paths = translate_paths_setup(&case.setup, || root.to_path_buf());
            let mock = MockBackend::new(presence)
                .with_paths(paths)
                .with_route(Route::path(PLAN_PATH, fake_response(200, "{}")));

            let client = BackendClient::mocked(mock)?;
            tracing::debug!(%presence, url = %client.base_url(), "mocked backend configured");
            Ok(client)
        }
    }
}

/// Clear the live service's request history, bypassing the simulated
/// presence
async fn reset_request_history(live: &LiveConfig, timeout: Duration) -> Result<()> {
    let http = reqwest::Client::builder().timeout(timeout).build()?;
    let url = format!("{}{}", live.base_url(), RESET_HISTORY_PATH);

    let response = http
        .post(&url)
        .send()
        .await
        .map_err(|e| Error::LiveSetup(format!("request history reset failed: {}", e)))?;
    if !response.status().is_success() {
        return Err(Error::LiveSetup(format!(
            "request history reset returned status {}",
            response.status().as_u16()
        )));
    }
    Ok(())
}
