//! In-process stand-in for the backend service
//!
//! Simulates the service's presence (installed, running, logged in, ...),
//! the path inclusion settings and a list of canned HTTP routes.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::{
    BackendRequest, BackendResponse, AUTHORIZED_PATH, EXCLUSIONS_PATH, IGNORED_PATH,
    INCLUSIONS_PATH,
};
use crate::common::{Error, Result};

/// Sparse description of the simulated backend state
///
/// Unset flags count as `true`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Presence {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supported: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub running: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reachable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logged: Option<bool>,
}

impl Presence {
    pub fn is_supported(&self) -> bool {
        self.supported.unwrap_or(true)
    }

    pub fn is_installed(&self) -> bool {
        self.installed.unwrap_or(true)
    }

    pub fn is_running(&self) -> bool {
        self.running.unwrap_or(true)
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable.unwrap_or(true)
    }

    pub fn is_logged(&self) -> bool {
        self.logged.unwrap_or(true)
    }

    /// Why requests cannot reach the backend, if they cannot
    pub fn unavailable_reason(&self) -> Option<&'static str> {
        if !self.is_supported() {
            Some("platform not supported")
        } else if !self.is_installed() {
            Some("not installed")
        } else if !self.is_running() {
            Some("not running")
        } else if !self.is_reachable() {
            Some("not reachable")
        } else {
            None
        }
    }
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

/// Absolute paths the backend is told to include, exclude or ignore
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PathsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whitelist: Option<Vec<PathBuf>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blacklist: Option<Vec<PathBuf>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignored: Option<Vec<PathBuf>>,
}

impl PathsConfig {
    /// Whether the backend may index `path`: whitelisted, and neither
    /// blacklisted nor ignored
    pub fn is_authorized(&self, path: &Path) -> bool {
        let under = |list: &Option<Vec<PathBuf>>| {
            list.iter().flatten().any(|dir| path.starts_with(dir))
        };
        under(&self.whitelist) && !under(&self.blacklist) && !under(&self.ignored)
    }
}

type Predicate = Box<dyn Fn(&BackendRequest) -> bool + Send + Sync>;
type Responder = Box<dyn Fn(&BackendRequest) -> BackendResponse + Send + Sync>;

/// A canned route: the first route whose predicate matches answers
pub struct Route {
    predicate: Predicate,
    responder: Responder,
}

impl Route {
    pub fn new<P, R>(predicate: P, responder: R) -> Self
    where
        P: Fn(&BackendRequest) -> bool + Send + Sync + 'static,
        R: Fn(&BackendRequest) -> BackendResponse + Send + Sync + 'static,
    {
        Self {
            predicate: Box::new(predicate),
            responder: Box::new(responder),
        }
    }

    /// Route matching an exact request path
    pub fn path(path: &str, response: BackendResponse) -> Self {
        let path = path.to_string();
        Self::new(move |req| req.route_path() == path, move |_| response.clone())
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route").finish_non_exhaustive()
    }
}

/// Build a response with the given status and body
pub fn fake_response(status: u16, body: &str) -> BackendResponse {
    BackendResponse {
        status,
        body: body.to_string(),
    }
}

/// Simulated backend configuration for one test case
#[derive(Debug, Default)]
pub struct MockBackend {
    presence: Presence,
    paths: PathsConfig,
    routes: Vec<Route>,
}

impl MockBackend {
    pub fn new(presence: Presence) -> Self {
        Self {
            presence,
            ..Default::default()
        }
    }

    pub fn with_paths(mut self, paths: PathsConfig) -> Self {
        self.paths = paths;
        self
    }

    pub fn with_route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    pub fn presence(&self) -> Presence {
        self.presence
    }

    pub fn paths(&self) -> &PathsConfig {
        &self.paths
    }

    /// Answer a request the way the simulated backend would
    pub fn respond(&self, request: &BackendRequest) -> Result<BackendResponse> {
        if let Some(reason) = self.presence.unavailable_reason() {
            return Err(Error::BackendUnavailable(reason.to_string()));
        }

        if let Some(route) = self.routes.iter().find(|r| (r.predicate)(request)) {
            return Ok((route.responder)(request));
        }

        if !self.presence.is_logged() {
            return Ok(fake_response(401, "{\"message\":\"not logged in\"}"));
        }

        Ok(self
            .settings_response(request)
            .unwrap_or_else(|| fake_response(404, "")))
    }

    /// Path settings routes, answered from the case's path configuration
    fn settings_response(&self, request: &BackendRequest) -> Option<BackendResponse> {
        if request.method != "GET" {
            return None;
        }
        let list = |paths: &Option<Vec<PathBuf>>| {
            let body = serde_json::to_string(paths.as_deref().unwrap_or_default())
                .unwrap_or_else(|_| "[]".to_string());
            fake_response(200, &body)
        };

        match request.route_path() {
            INCLUSIONS_PATH => Some(list(&self.paths.whitelist)),
            EXCLUSIONS_PATH => Some(list(&self.paths.blacklist)),
            IGNORED_PATH => Some(list(&self.paths.ignored)),
            AUTHORIZED_PATH => Some(match request.query_param("filename") {
                Some(file) if self.paths.is_authorized(Path::new(&file)) => {
                    fake_response(200, "true")
                }
                Some(_) => fake_response(403, "false"),
                None => fake_response(400, "{\"message\":\"missing filename\"}"),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(path: &str) -> BackendRequest {
        BackendRequest::new("GET", path)
    }

    #[test]
    fn test_first_matching_route_answers() {
        let mock = MockBackend::new(Presence::default())
            .with_route(Route::path("/clientapi/plan", fake_response(200, "{}")))
            .with_route(Route::new(|_| true, |_| fake_response(500, "late")));

        let response = mock.respond(&get("/clientapi/plan")).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "{}");

        let response = mock.respond(&get("/other")).unwrap();
        assert_eq!(response.status, 500);
    }

    #[test]
    fn test_unmatched_request_is_not_found() {
        let mock = MockBackend::new(Presence::default());
        assert_eq!(mock.respond(&get("/nothing")).unwrap().status, 404);
    }

    #[test]
    fn test_logged_out_backend_rejects_unmatched_requests() {
        let mock = MockBackend::new(Presence {
            logged: Some(false),
            ..Default::default()
        })
        .with_route(Route::path("/clientapi/plan", fake_response(200, "{}")));

        assert_eq!(mock.respond(&get("/clientapi/user")).unwrap().status, 401);
        assert_eq!(mock.respond(&get("/clientapi/plan")).unwrap().status, 200);
    }

    #[test]
    fn test_not_running_backend_is_unavailable() {
        let mock = MockBackend::new(Presence {
            running: Some(false),
            ..Default::default()
        })
        .with_route(Route::path("/clientapi/plan", fake_response(200, "{}")));

        let err = mock.respond(&get("/clientapi/plan")).unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable(reason) if reason == "not running"));
    }

    #[test]
    fn test_settings_routes_serve_paths() {
        let mock = MockBackend::new(Presence::default()).with_paths(PathsConfig {
            whitelist: Some(vec![PathBuf::from("/tmp/case")]),
            blacklist: Some(vec![PathBuf::from("/tmp/case/vendor")]),
            ignored: None,
        });

        let inclusions = mock.respond(&get(INCLUSIONS_PATH)).unwrap();
        assert_eq!(inclusions.status, 200);
        assert_eq!(inclusions.body, "[\"/tmp/case\"]");
        assert_eq!(mock.respond(&get(IGNORED_PATH)).unwrap().body, "[]");

        let authorized = |file: &str| {
            mock.respond(&get(&format!("{}?filename={}", AUTHORIZED_PATH, file)))
                .unwrap()
                .status
        };
        assert_eq!(authorized("/tmp/case/src/a.py"), 200);
        assert_eq!(authorized("/tmp/case/vendor/b.py"), 403);
        assert_eq!(authorized("/elsewhere/c.py"), 403);
        assert_eq!(mock.respond(&get(AUTHORIZED_PATH)).unwrap().status, 400);
    }

    #[test]
    fn test_routes_match_without_query() {
        let mock = MockBackend::new(Presence::default())
            .with_route(Route::path("/clientapi/plan", fake_response(200, "{}")));
        assert_eq!(mock.respond(&get("/clientapi/plan?v=2")).unwrap().status, 200);
    }

    #[test]
    fn test_presence_display_is_sparse() {
        let presence = Presence {
            logged: Some(true),
            ..Default::default()
        };
        assert_eq!(presence.to_string(), "{\"logged\":true}");
        assert_eq!(Presence::default().to_string(), "{}");
    }
}
