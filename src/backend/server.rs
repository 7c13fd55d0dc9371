//! Local HTTP server standing in front of a case's backend
//!
//! Listens on an ephemeral localhost port for the lifetime of one case. Each
//! request is recorded, checked against the simulated presence and then
//! answered by the mock or forwarded to the live service.

use std::net::SocketAddr;
use std::sync::Arc;

use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, StatusCode};
use tokio::sync::oneshot;

use crate::common::{Error, Result};

use super::mock::{fake_response, MockBackend, Presence};
use super::recorder::Recorder;
use super::{BackendRequest, BackendResponse, PRESENCE_PATH, UNAVAILABLE_HEADER};

/// What answers the requests the server accepts
pub enum Upstream {
    /// The in-process mock
    Mock(MockBackend),
    /// A real backend service at `base_url`
    Live {
        http: reqwest::Client,
        base_url: String,
    },
}

struct Shared {
    presence: Presence,
    upstream: Upstream,
    recorder: Recorder,
}

impl Shared {
    async fn respond(&self, request: &BackendRequest) -> Result<BackendResponse> {
        self.recorder.record(request)?;

        if request.route_path() == PRESENCE_PATH {
            return Ok(fake_response(200, &self.presence.to_string()));
        }
        if let Some(reason) = self.presence.unavailable_reason() {
            return Err(Error::BackendUnavailable(reason.to_string()));
        }

        match &self.upstream {
            Upstream::Mock(mock) => mock.respond(request),
            Upstream::Live { http, base_url } => forward(http, base_url, request).await,
        }
    }
}

/// Backend server for one test case; shuts down when dropped
pub struct BackendServer {
    addr: SocketAddr,
    shared: Arc<Shared>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl BackendServer {
    /// Bind an ephemeral localhost port and start serving
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(presence: Presence, upstream: Upstream, recorder: Recorder) -> Result<Self> {
        let shared = Arc::new(Shared {
            presence,
            upstream,
            recorder,
        });

        let service_state = shared.clone();
        let make_svc = make_service_fn(move |_conn| {
            let shared = service_state.clone();
            async move {
                Ok::<_, hyper::Error>(service_fn(move |req| {
                    let shared = shared.clone();
                    async move { Ok::<_, hyper::Error>(handle_request(req, shared).await) }
                }))
            }
        });

        let bind_addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let server = Server::try_bind(&bind_addr)
            .map_err(|e| Error::Internal(format!("Cannot bind backend server: {}", e)))?
            .serve(make_svc);
        let addr = server.local_addr();

        let (shutdown, signal) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let graceful = server.with_graceful_shutdown(async {
                let _ = signal.await;
            });
            if let Err(e) = graceful.await {
                tracing::warn!("backend server failed: {}", e);
            }
        });

        tracing::debug!(%addr, %presence, "backend server listening");
        Ok(Self {
            addr,
            shared,
            shutdown: Some(shutdown),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// URL the plugin and handlers reach the backend at
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn presence(&self) -> Presence {
        self.shared.presence
    }

    pub fn recorder(&self) -> &Recorder {
        &self.shared.recorder
    }

    pub fn is_live(&self) -> bool {
        matches!(self.shared.upstream, Upstream::Live { .. })
    }

    pub fn mock(&self) -> Option<&MockBackend> {
        match &self.shared.upstream {
            Upstream::Mock(mock) => Some(mock),
            Upstream::Live { .. } => None,
        }
    }
}

impl Drop for BackendServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

async fn handle_request(req: Request<Body>, shared: Arc<Shared>) -> Response<Body> {
    let method = req.method().as_str().to_string();
    let path = req
        .uri()
        .path_and_query()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let body = match hyper::body::to_bytes(req.into_body()).await {
        Ok(bytes) if bytes.is_empty() => None,
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) => return text_response(StatusCode::BAD_REQUEST, e.to_string()),
    };
    let request = BackendRequest {
        method,
        path,
        body,
    };

    match shared.respond(&request).await {
        Ok(response) => {
            let status =
                StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let mut resp = text_response(status, response.body);
            resp.headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            resp
        }
        Err(Error::BackendUnavailable(reason)) => {
            let mut resp = text_response(StatusCode::SERVICE_UNAVAILABLE, reason.clone());
            if let Ok(value) = HeaderValue::from_str(&reason) {
                resp.headers_mut().insert(UNAVAILABLE_HEADER, value);
            }
            resp
        }
        Err(e) => {
            tracing::warn!(method = %request.method, path = %request.path, "backend request failed: {}", e);
            text_response(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}

fn text_response(status: StatusCode, body: String) -> Response<Body> {
    let mut resp = Response::new(Body::from(body));
    *resp.status_mut() = status;
    resp
}

async fn forward(
    http: &reqwest::Client,
    base_url: &str,
    request: &BackendRequest,
) -> Result<BackendResponse> {
    let method = reqwest::Method::from_bytes(request.method.as_bytes())
        .map_err(|e| Error::Config(format!("Invalid HTTP method: {}", e)))?;
    let url = format!("{}{}", base_url, request.path);

    let mut builder = http.request(method, &url);
    if let Some(body) = &request.body {
        builder = builder
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.clone());
    }

    let response = builder.send().await?;
    let status = response.status().as_u16();
    let body = response.text().await?;
    tracing::trace!(%url, status, "forwarded request");

    Ok(BackendResponse { status, body })
}
