//! Built-in actions and expectations
//!
//! Generic handlers every suite can use. Suite scripts with the same name
//! replace them.

use std::time::Duration;

use async_trait::async_trait;

use crate::backend::{BackendRequest, AUTHORIZED_PATH};
use crate::common::{Error, Result};

use super::registry::{FnHandler, Handler, HandlerRegistry, StepContext};

pub(super) fn register_builtins(registry: &mut HandlerRegistry) {
    registry.register_action("new_file", FnHandler(new_file));
    registry.register_action("delete_file", FnHandler(delete_file));
    registry.register_action("request", SendRequest);
    registry.register_action("wait", Wait);

    registry.register_expectation("file_exists", FnHandler(file_exists));
    registry.register_expectation("file_content", FnHandler(file_content));
    registry.register_expectation("request", RequestMade);
    registry.register_expectation("path_authorized", PathAuthorized);
}

/// `{"file": "a/b.py", "content": "..."}`: write a file under the case root
fn new_file(ctx: &StepContext<'_>) -> Result<()> {
    let path = ctx.resolve(ctx.required_str("file")?)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, ctx.step.str_field("content").unwrap_or_default())?;
    tracing::debug!(path = %path.display(), "created file");
    Ok(())
}

/// `{"file": "a/b.py"}`
fn delete_file(ctx: &StepContext<'_>) -> Result<()> {
    let path = ctx.resolve(ctx.required_str("file")?)?;
    std::fs::remove_file(&path).map_err(|e| {
        Error::handler_failed(
            &ctx.step.handler,
            format!("cannot delete '{}': {}", path.display(), e),
        )
    })
}

/// `{"file": "a/b.py"}`
fn file_exists(ctx: &StepContext<'_>) -> Result<()> {
    let file = ctx.required_str("file")?;
    ctx.check(ctx.resolve(file)?.exists(), || format!("file '{}' to exist", file))
}

/// `{"file": "a/b.py", "content": "..."}`
fn file_content(ctx: &StepContext<'_>) -> Result<()> {
    let file = ctx.required_str("file")?;
    let expected = ctx.required_str("content")?;
    let actual = std::fs::read_to_string(ctx.resolve(file)?).ok();
    ctx.check(actual.as_deref() == Some(expected), || {
        format!(
            "file '{}' to contain '{}', got {:?}",
            file, expected, actual
        )
    })
}

/// `{"path": "/clientapi/...", "method": "GET", "body": "..."}`: issue a
/// backend request through the case's client
struct SendRequest;

#[async_trait]
impl Handler for SendRequest {
    async fn call(&self, ctx: &StepContext<'_>) -> Result<()> {
        let path = ctx.required_str("path")?;
        let method = ctx.step.str_field("method").unwrap_or("GET");
        let mut request = BackendRequest::new(method, path);
        if let Some(body) = ctx.step.field("body") {
            request = request.with_body(match body.as_str() {
                Some(s) => s.to_string(),
                None => body.to_string(),
            });
        }

        let response = ctx.client.request(request).await?;
        tracing::debug!(path, status = response.status, "request action answered");
        Ok(())
    }
}

/// `{"ms": 100}`
struct Wait;

#[async_trait]
impl Handler for Wait {
    async fn call(&self, ctx: &StepContext<'_>) -> Result<()> {
        let ms = ctx.step.u64_field("ms").unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(())
    }
}

/// `{"path": "/clientapi/...", "method": "POST"}`: a matching request was
/// recorded since the case started
struct RequestMade;

#[async_trait]
impl Handler for RequestMade {
    async fn call(&self, ctx: &StepContext<'_>) -> Result<()> {
        let path = ctx.required_str("path")?;
        let method = ctx.step.str_field("method").map(str::to_ascii_uppercase);
        let recorded = ctx.client.recorded()?;

        let found = recorded.iter().any(|r| {
            (r.path == path || r.route_path() == path) && method.as_deref().map_or(true, |m| r.method == m)
        });

        ctx.check(found, || {
            format!(
                "a {} request to '{}' (recorded: {:?})",
                method.as_deref().unwrap_or("any"),
                path,
                recorded
                    .iter()
                    .map(|r| format!("{} {}", r.method, r.path))
                    .collect::<Vec<_>>()
            )
        })
    }
}

/// `{"file": "src/a.py"}`: the backend's path settings allow indexing the
/// file
struct PathAuthorized;

#[async_trait]
impl Handler for PathAuthorized {
    async fn call(&self, ctx: &StepContext<'_>) -> Result<()> {
        let file = ctx.required_str("file")?;
        let absolute = ctx.resolve(file)?;

        let mut url = reqwest::Url::parse("http://backend")
            .map_err(|e| Error::Internal(format!("Invalid base URL: {}", e)))?;
        url.set_path(AUTHORIZED_PATH);
        url.query_pairs_mut()
            .append_pair("filename", &absolute.display().to_string());
        let path = format!("{}?{}", url.path(), url.query().unwrap_or_default());

        let response = ctx.client.request(BackendRequest::new("GET", &path)).await?;
        ctx.check(response.status == 200, || {
            format!("'{}' to be authorized (status {})", file, response.status)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{fake_response, BackendClient, MockBackend, PathsConfig, Presence, Route};
    use crate::plugin::CaseEnv;
    use crate::testing::config::Step;
    use crate::testing::registry::HandlerFamily;
    use std::path::Path;

    fn localhost_binding_permitted() -> bool {
        std::net::TcpListener::bind("127.0.0.1:0").is_ok()
    }

    fn step(json: &str) -> Step {
        serde_json::from_str(json).unwrap()
    }

    fn client_with(paths: PathsConfig) -> BackendClient {
        BackendClient::mocked(
            MockBackend::new(Presence::default())
                .with_paths(paths)
                .with_route(Route::path("/clientapi/plan", fake_response(200, "{}"))),
        )
        .unwrap()
    }

    fn client() -> BackendClient {
        client_with(PathsConfig::default())
    }

    fn env(root: &Path, client: &BackendClient) -> CaseEnv {
        CaseEnv {
            root: root.to_path_buf(),
            backend_url: client.base_url(),
            presence: client.presence(),
            paths: PathsConfig::default(),
        }
    }

    #[tokio::test]
    async fn test_new_file_then_file_content() {
        if !localhost_binding_permitted() {
            return;
        }
        let temp = tempfile::tempdir().unwrap();
        let client = client();
        let env = env(temp.path(), &client);

        let create = step(r#"{"step": "action", "type": "new_file", "file": "src/a.py", "content": "import os"}"#);
        new_file(&StepContext::new(&create, HandlerFamily::Action, false, &client, &env)).unwrap();

        let expect = step(r#"{"step": "expect", "type": "file_content", "file": "src/a.py", "content": "import os"}"#);
        file_content(&StepContext::new(&expect, HandlerFamily::Expectation, false, &client, &env)).unwrap();

        let err = file_content(&StepContext::new(&expect, HandlerFamily::Expectation, true, &client, &env))
            .unwrap_err();
        assert!(err.is_assertion());
    }

    #[tokio::test]
    async fn test_file_exists_honours_not() {
        if !localhost_binding_permitted() {
            return;
        }
        let temp = tempfile::tempdir().unwrap();
        let client = client();
        let env = env(temp.path(), &client);
        let expect = step(r#"{"step": "expect_not", "type": "file_exists", "file": "missing.py"}"#);

        file_exists(&StepContext::new(&expect, HandlerFamily::Expectation, true, &client, &env)).unwrap();
        let err = file_exists(&StepContext::new(&expect, HandlerFamily::Expectation, false, &client, &env))
            .unwrap_err();
        assert!(err.to_string().contains("missing.py"));
    }

    #[tokio::test]
    async fn test_missing_field_is_handler_error() {
        if !localhost_binding_permitted() {
            return;
        }
        let temp = tempfile::tempdir().unwrap();
        let client = client();
        let env = env(temp.path(), &client);
        let create = step(r#"{"step": "action", "type": "new_file"}"#);

        let err = new_file(&StepContext::new(&create, HandlerFamily::Action, false, &client, &env))
            .unwrap_err();
        assert!(matches!(err, Error::HandlerFailed { key, .. } if key == "new_file"));
    }

    #[tokio::test]
    async fn test_file_paths_cannot_leave_case_root() {
        if !localhost_binding_permitted() {
            return;
        }
        let temp = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let root = temp.path().join("root");
        std::fs::create_dir_all(&root).unwrap();
        let client = client();
        let env = env(&root, &client);

        let escaped = outside.path().join("escaped.txt");
        for file in [escaped.display().to_string(), "../escaped.txt".to_string(), String::new()] {
            let create = step(&format!(
                r#"{{"step": "action", "type": "new_file", "file": {}}}"#,
                serde_json::Value::String(file.clone())
            ));
            let err = new_file(&StepContext::new(&create, HandlerFamily::Action, false, &client, &env))
                .unwrap_err();
            assert!(matches!(err, Error::HandlerFailed { .. }), "{:?} was accepted", file);
        }
        assert!(!escaped.exists());
        assert!(!temp.path().join("escaped.txt").exists());

        let nested = step(r#"{"step": "action", "type": "new_file", "file": "./a/b.txt"}"#);
        new_file(&StepContext::new(&nested, HandlerFamily::Action, false, &client, &env)).unwrap();
        assert!(root.join("a/b.txt").exists());
    }

    #[tokio::test]
    async fn test_request_expectation_reads_recorded_history() {
        if !localhost_binding_permitted() {
            return;
        }
        let temp = tempfile::tempdir().unwrap();
        let client = client();
        let env = env(temp.path(), &client);
        client.install_recorder().unwrap();

        let send = step(r#"{"step": "action", "type": "request", "path": "/clientapi/plan", "method": "post"}"#);
        SendRequest
            .call(&StepContext::new(&send, HandlerFamily::Action, false, &client, &env))
            .await
            .unwrap();

        let made = step(r#"{"step": "expect", "type": "request", "path": "/clientapi/plan", "method": "POST"}"#);
        RequestMade
            .call(&StepContext::new(&made, HandlerFamily::Expectation, false, &client, &env))
            .await
            .unwrap();

        let other = step(r#"{"step": "expect_not", "type": "request", "path": "/clientapi/user"}"#);
        RequestMade
            .call(&StepContext::new(&other, HandlerFamily::Expectation, true, &client, &env))
            .await
            .unwrap();

        let wrong_method = step(r#"{"step": "expect", "type": "request", "path": "/clientapi/plan", "method": "GET"}"#);
        let err = RequestMade
            .call(&StepContext::new(&wrong_method, HandlerFamily::Expectation, false, &client, &env))
            .await
            .unwrap_err();
        assert!(err.is_assertion());
    }

    #[tokio::test]
    async fn test_path_authorized_follows_whitelist() {
        if !localhost_binding_permitted() {
            return;
        }
        let temp = tempfile::tempdir().unwrap();
        let client = client_with(PathsConfig {
            whitelist: Some(vec![temp.path().join("src")]),
            blacklist: Some(vec![temp.path().join("src/vendor")]),
            ignored: None,
        });
        let env = env(temp.path(), &client);

        let inside = step(r#"{"step": "expect", "type": "path_authorized", "file": "src/a b.py"}"#);
        PathAuthorized
            .call(&StepContext::new(&inside, HandlerFamily::Expectation, false, &client, &env))
            .await
            .unwrap();

        for file in ["src/vendor/x.py", "docs/readme.md"] {
            let outside = step(&format!(
                r#"{{"step": "expect_not", "type": "path_authorized", "file": "{}"}}"#,
                file
            ));
            PathAuthorized
                .call(&StepContext::new(&outside, HandlerFamily::Expectation, true, &client, &env))
                .await
                .unwrap();
        }
    }
}
