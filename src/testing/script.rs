//! Handlers backed by scripts discovered in the suite
//!
//! A script receives the step context as JSON on stdin:
//!
//! ```json
//! {"action": {...step...}, "root": "/tmp/...", "not": false, "requests": [...],
//!  "backend_url": "http://127.0.0.1:...", "presence": {...}, "paths": {...}}
//! ```
//!
//! (`expectation` instead of `action` for expectation scripts). The same
//! values are exported as `HARNESS_*` environment variables, plus
//! `HARNESS_NOT` and `HARNESS_STEP_TYPE`. Exit status 0 means success.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::process::Command as TokioCommand;

use crate::common::{Error, Result};
use crate::plugin::shell;

use super::registry::{Handler, HandlerFamily, StepContext};

/// Handler running an external script
#[derive(Debug)]
pub struct ScriptHandler {
    path: PathBuf,
    family: HandlerFamily,
}

impl ScriptHandler {
    pub fn new(path: PathBuf, family: HandlerFamily) -> Self {
        Self { path, family }
    }

    fn command(&self) -> Result<TokioCommand> {
        if self.path.extension().and_then(|e| e.to_str()) == Some("sh") {
            let mut cmd = TokioCommand::new(shell()?);
            cmd.arg(&self.path);
            Ok(cmd)
        } else {
            Ok(TokioCommand::new(&self.path))
        }
    }
}

#[async_trait]
impl Handler for ScriptHandler {
    async fn call(&self, ctx: &StepContext<'_>) -> Result<()> {
        let key = ctx.step.handler.as_str();
        let env = ctx.env();
        let mut payload = json!({
            "root": env.root,
            "not": ctx.not,
            "requests": ctx.client.recorded()?,
            "backend_url": env.backend_url,
            "presence": env.presence,
            "paths": env.paths,
        });
        payload[self.family.to_string()] = ctx.step.to_json();
        let input = serde_json::to_vec(&payload)?;

        tracing::debug!(script = %self.path.display(), key, "running handler script");

        let mut child = self
            .command()?
            .current_dir(ctx.root())
            .envs(env.vars())
            .env("HARNESS_NOT", if ctx.not { "1" } else { "0" })
            .env("HARNESS_STEP_TYPE", key)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::handler_failed(key, format!("failed to start script: {}", e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A script that never reads its input closes the pipe early
            if let Err(e) = stdin.write_all(&input).await {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(e.into());
                }
            }
        }

        let output = child.wait_with_output().await?;
        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let detail = if stderr.trim().is_empty() {
            stdout.trim().to_string()
        } else {
            stderr.trim().to_string()
        };
        let message = format!(
            "script '{}' exited with code {:?}{}",
            self.path.display(),
            output.status.code(),
            if detail.is_empty() {
                String::new()
            } else {
                format!(": {}", detail)
            }
        );

        match self.family {
            HandlerFamily::Expectation => Err(Error::TestAssertion(message)),
            HandlerFamily::Action => Err(Error::handler_failed(key, message)),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::backend::{BackendClient, MockBackend, PathsConfig, Presence};
    use crate::plugin::CaseEnv;
    use crate::testing::config::Step;
    use std::fs;
    use std::path::{Path, PathBuf};

    fn localhost_binding_permitted() -> bool {
        std::net::TcpListener::bind("127.0.0.1:0").is_ok()
    }

    fn step(json: &str) -> Step {
        serde_json::from_str(json).unwrap()
    }

    fn client() -> BackendClient {
        BackendClient::mocked(MockBackend::new(Presence::default())).unwrap()
    }

    fn env(root: &Path, client: &BackendClient) -> CaseEnv {
        CaseEnv {
            root: root.to_path_buf(),
            backend_url: client.base_url(),
            presence: client.presence(),
            paths: PathsConfig {
                whitelist: Some(vec![root.join("src")]),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_script_receives_context() {
        if !localhost_binding_permitted() {
            return;
        }
        let temp = tempfile::tempdir().unwrap();
        let script = temp.path().join("write_marker.sh");
        fs::write(
            &script,
            "cat > \"$HARNESS_ROOT/context.json\"\n\
             echo \"$HARNESS_NOT $HARNESS_BACKEND_URL\" > \"$HARNESS_ROOT/env\"\n",
        )
        .unwrap();
        let root = temp.path().join("root");
        fs::create_dir_all(&root).unwrap();

        let step = step(r#"{"step": "action", "type": "write_marker", "file": "a.txt"}"#);
        let client = client();
        let env = env(&root, &client);
        let ctx = StepContext::new(&step, HandlerFamily::Action, false, &client, &env);

        ScriptHandler::new(script, HandlerFamily::Action)
            .call(&ctx)
            .await
            .unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(root.join("context.json")).unwrap()).unwrap();
        assert_eq!(written["action"]["type"], "write_marker");
        assert_eq!(written["action"]["file"], "a.txt");
        assert_eq!(written["not"], false);
        assert_eq!(written["root"], root.display().to_string());
        assert_eq!(written["backend_url"], client.base_url());
        assert_eq!(
            written["paths"]["whitelist"][0],
            root.join("src").display().to_string()
        );
        assert_eq!(
            fs::read_to_string(root.join("env")).unwrap().trim(),
            format!("0 {}", client.base_url())
        );
    }

    #[tokio::test]
    async fn test_failing_expectation_script_is_assertion() {
        if !localhost_binding_permitted() {
            return;
        }
        let temp = tempfile::tempdir().unwrap();
        let script = temp.path().join("never.sh");
        fs::write(&script, "echo 'status bar is empty' >&2\nexit 1\n").unwrap();

        let step = step(r#"{"step": "expect", "type": "never"}"#);
        let client = client();
        let env = env(temp.path(), &client);
        let ctx = StepContext::new(&step, HandlerFamily::Expectation, false, &client, &env);

        let err = ScriptHandler::new(script, HandlerFamily::Expectation)
            .call(&ctx)
            .await
            .unwrap_err();
        match err {
            Error::TestAssertion(message) => assert!(message.contains("status bar is empty")),
            other => panic!("Expected assertion failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failing_action_script_is_handler_error() {
        if !localhost_binding_permitted() {
            return;
        }
        let temp = tempfile::tempdir().unwrap();
        let script = temp.path().join("broken.sh");
        fs::write(&script, "exit 2\n").unwrap();

        let step = step(r#"{"step": "action", "type": "broken"}"#);
        let client = client();
        let env = env(temp.path(), &client);
        let ctx = StepContext::new(&step, HandlerFamily::Action, false, &client, &env);

        let err = ScriptHandler::new(PathBuf::from(&script), HandlerFamily::Action)
            .call(&ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::HandlerFailed { key, .. } if key == "broken"));
    }
}
