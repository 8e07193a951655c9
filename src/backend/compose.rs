//! # `docker compose` executor.
//!
//! Runs `<program> compose -f <manifest> <verb args>` inside the group's
//! working location. Both pipes are read line by line and forwarded to the
//! output channel as they arrive. The child is killed when the returned
//! future is dropped or the cancellation token fires.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::directory::Group;
use super::executor::{ActionExecutor, ActionOutcome, OutputLine, Verb};
use crate::error::BackendError;
use crate::events::OutputStream;

/// Manifest names, tried in order.
const MANIFEST_NAMES: [&str; 4] = [
    "compose.yaml",
    "compose.yml",
    "docker-compose.yaml",
    "docker-compose.yml",
];

/// Executor backed by the compose CLI.
#[derive(Debug, Clone)]
pub struct ComposeExecutor {
    program: String,
}

impl Default for ComposeExecutor {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl ComposeExecutor {
    /// Uses `program` as the CLI entry point (`docker`, `podman`, ...).
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn find_manifest(dir: &Path) -> Option<PathBuf> {
        for name in MANIFEST_NAMES {
            let candidate = dir.join(name);
            if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                return Some(candidate);
            }
        }
        None
    }
}

#[async_trait]
impl ActionExecutor for ComposeExecutor {
    #[instrument(level = "debug", skip(self, output, cancel), fields(group = %group.id))]
    async fn execute(
        &self,
        verb: Verb,
        group: &Group,
        output: mpsc::Sender<OutputLine>,
        cancel: CancellationToken,
    ) -> Result<ActionOutcome, BackendError> {
        let manifest = Self::find_manifest(&group.path)
            .await
            .ok_or_else(|| BackendError::not_found("compose file", group.path.display().to_string()))?;

        let mut child = Command::new(&self.program)
            .arg("compose")
            .arg("-f")
            .arg(&manifest)
            .args(verb.compose_args())
            .current_dir(&group.path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        debug!(%verb, manifest = %manifest.display(), "compose process spawned");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BackendError::Other("stdout not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| BackendError::Other("stderr not captured".into()))?;

        let run = async {
            let (_, _, status) = tokio::join!(
                pump(stdout, OutputStream::Stdout, output.clone()),
                pump(stderr, OutputStream::Stderr, output.clone()),
                child.wait(),
            );
            status
        };

        // Returning early drops `child`, which kills the process.
        let status = tokio::select! {
            status = run => status?,
            _ = cancel.cancelled() => return Err(BackendError::Cancelled),
        };

        if status.success() {
            Ok(ActionOutcome::ok("Operation completed successfully"))
        } else {
            Ok(ActionOutcome::failed(format!("Command failed: {status}")))
        }
    }
}

/// Forwards every line of `reader`; keeps draining after the receiver is gone
/// so the child never blocks on a full pipe.
async fn pump<R>(reader: R, stream: OutputStream, output: mpsc::Sender<OutputLine>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut forwarding = true;
    while let Ok(Some(line)) = lines.next_line().await {
        if forwarding && output.send(OutputLine { line, stream }).await.is_err() {
            forwarding = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_manifest_is_not_found() {
        let dir = std::env::temp_dir().join(format!("gosei-empty-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();

        let group = Group::new("empty", &dir, vec![]);
        let (tx, _rx) = mpsc::channel(8);
        let err = ComposeExecutor::default()
            .execute(Verb::Up, &group, tx, CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.as_label(), "backend_not_found");

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn manifest_lookup_order() {
        let dir = std::env::temp_dir().join(format!("gosei-manifest-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("docker-compose.yml"), "services: {}\n")
            .await
            .unwrap();
        tokio::fs::write(dir.join("compose.yml"), "services: {}\n")
            .await
            .unwrap();

        let found = ComposeExecutor::find_manifest(&dir).await.unwrap();
        assert_eq!(found.file_name().unwrap(), "compose.yml");

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[test]
    fn verb_arguments() {
        assert_eq!(Verb::Up.compose_args(), ["up", "-d", "--remove-orphans"]);
        assert_eq!(Verb::Down.compose_args(), ["down", "--remove-orphans"]);
        assert_eq!(
            Verb::Recreate.compose_args(),
            ["up", "-d", "--remove-orphans", "--force-recreate"]
        );
    }
}
