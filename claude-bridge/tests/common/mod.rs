//! Shared helpers for the integration tests

#![allow(dead_code)]

use claude_bridge::{
    BridgeConfig, Environment, FilePermissionChannel, InvocationOutcome, PermissionRequest,
    ProtocolWriter, RecordedRuntime, SendRequest, SessionInvoker,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Load a recorded fixture from `tests/fixtures`
pub fn fixture(name: &str) -> RecordedRuntime {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name);
    RecordedRuntime::from_file(&path).expect("Failed to load fixture")
}

/// Project directory plus a private permission directory
pub struct Workspace {
    pub project: TempDir,
    pub permissions: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            project: tempfile::tempdir().unwrap(),
            permissions: tempfile::tempdir().unwrap(),
        }
    }

    pub fn environment(&self) -> Environment {
        Environment::empty()
            .with_var("ANTHROPIC_API_KEY", "sk-ant-REDACTED")
            .with_var(
                "CLAUDE_PERMISSION_DIR",
                self.permissions.path().to_string_lossy(),
            )
            .with_home_dir(self.project.path())
            .with_current_dir(self.project.path())
    }

    pub fn config(&self) -> BridgeConfig {
        let mut config = BridgeConfig::from_env(&self.environment());
        config.permission.poll_interval_ms = 10;
        config.permission.timeout_ms = 2_000;
        config
    }

    pub fn channel(&self) -> FilePermissionChannel {
        FilePermissionChannel::new(self.permissions.path())
    }

    pub fn invoker(&self, runtime: RecordedRuntime) -> SessionInvoker {
        SessionInvoker::new(
            self.config(),
            self.environment(),
            Arc::new(runtime),
            Arc::new(self.channel()),
        )
        .with_change_directory(false)
    }

    /// Names of every file currently in the permission directory
    pub fn permission_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.permissions.path())
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}

/// Run one call and split the protocol output into lines
pub async fn run(invoker: &SessionInvoker, request: SendRequest) -> (InvocationOutcome, Vec<String>) {
    let mut writer = ProtocolWriter::new(Vec::new());
    let outcome = invoker.run(request, &mut writer).await;
    let output = String::from_utf8(writer.into_inner()).unwrap();
    (outcome, output.lines().map(str::to_string).collect())
}

/// Answer the first `count` requests that appear in `channel`'s directory
pub fn spawn_approver(
    channel: FilePermissionChannel,
    allow: bool,
    count: usize,
) -> tokio::task::JoinHandle<Vec<PermissionRequest>> {
    tokio::spawn(async move {
        let mut answered = Vec::new();
        while answered.len() < count {
            for request in channel.pending_requests().await.unwrap() {
                channel.respond(&request.request_id, allow).await.unwrap();
                answered.push(request);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        answered
    })
}
