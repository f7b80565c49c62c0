//! Agent runtime backed by the `claude` CLI in stream-json mode
//!
//! One child process is spawned per call. The prompt is written to stdin as a
//! single stream-json user message; stdout is read line by line. Permission
//! prompts arrive as `control_request` lines with subtype `can_use_tool` and
//! are answered on stdin with a `control_response` once the approver decides.
//! Each control request is handled on its own task so concurrent tool requests
//! never wait on each other. Stdin is closed after the `result` event, which
//! lets the CLI exit.
//!
//! The reader task owns the child. If the event stream is dropped before the
//! child exits, the child is killed and reaped. [`ClaudeCliRuntime::shutdown`]
//! waits for every reader task, so a caller about to exit the process can be
//! sure no child outlives it.

use crate::config::BridgeConfig;
use crate::constants::env;
use crate::error::{BridgeError, Result};
use crate::events::AgentEvent;
use crate::permissions::{Decision, ToolApprover};
use crate::runtime::{AgentRuntime, EventStream, QueryRequest};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// Lines of stderr kept for the error raised on a failed exit
const STDERR_TAIL_LINES: usize = 20;

type SharedStdin = Arc<Mutex<Option<ChildStdin>>>;

/// Runs agent calls through the `claude` executable
#[derive(Debug, Clone)]
pub struct ClaudeCliRuntime {
    executable: PathBuf,
    entrypoint: String,
    readers: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl ClaudeCliRuntime {
    pub fn new(executable: impl Into<PathBuf>, entrypoint: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            entrypoint: entrypoint.into(),
            readers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(config.claude_executable.clone(), config.entrypoint.clone())
    }

    /// Wait until every spawned child has exited or been killed
    ///
    /// Children whose event stream is still held keep running; drop the
    /// stream first.
    pub async fn shutdown(&self) {
        let readers: Vec<JoinHandle<()>> = self.readers.lock().await.drain(..).collect();
        for reader in readers {
            if let Err(e) = reader.await {
                tracing::warn!("claude reader task failed: {}", e);
            }
        }
    }

    /// Command-line arguments for one call
    pub fn build_args(request: &QueryRequest, with_approver: bool) -> Vec<String> {
        let mut args: Vec<String> = [
            "--print",
            "--output-format",
            "stream-json",
            "--input-format",
            "stream-json",
            "--verbose",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        args.extend([
            "--model".to_string(),
            request.model.clone(),
            "--max-turns".to_string(),
            request.max_turns.to_string(),
            "--permission-mode".to_string(),
            request.permission_mode.clone(),
        ]);
        for dir in &request.additional_directories {
            args.push("--add-dir".to_string());
            args.push(dir.to_string_lossy().into_owned());
        }
        if let Some(session_id) = request.resume.as_deref().filter(|s| !s.is_empty()) {
            args.push("--resume".to_string());
            args.push(session_id.to_string());
        }
        if with_approver {
            args.push("--permission-prompt-tool".to_string());
            args.push("stdio".to_string());
        }
        args
    }

    /// The prompt as a stream-json user message
    pub fn user_message(prompt: &str) -> String {
        json!({
            "type": "user",
            "message": {
                "role": "user",
                "content": prompt,
            }
        })
        .to_string()
    }

    fn command(&self, request: &QueryRequest, with_approver: bool) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.args(Self::build_args(request, with_approver))
            .current_dir(&request.cwd)
            .env(env::CLAUDE_CODE_ENTRYPOINT, &self.entrypoint)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(credentials) = &request.credentials {
            cmd.env(env::ANTHROPIC_API_KEY, &credentials.api_key);
            if let Some(base_url) = &credentials.base_url {
                cmd.env(env::ANTHROPIC_BASE_URL, base_url);
            }
        }
        cmd
    }
}

#[async_trait]
impl AgentRuntime for ClaudeCliRuntime {
    async fn query(
        &self,
        request: QueryRequest,
        approver: Option<Arc<dyn ToolApprover>>,
    ) -> Result<EventStream> {
        if request.prompt.is_empty() {
            return Err(BridgeError::InvalidRequest("Empty prompt".to_string()));
        }

        let mut child = self
            .command(&request, approver.is_some())
            .spawn()
            .map_err(|e| {
                BridgeError::Process(format!(
                    "Failed to spawn {}: {}",
                    self.executable.display(),
                    e
                ))
            })?;
        tracing::info!(
            "Spawned {} (pid {:?}) in {}",
            self.executable.display(),
            child.id(),
            request.cwd.display()
        );

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::Process("Child stdout unavailable".to_string()))?;
        let stderr = child.stderr.take();
        let stdin: SharedStdin = Arc::new(Mutex::new(child.stdin.take()));

        write_line(&stdin, &Self::user_message(&request.prompt)).await?;
        tracing::debug!("Sent prompt ({} chars)", request.prompt.len());

        let stderr_task = tokio::spawn(async move {
            let mut tail: Vec<String> = Vec::new();
            if let Some(stderr) = stderr {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!("claude stderr: {}", line);
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.remove(0);
                    }
                    tail.push(line);
                }
            }
            tail.join("\n")
        });

        let (tx, rx) = mpsc::unbounded_channel();

        let reader = tokio::task::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                let next = tokio::select! {
                    _ = tx.closed() => {
                        tracing::info!("Event consumer dropped, stopping claude process");
                        stop_child(&mut child).await;
                        return;
                    }
                    next = lines.next_line() => next,
                };
                let line = match next {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        let _ = tx.send(Err(BridgeError::Io(e)));
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }

                let value: Value = match serde_json::from_str(&line) {
                    Ok(value) => value,
                    Err(e) => {
                        tracing::warn!("Skipping non-JSON output line: {} ({})", line, e);
                        continue;
                    }
                };

                let kind = value
                    .get("type")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                match kind.as_deref() {
                    Some("control_request") => {
                        handle_control_request(value, approver.clone(), stdin.clone());
                        continue;
                    }
                    Some("control_response") | Some("control_cancel_request") => {
                        tracing::debug!("Ignoring control line: {}", line);
                        continue;
                    }
                    _ => {}
                }

                let event = match AgentEvent::parse(&line) {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::warn!("Skipping unparseable event: {}", e);
                        continue;
                    }
                };
                let is_result = event.is_result();

                if tx.send(Ok(event)).is_err() {
                    tracing::info!("Event consumer dropped, stopping claude process");
                    stop_child(&mut child).await;
                    return;
                }
                if is_result {
                    // Closing stdin ends the input stream so the CLI exits
                    stdin.lock().await.take();
                }
            }

            stdin.lock().await.take();
            let status = tokio::select! {
                _ = tx.closed() => {
                    tracing::info!("Event consumer dropped before claude exited");
                    stop_child(&mut child).await;
                    return;
                }
                status = child.wait() => status,
            };
            match status {
                Ok(status) if status.success() => {
                    tracing::debug!("claude exited cleanly");
                }
                Ok(status) => {
                    let tail = stderr_task.await.unwrap_or_default();
                    tracing::error!("claude exited with {}", status);
                    let message = if tail.is_empty() {
                        format!("claude exited with {}", status)
                    } else {
                        format!("claude exited with {}: {}", status, tail)
                    };
                    let _ = tx.send(Err(BridgeError::Process(message)));
                }
                Err(e) => {
                    let _ = tx.send(Err(BridgeError::Process(format!(
                        "Failed to wait for claude: {}",
                        e
                    ))));
                }
            }
        });
        self.track(reader).await;

        let stream = tokio_stream::wrappers::UnboundedReceiverStream::new(rx);
        Ok(Box::pin(stream))
    }
}

impl ClaudeCliRuntime {
    async fn track(&self, reader: JoinHandle<()>) {
        let mut readers = self.readers.lock().await;
        readers.retain(|handle| !handle.is_finished());
        readers.push(reader);
    }
}

/// Kill the child and reap it
async fn stop_child(child: &mut Child) {
    let pid = child.id();
    match child.kill().await {
        Ok(()) => tracing::debug!("claude process {:?} killed", pid),
        Err(e) => tracing::warn!("Failed to kill claude process: {}", e),
    }
}

/// Answer one `control_request` on its own task
fn handle_control_request(
    value: Value,
    approver: Option<Arc<dyn ToolApprover>>,
    stdin: SharedStdin,
) {
    let Some(request_id) = value
        .get("request_id")
        .and_then(Value::as_str)
        .map(str::to_string)
    else {
        tracing::warn!("control_request without request_id: {}", value);
        return;
    };
    let request = value.get("request").cloned().unwrap_or(Value::Null);
    let subtype = request
        .get("subtype")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    tokio::spawn(async move {
        let line = match (subtype.as_str(), approver) {
            ("can_use_tool", Some(approver)) => {
                let tool_name = request
                    .get("tool_name")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let input = request.get("input").cloned().unwrap_or_else(|| json!({}));
                let decision = approver.evaluate(tool_name, input).await;
                tracing::debug!("Decision for {} ({}): {:?}", tool_name, request_id, decision);
                control_response_line(&request_id, &decision)
            }
            (subtype, _) => {
                tracing::warn!("Unsupported control request subtype {:?}", subtype);
                json!({
                    "type": "control_response",
                    "response": {
                        "subtype": "error",
                        "request_id": request_id,
                        "error": format!("Unsupported control request: {}", subtype),
                    }
                })
                .to_string()
            }
        };

        if let Err(e) = write_line(&stdin, &line).await {
            tracing::warn!("Failed to answer control request {}: {}", request_id, e);
        }
    });
}

/// `control_response` carrying a permission decision
pub fn control_response_line(request_id: &str, decision: &Decision) -> String {
    let response = serde_json::to_value(decision).unwrap_or_else(|_| {
        json!({ "behavior": "deny", "message": "Permission decision unavailable" })
    });
    json!({
        "type": "control_response",
        "response": {
            "subtype": "success",
            "request_id": request_id,
            "response": response,
        }
    })
    .to_string()
}

async fn write_line(stdin: &SharedStdin, line: &str) -> Result<()> {
    let mut guard = stdin.lock().await;
    let Some(pipe) = guard.as_mut() else {
        return Err(BridgeError::Process("claude stdin is closed".to_string()));
    };
    pipe.write_all(line.as_bytes()).await?;
    pipe.write_all(b"\n").await?;
    pipe.flush().await?;
    Ok(())
}
