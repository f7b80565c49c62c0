//! One agent call from prompt to final summary line
//!
//! ```text
//! INIT -> CREDENTIALS_RESOLVED -> CWD_RESOLVED -> QUERY_RACING -> STREAMING
//!      -> COMPLETED | TIMED_OUT | FAILED
//! ```
//!
//! The invoker owns the tracked session id. It starts as the caller's resume id
//! and is replaced whenever a `system` event reports one. Every failure, from
//! any stage, ends in exactly one `{"success":false,...}` line.

use crate::config::{BridgeConfig, Environment};
use crate::constants;
use crate::credentials;
use crate::error::{BridgeError, Result};
use crate::events::{AgentEvent, ContentBlock, MessageContent};
use crate::path_rewriter::PathRewriter;
use crate::permission_channel::PermissionChannel;
use crate::permissions::{PermissionBroker, ToolApprover};
use crate::protocol::ProtocolWriter;
use crate::runtime::{AgentRuntime, QueryRequest};
use crate::workdir;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

/// Caller input for one call; empty strings count as absent
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    #[serde(default, alias = "prompt")]
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub permission_mode: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

impl SendRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_session_id(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn with_cwd(mut self, cwd: Option<String>) -> Self {
        self.cwd = cwd;
        self
    }

    pub fn with_permission_mode(mut self, permission_mode: Option<String>) -> Self {
        self.permission_mode = permission_mode;
        self
    }

    fn session_id(&self) -> Option<&str> {
        non_empty(self.session_id.as_deref())
    }

    fn cwd(&self) -> Option<&str> {
        non_empty(self.cwd.as_deref())
    }

    fn permission_mode(&self) -> &str {
        non_empty(self.permission_mode.as_deref()).unwrap_or(constants::DEFAULT_PERMISSION_MODE)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    Init,
    CredentialsResolved,
    CwdResolved,
    QueryRacing,
    Streaming,
    Completed,
    TimedOut,
    Failed,
}

/// How a call ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationOutcome {
    pub state: InvocationState,
    pub session_id: Option<String>,
    pub error: Option<String>,
}

impl InvocationOutcome {
    pub fn is_success(&self) -> bool {
        self.state == InvocationState::Completed
    }
}

/// Drives a single agent call and writes the stdout protocol
pub struct SessionInvoker {
    config: BridgeConfig,
    environment: Environment,
    runtime: Arc<dyn AgentRuntime>,
    channel: Arc<dyn PermissionChannel>,
    change_directory: bool,
}

impl SessionInvoker {
    pub fn new(
        config: BridgeConfig,
        environment: Environment,
        runtime: Arc<dyn AgentRuntime>,
        channel: Arc<dyn PermissionChannel>,
    ) -> Self {
        Self {
            config,
            environment,
            runtime,
            channel,
            change_directory: true,
        }
    }

    /// Whether the resolved directory becomes the process working directory
    pub fn with_change_directory(mut self, change_directory: bool) -> Self {
        self.change_directory = change_directory;
        self
    }

    /// Run the call to completion; the outcome mirrors the summary line written
    pub async fn run<W: Write>(
        &self,
        request: SendRequest,
        out: &mut ProtocolWriter<W>,
    ) -> InvocationOutcome {
        let mut state = InvocationState::Init;
        let mut session_id = request.session_id().map(str::to_string);

        match self.execute(&request, out, &mut state, &mut session_id).await {
            Ok(()) => {
                tracing::info!("Call completed, session {:?}", session_id);
                InvocationOutcome {
                    state: InvocationState::Completed,
                    session_id,
                    error: None,
                }
            }
            Err(e) => {
                let state = match e {
                    BridgeError::Timeout(_) => InvocationState::TimedOut,
                    _ => InvocationState::Failed,
                };
                let message = e.to_string();
                tracing::error!("Call failed in {:?}: {}", state, message);
                if let Err(write_err) = out.failure(&message) {
                    tracing::error!("Failed to write failure summary: {}", write_err);
                }
                InvocationOutcome {
                    state,
                    session_id,
                    error: Some(message),
                }
            }
        }
    }

    /// Slash commands the agent offers in `cwd`
    ///
    /// Starts a call only to read its `init` event, then drops the stream,
    /// which stops the agent. Bounded by the same ceiling as a normal call.
    pub async fn slash_commands(&self, cwd: Option<&str>) -> Result<Value> {
        let credentials = credentials::resolve(&self.config, &self.environment)?;
        let cwd = workdir::resolve(non_empty(cwd), &self.config, &self.environment);

        let query = QueryRequest::builder()
            .prompt(constants::SLASH_COMMANDS_PROMPT)
            .cwd(cwd.path.clone())
            .permission_mode(constants::SLASH_COMMANDS_PERMISSION_MODE)
            .model(self.config.model.clone())
            .max_turns(1)
            .credentials(Some(credentials))
            .build();

        let lookup = tokio::time::timeout(self.config.query_timeout(), async {
            let mut stream = self.runtime.query(query, None).await?;
            while let Some(event) = stream.next().await {
                if let AgentEvent::System(system) = event? {
                    if system.is_init() {
                        return Ok(system.slash_commands.unwrap_or_else(|| Value::Array(vec![])));
                    }
                }
            }
            Err(BridgeError::Protocol(
                "Agent exited before reporting slash commands".to_string(),
            ))
        })
        .await;

        match lookup {
            Ok(commands) => commands,
            Err(_) => {
                tracing::warn!("No init event within {:?}", self.config.query_timeout());
                Err(BridgeError::Timeout(
                    constants::QUERY_TIMEOUT_MESSAGE.to_string(),
                ))
            }
        }
    }

    async fn execute<W: Write>(
        &self,
        request: &SendRequest,
        out: &mut ProtocolWriter<W>,
        state: &mut InvocationState,
        session_id: &mut Option<String>,
    ) -> Result<()> {
        if request.message.trim().is_empty() {
            return Err(BridgeError::InvalidRequest("Message is required".to_string()));
        }

        let credentials = credentials::resolve(&self.config, &self.environment)?;
        self.transition(state, InvocationState::CredentialsResolved);

        let cwd = workdir::resolve(request.cwd(), &self.config, &self.environment);
        if self.change_directory {
            workdir::enter(&cwd);
        }
        self.transition(state, InvocationState::CwdResolved);

        out.message_start()?;

        let permission_mode = request.permission_mode().to_string();
        let approver = (permission_mode == constants::DEFAULT_PERMISSION_MODE)
            .then(|| self.broker(&cwd.path));

        if let Some(resume) = session_id.as_deref() {
            out.resuming(resume)?;
        }

        let query = QueryRequest::builder()
            .prompt(request.message.clone())
            .cwd(cwd.path.clone())
            .permission_mode(permission_mode)
            .model(self.config.clone().with_model(request.model.as_deref()).model)
            .max_turns(self.config.max_turns)
            .additional_directories(workdir::additional_directories(&cwd.path, &self.environment))
            .resume(session_id.clone())
            .credentials(Some(credentials))
            .build();

        self.transition(state, InvocationState::QueryRacing);
        let started = tokio::time::timeout(self.config.query_timeout(), async {
            let mut stream = self.runtime.query(query, approver).await?;
            let first = stream.next().await;
            Ok::<_, BridgeError>((stream, first))
        })
        .await;

        let (mut stream, first) = match started {
            Ok(started) => started?,
            Err(_) => {
                tracing::warn!("No event within {:?}", self.config.query_timeout());
                return Err(BridgeError::Timeout(
                    constants::QUERY_TIMEOUT_MESSAGE.to_string(),
                ));
            }
        };

        self.transition(state, InvocationState::Streaming);
        let mut next = first;
        while let Some(item) = next {
            forward(item?, out, session_id)?;
            next = stream.next().await;
        }

        out.message_end()?;
        out.success(session_id.as_deref())?;
        self.transition(state, InvocationState::Completed);
        Ok(())
    }

    fn broker(&self, cwd: &std::path::Path) -> Arc<dyn ToolApprover> {
        let project_root = self
            .environment
            .project_path()
            .map(PathBuf::from)
            .unwrap_or_else(|| cwd.to_path_buf());
        let rewriter = PathRewriter::new(Some(project_root), self.config.temp_path_prefixes.clone());
        Arc::new(PermissionBroker::new(
            self.channel.clone(),
            rewriter,
            &self.config.permission,
        ))
    }

    fn transition(&self, state: &mut InvocationState, next: InvocationState) {
        tracing::info!("{:?} -> {:?}", state, next);
        *state = next;
    }
}

/// Write one event and its convenience echoes
fn forward<W: Write>(
    event: AgentEvent,
    out: &mut ProtocolWriter<W>,
    session_id: &mut Option<String>,
) -> Result<()> {
    tracing::debug!("Forwarding event: {}", event.raw().as_str());
    out.message(event.raw().as_str())?;

    match &event {
        AgentEvent::System(system) => {
            if let Some(id) = system.session_id.as_deref().filter(|id| !id.is_empty()) {
                if session_id.as_deref() != Some(id) {
                    *session_id = Some(id.to_string());
                    out.session_id(id)?;
                }
            }
            if system.is_init() {
                if let Some(commands) = &system.slash_commands {
                    out.slash_commands(commands)?;
                }
            }
        }
        AgentEvent::Assistant(message) => match &message.content {
            MessageContent::Text(text) => out.content(text)?,
            MessageContent::Blocks(blocks) => {
                for block in blocks {
                    match block {
                        ContentBlock::Text { text } => out.content(text)?,
                        ContentBlock::Thinking { thinking } => out.thinking(thinking)?,
                        ContentBlock::ToolUse { raw, .. } => out.tool_use(raw)?,
                        _ => {}
                    }
                }
            }
            MessageContent::Empty => {}
        },
        AgentEvent::User(message) => {
            if let MessageContent::Blocks(blocks) = &message.content {
                for block in blocks {
                    if let ContentBlock::ToolResult { raw, .. } = block {
                        out.tool_result(raw)?;
                    }
                }
            }
        }
        AgentEvent::Result(result) if result.is_error => {
            tracing::warn!("Agent reported an error result: {:?}", result.result);
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission_channel::MemoryPermissionChannel;
    use crate::recorded::{RecordedRuntime, RecordedSession};
    use std::time::Duration;
    use tempfile::TempDir;

    fn environment(project: &TempDir) -> Environment {
        Environment::empty()
            .with_var("ANTHROPIC_API_KEY", "sk-test-key-0123456789")
            .with_home_dir(project.path())
            .with_current_dir(project.path())
    }

    fn build_invoker(runtime: RecordedRuntime, environment: Environment) -> SessionInvoker {
        SessionInvoker::new(
            BridgeConfig::default(),
            environment,
            Arc::new(runtime),
            Arc::new(MemoryPermissionChannel::new()),
        )
        .with_change_directory(false)
    }

    async fn run(invoker: &SessionInvoker, request: SendRequest) -> (InvocationOutcome, Vec<String>) {
        let mut writer = ProtocolWriter::new(Vec::new());
        let outcome = invoker.run(request, &mut writer).await;
        let out = String::from_utf8(writer.into_inner()).unwrap();
        (outcome, out.lines().map(str::to_string).collect())
    }

    #[test]
    fn test_send_request_from_stdin_json() {
        let request: SendRequest = serde_json::from_str(
            r#"{"prompt":"hi","sessionId":"","cwd":"/w","permissionMode":"plan"}"#,
        )
        .unwrap();
        assert_eq!(request.message, "hi");
        assert_eq!(request.session_id(), None);
        assert_eq!(request.cwd(), Some("/w"));
        assert_eq!(request.permission_mode(), "plan");
        assert_eq!(SendRequest::new("x").permission_mode(), "default");
    }

    #[tokio::test]
    async fn test_full_protocol_sequence() {
        let project = TempDir::new().unwrap();
        let runtime = RecordedRuntime::new(RecordedSession::from_lines([
            r#"{"type":"system","subtype":"init","session_id":"s-1","slash_commands":["/clear"]}"#,
            r#"{"type":"assistant","message":{"content":[{"type":"thinking","thinking":"plan"},{"type":"text","text":"Hello"},{"type":"tool_use","id":"t1","name":"Bash","input":{"command":"ls"}}]}}"#,
            r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"t1","content":"a.txt"}]}}"#,
            r#"{"type":"result","subtype":"success","session_id":"s-1"}"#,
        ]));
        let invoker = build_invoker(runtime, environment(&project));

        let (outcome, lines) = run(&invoker, SendRequest::new("list files")).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.session_id.as_deref(), Some("s-1"));
        let tags: Vec<&str> = lines
            .iter()
            .map(|l| l.split(' ').next().unwrap_or_default())
            .collect();
        assert_eq!(
            tags,
            vec![
                "[MESSAGE_START]",
                "[MESSAGE]",
                "[SESSION_ID]",
                "[SLASH_COMMANDS]",
                "[MESSAGE]",
                "[THINKING]",
                "[CONTENT]",
                "[TOOL_USE]",
                "[MESSAGE]",
                "[TOOL_RESULT]",
                "[MESSAGE]",
                "[MESSAGE_END]",
                r#"{"success":true,"sessionId":"s-1"}"#,
            ]
        );
        assert_eq!(lines[6], "[CONTENT] Hello");
    }

    #[tokio::test]
    async fn test_resume_keeps_id_until_reported() {
        let project = TempDir::new().unwrap();
        let runtime = RecordedRuntime::new(RecordedSession::from_lines([
            r#"{"type":"system","subtype":"init","session_id":"old"}"#,
            r#"{"type":"result"}"#,
        ]));
        let recorded = runtime.clone();
        let invoker = build_invoker(runtime, environment(&project));

        let request = SendRequest::new("continue").with_session_id(Some("old".to_string()));
        let (outcome, lines) = run(&invoker, request).await;

        assert_eq!(outcome.session_id.as_deref(), Some("old"));
        assert_eq!(lines[1], "[RESUMING] old");
        assert!(!lines.iter().any(|l| l.starts_with("[SESSION_ID]")));
        assert_eq!(recorded.requests().await[0].resume.as_deref(), Some("old"));
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_before_start() {
        let project = TempDir::new().unwrap();
        let environment = Environment::empty().with_home_dir(project.path());
        let invoker = build_invoker(RecordedRuntime::new(RecordedSession::default()), environment);

        let (outcome, lines) = run(&invoker, SendRequest::new("hi")).await;
        assert_eq!(outcome.state, InvocationState::Failed);
        assert_eq!(
            lines,
            vec![r#"{"success":false,"error":"API Key not configured"}"#.to_string()]
        );
    }

    #[tokio::test]
    async fn test_slow_start_times_out() {
        let project = TempDir::new().unwrap();
        let runtime = RecordedRuntime::new(RecordedSession::from_lines([r#"{"type":"result"}"#]))
            .with_startup_delay(Duration::from_millis(500));
        let invoker = SessionInvoker::new(
            BridgeConfig {
                query_timeout_ms: 20,
                ..BridgeConfig::default()
            },
            environment(&project),
            Arc::new(runtime),
            Arc::new(MemoryPermissionChannel::new()),
        )
        .with_change_directory(false);

        let (outcome, lines) = run(&invoker, SendRequest::new("hi")).await;
        assert_eq!(outcome.state, InvocationState::TimedOut);
        assert_eq!(
            lines.last().unwrap(),
            r#"{"success":false,"error":"Claude Code process aborted by user"}"#
        );
        assert!(!lines.iter().any(|l| l.starts_with("[MESSAGE]")));
    }

    #[tokio::test]
    async fn test_stream_error_fails_call() {
        let project = TempDir::new().unwrap();
        let session: RecordedSession = serde_json::from_str(
            r#"{"steps":[{"output":"{\"type\":\"system\",\"session_id\":\"s\"}"},{"error":"exited with status 1"}]}"#,
        )
        .unwrap();
        let invoker = build_invoker(RecordedRuntime::new(session), environment(&project));

        let (outcome, lines) = run(&invoker, SendRequest::new("hi")).await;
        assert_eq!(outcome.state, InvocationState::Failed);
        assert_eq!(outcome.session_id.as_deref(), Some("s"));
        assert!(!lines.contains(&"[MESSAGE_END]".to_string()));
        assert!(lines.last().unwrap().contains("exited with status 1"));
    }

    #[tokio::test]
    async fn test_slash_commands_read_from_init_event() {
        let project = TempDir::new().unwrap();
        let runtime = RecordedRuntime::new(RecordedSession::from_lines([
            r#"{"type":"system","subtype":"status","session_id":"s-1"}"#,
            r#"{"type":"system","subtype":"init","session_id":"s-1","slash_commands":["/clear","/review"]}"#,
            r#"{"type":"assistant","message":{"content":"never reached"}}"#,
        ]));
        let recorded = runtime.clone();
        let invoker = build_invoker(runtime, environment(&project));

        let commands = invoker.slash_commands(None).await.unwrap();
        assert_eq!(commands, serde_json::json!(["/clear", "/review"]));
        let requests = recorded.requests().await;
        assert_eq!(requests[0].permission_mode, "plan");
        assert_eq!(requests[0].cwd, project.path());
    }

    #[tokio::test]
    async fn test_slash_commands_missing_list_is_empty() {
        let project = TempDir::new().unwrap();
        let runtime = RecordedRuntime::new(RecordedSession::from_lines([
            r#"{"type":"system","subtype":"init","session_id":"s-1"}"#,
        ]));
        let invoker = build_invoker(runtime, environment(&project));

        let commands = invoker.slash_commands(Some("")).await.unwrap();
        assert_eq!(commands, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_slash_commands_fail_without_init() {
        let project = TempDir::new().unwrap();
        let runtime =
            RecordedRuntime::new(RecordedSession::from_lines([r#"{"type":"result"}"#]));
        let invoker = build_invoker(runtime, environment(&project));
        let err = invoker.slash_commands(None).await.unwrap_err();
        assert!(matches!(err, BridgeError::Protocol(_)));

        let runtime = RecordedRuntime::new(RecordedSession::default())
            .with_startup_delay(Duration::from_millis(500));
        let invoker = SessionInvoker::new(
            BridgeConfig {
                query_timeout_ms: 20,
                ..BridgeConfig::default()
            },
            environment(&project),
            Arc::new(runtime),
            Arc::new(MemoryPermissionChannel::new()),
        );
        let err = invoker.slash_commands(None).await.unwrap_err();
        assert_eq!(err.to_string(), "Claude Code process aborted by user");

        let invoker = build_invoker(
            RecordedRuntime::new(RecordedSession::default()),
            Environment::empty().with_home_dir(project.path()),
        );
        let err = invoker.slash_commands(None).await.unwrap_err();
        assert_eq!(err.to_string(), "API Key not configured");
    }

    #[tokio::test]
    async fn test_only_default_mode_wires_approver() {
        let project = TempDir::new().unwrap();
        let fixture = r#"{"steps":[{"permission":{"tool_name":"Read","input":{}}},{"output":"{\"type\":\"result\"}"}]}"#;

        let runtime = RecordedRuntime::new(serde_json::from_str(fixture).unwrap());
        let recorded = runtime.clone();
        let invoker = build_invoker(runtime, environment(&project));
        let request = SendRequest::new("hi").with_permission_mode(Some("bypassPermissions".into()));
        run(&invoker, request).await;
        assert_eq!(recorded.decisions().await[0].decision, None);

        let runtime = RecordedRuntime::new(serde_json::from_str(fixture).unwrap());
        let recorded = runtime.clone();
        let invoker = build_invoker(runtime, environment(&project));
        run(&invoker, SendRequest::new("hi")).await;
        assert!(recorded.decisions().await[0]
            .decision
            .as_ref()
            .is_some_and(|d| d.is_allow()));
    }
}
