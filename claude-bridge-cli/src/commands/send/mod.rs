//! Send command implementation
//!
//! Runs one agent call against the real `claude` executable with the
//! file-backed permission channel.

use std::sync::Arc;

use anyhow::Context;
use claude_bridge::constants::env;
use claude_bridge::{
    BridgeConfig, ClaudeCliRuntime, Environment, FilePermissionChannel, ProtocolWriter,
    SendRequest, SessionInvoker,
};
use tokio::io::AsyncReadExt;

use crate::error::CliResult;
use crate::exit_codes::{EXIT_ERROR, EXIT_SUCCESS};

/// Help text for the send command
pub const DESCRIPTION: &str = include_str!("description.md");

/// Positional arguments and flags of `send`
#[derive(Debug, Clone, Default)]
pub struct SendArgs {
    pub message: Option<String>,
    pub session_id: Option<String>,
    pub cwd: Option<String>,
    pub permission_mode: Option<String>,
    pub stdin: bool,
}

impl From<SendArgs> for SendRequest {
    fn from(args: SendArgs) -> Self {
        SendRequest::new(args.message.unwrap_or_default())
            .with_session_id(args.session_id)
            .with_cwd(args.cwd)
            .with_permission_mode(args.permission_mode)
    }
}

/// Handle the send command
pub async fn handle_command(args: SendArgs) -> i32 {
    let environment = Environment::capture();

    let request = match build_request(args, &environment).await {
        Ok(request) => request,
        Err(e) => return e.report(),
    };

    let config = BridgeConfig::from_env(&environment);
    let runtime = Arc::new(ClaudeCliRuntime::from_config(&config));
    let channel = Arc::new(FilePermissionChannel::new(config.permission.dir.clone()));
    let invoker = SessionInvoker::new(config, environment, runtime.clone(), channel);

    let mut out = ProtocolWriter::new(std::io::stdout());
    let outcome = invoker.run(request, &mut out).await;

    // Reap the agent child before the process exits
    runtime.shutdown().await;
    if outcome.is_success() {
        EXIT_SUCCESS
    } else {
        EXIT_ERROR
    }
}

async fn build_request(args: SendArgs, environment: &Environment) -> CliResult<SendRequest> {
    if !(args.stdin || environment.flag(env::CLAUDE_USE_STDIN)) {
        return Ok(args.into());
    }

    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .context("Failed to read request from stdin")?;
    tracing::debug!("Read {} bytes of request JSON from stdin", input.len());
    parse_stdin_request(&input)
}

/// Parse the JSON request accepted on stdin
pub fn parse_stdin_request(input: &str) -> CliResult<SendRequest> {
    let request = serde_json::from_str::<SendRequest>(input.trim())
        .context("Invalid request JSON on stdin")?;
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stdin_request_fields() {
        let request = parse_stdin_request(
            r#"{"message":"hi","sessionId":"abc","cwd":"/p","permissionMode":"plan","model":"opus"}"#,
        )
        .unwrap();
        assert_eq!(request.message, "hi");
        assert_eq!(request.session_id.as_deref(), Some("abc"));
        assert_eq!(request.cwd.as_deref(), Some("/p"));
        assert_eq!(request.permission_mode.as_deref(), Some("plan"));
        assert_eq!(request.model.as_deref(), Some("opus"));
    }

    #[test]
    fn test_parse_stdin_request_accepts_prompt_alias() {
        let request = parse_stdin_request("{\"prompt\":\"hello\"}\n").unwrap();
        assert_eq!(request.message, "hello");
        assert!(request.session_id.is_none());
    }

    #[test]
    fn test_parse_stdin_request_ignores_editor_context() {
        let request = parse_stdin_request(
            r#"{"message":"explain","attachments":[{"fileName":"a.png","mediaType":"image/png","data":"AAAA"}],"openedFiles":{"active":"/p/src/main.rs","others":[]}}"#,
        )
        .unwrap();
        assert_eq!(request.message, "explain");
        assert!(request.cwd.is_none());
    }

    #[test]
    fn test_parse_stdin_request_rejects_garbage() {
        let error = parse_stdin_request("not json").unwrap_err();
        assert!(error.message.starts_with("Invalid request JSON on stdin"));
    }

    #[test]
    fn test_positional_arguments_become_request() {
        let request: SendRequest = SendArgs {
            message: Some("list files".to_string()),
            session_id: Some(String::new()),
            cwd: Some("/home/user/proj".to_string()),
            permission_mode: None,
            stdin: false,
        }
        .into();
        assert_eq!(request.message, "list files");
        assert_eq!(request.session_id.as_deref(), Some(""));
        assert_eq!(request.cwd.as_deref(), Some("/home/user/proj"));
    }
}
