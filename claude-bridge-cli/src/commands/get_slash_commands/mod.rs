//! getSlashCommands command implementation

use std::sync::Arc;

use anyhow::Context;
use claude_bridge::constants::env;
use claude_bridge::{
    BridgeConfig, ClaudeCliRuntime, Environment, FilePermissionChannel, ProtocolWriter,
    SessionInvoker,
};
use serde::Deserialize;
use tokio::io::AsyncReadExt;

use crate::error::{CliError, CliResult};
use crate::exit_codes::EXIT_SUCCESS;

/// Help text for the getSlashCommands command
pub const DESCRIPTION: &str = include_str!("description.md");

#[derive(Debug, Default, Deserialize)]
struct LookupRequest {
    #[serde(default)]
    cwd: Option<String>,
}

/// Handle the getSlashCommands command
pub async fn handle_command(cwd: Option<String>, stdin: bool) -> i32 {
    let environment = Environment::capture();

    let cwd = match requested_cwd(cwd, stdin, &environment).await {
        Ok(cwd) => cwd,
        Err(e) => return e.report(),
    };

    let config = BridgeConfig::from_env(&environment);
    let runtime = Arc::new(ClaudeCliRuntime::from_config(&config));
    let channel = Arc::new(FilePermissionChannel::new(config.permission.dir.clone()));
    let invoker = SessionInvoker::new(config, environment, runtime.clone(), channel);

    let lookup = invoker.slash_commands(cwd.as_deref()).await;
    runtime.shutdown().await;

    let commands = match lookup {
        Ok(commands) => commands,
        Err(e) => return CliError::from(e).report(),
    };
    tracing::info!("Agent reported slash commands: {}", commands);

    let mut out = ProtocolWriter::new(std::io::stdout());
    let written = out
        .slash_commands(&commands)
        .and_then(|()| out.commands(&commands));
    match written {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => CliError::from(e).report(),
    }
}

async fn requested_cwd(
    cwd: Option<String>,
    stdin: bool,
    environment: &Environment,
) -> CliResult<Option<String>> {
    if !(stdin || environment.flag(env::CLAUDE_USE_STDIN)) {
        return Ok(cwd);
    }

    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .context("Failed to read request from stdin")?;
    parse_stdin_cwd(&input)
}

/// Directory named by the JSON object accepted on stdin; empty input means none
pub fn parse_stdin_cwd(input: &str) -> CliResult<Option<String>> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }
    let request = serde_json::from_str::<LookupRequest>(input)
        .context("Invalid request JSON on stdin")?;
    Ok(request.cwd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stdin_cwd() {
        assert_eq!(
            parse_stdin_cwd(r#"{"cwd":"/home/user/proj"}"#).unwrap().as_deref(),
            Some("/home/user/proj")
        );
        assert_eq!(parse_stdin_cwd("{}\n").unwrap(), None);
        assert_eq!(parse_stdin_cwd("  ").unwrap(), None);
    }

    #[test]
    fn test_parse_stdin_cwd_rejects_garbage() {
        let error = parse_stdin_cwd("[1, 2").unwrap_err();
        assert!(error.message.starts_with("Invalid request JSON on stdin"));
    }
}
