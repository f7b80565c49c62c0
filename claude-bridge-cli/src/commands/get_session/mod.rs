//! getSession command implementation

use std::path::PathBuf;

use claude_bridge::{history, BridgeConfig, Environment};
use serde::Serialize;
use serde_json::Value;

use crate::error::{CliError, CliResult};
use crate::exit_codes::{EXIT_ERROR, EXIT_SUCCESS};

/// Help text for the getSession command
pub const DESCRIPTION: &str = include_str!("description.md");

#[derive(Serialize)]
struct SessionMessages {
    success: bool,
    messages: Vec<Value>,
}

/// Handle the getSession command
pub async fn handle_command(session_id: String, cwd: Option<String>) -> i32 {
    match load_messages(&session_id, cwd.as_deref()).await {
        Ok(messages) => {
            let summary = SessionMessages {
                success: true,
                messages,
            };
            match serde_json::to_string(&summary) {
                Ok(line) => {
                    println!("{}", line);
                    EXIT_SUCCESS
                }
                Err(e) => CliError::new(e.to_string(), EXIT_ERROR).report(),
            }
        }
        Err(e) => e.report(),
    }
}

async fn load_messages(session_id: &str, cwd: Option<&str>) -> CliResult<Vec<Value>> {
    let environment = Environment::capture();
    let config = BridgeConfig::from_env(&environment);

    let projects_dir = config
        .projects_dir
        .ok_or_else(|| CliError::new("Home directory not found", EXIT_ERROR))?;
    let cwd = match cwd.map(str::trim).filter(|c| !c.is_empty()) {
        Some(cwd) => PathBuf::from(cwd),
        None => environment
            .current_dir()
            .map(PathBuf::from)
            .ok_or_else(|| CliError::new("Current directory not available", EXIT_ERROR))?,
    };

    tracing::debug!(
        "Reading session {} for {} under {}",
        session_id,
        cwd.display(),
        projects_dir.display()
    );
    Ok(history::read_session(&projects_dir, &cwd, session_id).await?)
}
