//! Permissions command implementation
//!
//! Approver-side view of the permission directory. Every subcommand prints a
//! single JSON line.

use std::path::PathBuf;
use std::time::Duration;

use claude_bridge::{BridgeConfig, Environment, FilePermissionChannel, PermissionRequest};
use serde::Serialize;

use crate::cli::{PermissionDecision, PermissionsSubcommand};
use crate::error::{CliError, CliResult};
use crate::exit_codes::{EXIT_ERROR, EXIT_SUCCESS};

/// Help text for the permissions command
pub const DESCRIPTION: &str = include_str!("description.md");

#[derive(Serialize)]
struct PendingSummary {
    success: bool,
    requests: Vec<PermissionRequest>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RespondSummary {
    success: bool,
    request_id: String,
    allow: bool,
}

#[derive(Serialize)]
struct SweepSummary {
    success: bool,
    removed: Vec<PathBuf>,
}

/// Handle the permissions command
pub async fn handle_command(subcommand: PermissionsSubcommand) -> i32 {
    let environment = Environment::capture();
    let config = BridgeConfig::from_env(&environment);
    let channel = FilePermissionChannel::new(config.permission.dir);

    let result = match subcommand {
        PermissionsSubcommand::Pending => pending(&channel).await,
        PermissionsSubcommand::Respond {
            request_id,
            decision,
        } => respond(&channel, &request_id, decision).await,
        PermissionsSubcommand::Sweep { older_than } => {
            sweep(&channel, Duration::from_secs(older_than)).await
        }
    };

    match result {
        Ok(line) => {
            println!("{}", line);
            EXIT_SUCCESS
        }
        Err(e) => e.report(),
    }
}

async fn pending(channel: &FilePermissionChannel) -> CliResult<String> {
    let requests = channel.pending_requests().await?;
    tracing::debug!("{} pending permission requests", requests.len());
    to_line(&PendingSummary {
        success: true,
        requests,
    })
}

async fn respond(
    channel: &FilePermissionChannel,
    request_id: &str,
    decision: PermissionDecision,
) -> CliResult<String> {
    if request_id.is_empty() || request_id.contains(['/', '\\']) || request_id.starts_with('.') {
        return Err(CliError::new(
            format!("Invalid request id: {:?}", request_id),
            EXIT_ERROR,
        ));
    }
    if !tokio::fs::try_exists(channel.request_path(request_id))
        .await
        .unwrap_or(false)
    {
        return Err(CliError::new(
            format!("Permission request not found: {}", request_id),
            EXIT_ERROR,
        ));
    }

    channel.respond(request_id, decision.is_allow()).await?;
    to_line(&RespondSummary {
        success: true,
        request_id: request_id.to_string(),
        allow: decision.is_allow(),
    })
}

async fn sweep(channel: &FilePermissionChannel, max_age: Duration) -> CliResult<String> {
    let report = channel.sweep(max_age).await?;
    to_line(&SweepSummary {
        success: true,
        removed: report.removed,
    })
}

fn to_line(summary: &impl Serialize) -> CliResult<String> {
    serde_json::to_string(summary).map_err(|e| CliError::new(e.to_string(), EXIT_ERROR))
}
