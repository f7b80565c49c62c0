//! Tool permission decisions
//!
//! [`PermissionBroker`] is the approval callback handed to the agent runtime.
//! Each tool invocation moves through:
//!
//! ```text
//! EVALUATING -> AUTO_ALLOWED
//!            -> DENIED_UNSAFE
//!            -> AWAITING_APPROVAL -> ALLOWED | DENIED | TIMED_OUT
//! ```
//!
//! The dangerous-path check always runs before any request is published, and
//! every failure of the permission channel resolves to a denial. Nothing in
//! here returns an error to the caller.

use crate::config::PermissionConfig;
use crate::path_rewriter::PathRewriter;
use crate::permission_channel::{PermissionChannel, PermissionRequest};
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

const REQUEST_ID_SUFFIX_LEN: usize = 9;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Result of a permission evaluation, in the agent's control-response shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "behavior", rename_all = "lowercase")]
pub enum Decision {
    Allow {
        #[serde(rename = "updatedInput")]
        updated_input: Value,
    },
    Deny {
        message: String,
    },
}

impl Decision {
    pub fn deny(message: impl Into<String>) -> Self {
        Decision::Deny {
            message: message.into(),
        }
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }
}

/// Decides whether a single tool invocation may run
#[async_trait]
pub trait ToolApprover: Send + Sync {
    async fn evaluate(&self, tool_name: &str, input: Value) -> Decision;
}

/// Terminal state of one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionOutcome {
    AutoAllowed,
    DeniedUnsafe,
    Allowed,
    Denied,
    TimedOut,
}

/// Full record of one evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub outcome: PermissionOutcome,
    pub decision: Decision,
    /// Set when the evaluation published a request
    pub request_id: Option<String>,
}

/// Policy-enforcing approver backed by a [`PermissionChannel`]
pub struct PermissionBroker {
    channel: Arc<dyn PermissionChannel>,
    rewriter: PathRewriter,
    auto_allowed_tools: Vec<String>,
    dangerous_path_patterns: Vec<String>,
    poll_interval: Duration,
    timeout: Duration,
}

impl PermissionBroker {
    pub fn new(
        channel: Arc<dyn PermissionChannel>,
        rewriter: PathRewriter,
        config: &PermissionConfig,
    ) -> Self {
        Self {
            channel,
            rewriter,
            auto_allowed_tools: config.auto_allowed_tools.clone(),
            dangerous_path_patterns: config.dangerous_path_patterns.clone(),
            poll_interval: config.poll_interval(),
            timeout: config.timeout(),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Evaluate a tool invocation and report how the decision was reached
    pub async fn decide(&self, tool_name: &str, mut input: Value) -> Evaluation {
        self.rewriter.rewrite(tool_name, &mut input);

        if tool_name.trim().is_empty() {
            tracing::warn!("Denying tool request without a tool name");
            return Self::finish(
                tool_name,
                PermissionOutcome::DeniedUnsafe,
                Decision::deny("Tool name is required"),
                None,
            );
        }

        if let Some(path) = self.dangerous_path(&input) {
            tracing::warn!("Denying {} on dangerous path {}", tool_name, path);
            let message = format!("Access to dangerous path denied: {}", path);
            return Self::finish(
                tool_name,
                PermissionOutcome::DeniedUnsafe,
                Decision::deny(message),
                None,
            );
        }

        if self.auto_allowed_tools.iter().any(|t| t == tool_name) {
            return Self::finish(
                tool_name,
                PermissionOutcome::AutoAllowed,
                Decision::Allow {
                    updated_input: input,
                },
                None,
            );
        }

        self.await_approval(tool_name, input).await
    }

    /// First value in `input` that touches a sensitive location
    ///
    /// Every path-shaped field is checked at any depth, and shell command
    /// strings are checked token by token.
    fn dangerous_path(&self, input: &Value) -> Option<String> {
        let mut candidates = Vec::new();
        collect_path_candidates(input, &mut candidates);
        candidates.into_iter().find(|candidate| {
            self.dangerous_path_patterns
                .iter()
                .any(|pattern| candidate.contains(pattern.as_str()))
        })
    }

    async fn await_approval(&self, tool_name: &str, input: Value) -> Evaluation {
        let request = PermissionRequest {
            request_id: generate_request_id(),
            tool_name: tool_name.to_string(),
            inputs: input.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        let request_id = request.request_id.clone();
        let denied = || Decision::deny(format!("User denied permission for {}", tool_name));

        if let Err(e) = self.channel.write_request(&request).await {
            tracing::error!("Failed to publish permission request {}: {}", request_id, e);
            return Self::finish(tool_name, PermissionOutcome::Denied, denied(), Some(request_id));
        }
        tracing::info!("Awaiting approval for {} ({})", tool_name, request_id);

        let deadline = tokio::time::Instant::now() + self.timeout;
        loop {
            match self.channel.take_response(&request_id).await {
                Ok(Some(response)) if response.allow => {
                    return Self::finish(
                        tool_name,
                        PermissionOutcome::Allowed,
                        Decision::Allow {
                            updated_input: input,
                        },
                        Some(request_id),
                    );
                }
                Ok(Some(_)) => {
                    return Self::finish(
                        tool_name,
                        PermissionOutcome::Denied,
                        denied(),
                        Some(request_id),
                    );
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("Unusable response for {}: {}", request_id, e);
                    return Self::finish(
                        tool_name,
                        PermissionOutcome::Denied,
                        denied(),
                        Some(request_id),
                    );
                }
            }

            if tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        if let Err(e) = self.channel.discard_request(&request_id).await {
            tracing::debug!("Could not remove orphaned request {}: {}", request_id, e);
        }
        tracing::warn!(
            "Permission request {} timed out after {:?}",
            request_id,
            self.timeout
        );
        Self::finish(tool_name, PermissionOutcome::TimedOut, denied(), Some(request_id))
    }

    fn finish(
        tool_name: &str,
        outcome: PermissionOutcome,
        decision: Decision,
        request_id: Option<String>,
    ) -> Evaluation {
        tracing::debug!("Permission for {:?}: {:?}", tool_name, outcome);
        Evaluation {
            outcome,
            decision,
            request_id,
        }
    }
}

#[async_trait]
impl ToolApprover for PermissionBroker {
    async fn evaluate(&self, tool_name: &str, input: Value) -> Decision {
        self.decide(tool_name, input).await.decision
    }
}

/// Field names whose string values are file system paths
const PATH_FIELDS: &[&str] = &["file_path", "path", "notebook_path"];

/// Field names whose string values are shell command lines
const COMMAND_FIELDS: &[&str] = &["command"];

fn collect_path_candidates(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, value) in map {
                match value.as_str() {
                    Some(text) if PATH_FIELDS.contains(&key.as_str()) => {
                        out.push(text.to_string())
                    }
                    Some(text) if COMMAND_FIELDS.contains(&key.as_str()) => {
                        out.extend(command_tokens(text))
                    }
                    _ => collect_path_candidates(value, out),
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_path_candidates(item, out);
            }
        }
        _ => {}
    }
}

/// Words of a shell command line, split on whitespace, quotes and operators
fn command_tokens(command: &str) -> impl Iterator<Item = String> + '_ {
    command
        .split(|c: char| c.is_whitespace() || "'\"`;|&<>()=".contains(c))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

/// `<unix millis>-<random base36>`
fn generate_request_id() -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..REQUEST_ID_SUFFIX_LEN)
        .map(|_| BASE36[rng.random_range(0..BASE36.len())] as char)
        .collect();
    format!("{}-{}", chrono::Utc::now().timestamp_millis(), suffix)
}
