//! Agent runtime that replays recorded fixtures
//!
//! Tests that spawn a real `claude` binary are slow and need credentials. A
//! fixture lists the lines the agent would print plus the permission prompts it
//! would raise, so the session invoker and the permission broker can be driven
//! end to end without any child process.
//!
//! ```json
//! {
//!   "steps": [
//!     { "output": "{\"type\":\"system\",\"subtype\":\"init\",\"session_id\":\"abc\"}" },
//!     { "permission": { "tool_name": "Bash", "input": { "command": "ls" } } },
//!     { "output": "{\"type\":\"result\",\"subtype\":\"success\"}" }
//!   ]
//! }
//! ```

use crate::error::{BridgeError, Result};
use crate::events::AgentEvent;
use crate::permissions::{Decision, ToolApprover};
use crate::runtime::{AgentRuntime, EventStream, QueryRequest};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// One step of a recorded call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordedStep {
    /// A stream-json line printed by the agent
    Output(String),
    /// A tool permission prompt raised by the agent
    Permission { tool_name: String, input: Value },
    /// A runtime failure surfaced through the stream
    Error(String),
}

/// Recorded call fixture
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordedSession {
    pub steps: Vec<RecordedStep>,
}

impl RecordedSession {
    /// Fixture made only of output lines
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            steps: lines
                .into_iter()
                .map(|line| RecordedStep::Output(line.into()))
                .collect(),
        }
    }
}

/// How a recorded permission prompt was resolved
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedDecision {
    pub tool_name: String,
    pub input: Value,
    /// `None` when the call ran without an approver
    pub decision: Option<Decision>,
}

/// Replays a [`RecordedSession`] for every query
#[derive(Clone)]
pub struct RecordedRuntime {
    session: RecordedSession,
    startup_delay: Option<Duration>,
    requests: Arc<Mutex<Vec<QueryRequest>>>,
    decisions: Arc<Mutex<Vec<RecordedDecision>>>,
}

impl RecordedRuntime {
    pub fn new(session: RecordedSession) -> Self {
        Self {
            session,
            startup_delay: None,
            requests: Arc::new(Mutex::new(Vec::new())),
            decisions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Load a fixture from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let session: RecordedSession = serde_json::from_str(&content)?;
        Ok(Self::new(session))
    }

    /// Hold back the first event, simulating a slow start
    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = Some(delay);
        self
    }

    /// Requests received so far
    pub async fn requests(&self) -> Vec<QueryRequest> {
        self.requests.lock().await.clone()
    }

    /// Permission prompts resolved so far
    pub async fn decisions(&self) -> Vec<RecordedDecision> {
        self.decisions.lock().await.clone()
    }
}

#[async_trait]
impl AgentRuntime for RecordedRuntime {
    async fn query(
        &self,
        request: QueryRequest,
        approver: Option<Arc<dyn ToolApprover>>,
    ) -> Result<EventStream> {
        tracing::debug!(
            "RecordedRuntime: replaying {} steps",
            self.session.steps.len()
        );
        self.requests.lock().await.push(request);

        let (tx, rx) = mpsc::unbounded_channel();
        let steps = self.session.steps.clone();
        let startup_delay = self.startup_delay;
        let decisions = self.decisions.clone();

        tokio::spawn(async move {
            if let Some(delay) = startup_delay {
                tokio::time::sleep(delay).await;
            }
            for step in steps {
                let item = match step {
                    RecordedStep::Output(line) => match AgentEvent::parse(&line) {
                        Ok(event) => Ok(event),
                        Err(e) => {
                            tracing::warn!("RecordedRuntime: skipping bad fixture line: {}", e);
                            continue;
                        }
                    },
                    RecordedStep::Permission { tool_name, input } => {
                        let decision = match &approver {
                            Some(approver) => {
                                Some(approver.evaluate(&tool_name, input.clone()).await)
                            }
                            None => None,
                        };
                        decisions.lock().await.push(RecordedDecision {
                            tool_name,
                            input,
                            decision,
                        });
                        continue;
                    }
                    RecordedStep::Error(message) => Err(BridgeError::Process(message)),
                };
                if tx.send(item).is_err() {
                    break;
                }
            }
        });

        Ok(Box::pin(tokio_stream::wrappers::UnboundedReceiverStream::new(rx)))
    }
}
