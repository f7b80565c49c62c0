//! Abstraction over "issue one agent call, receive a finite event stream"

use crate::constants;
use crate::credentials::Credentials;
use crate::error::Result;
use crate::events::AgentEvent;
use crate::permissions::ToolApprover;
use async_trait::async_trait;
use futures::Stream;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use typed_builder::TypedBuilder;

/// Single-pass stream of agent events; ends after the terminal event
pub type EventStream = Pin<Box<dyn Stream<Item = Result<AgentEvent>> + Send>>;

/// Everything the runtime needs for one call
///
/// ```ignore
/// let request = QueryRequest::builder()
///     .prompt("list files")
///     .cwd("/home/user/proj")
///     .resume(Some("abc123".to_string()))
///     .build();
/// ```
#[derive(Debug, Clone, TypedBuilder)]
pub struct QueryRequest {
    #[builder(setter(into))]
    pub prompt: String,
    #[builder(setter(into))]
    pub cwd: PathBuf,
    #[builder(default = constants::DEFAULT_PERMISSION_MODE.to_string(), setter(into))]
    pub permission_mode: String,
    #[builder(default = constants::DEFAULT_MODEL.to_string(), setter(into))]
    pub model: String,
    #[builder(default = constants::DEFAULT_MAX_TURNS)]
    pub max_turns: u32,
    #[builder(default)]
    pub additional_directories: Vec<PathBuf>,
    /// Prior session to continue
    #[builder(default, setter(into))]
    pub resume: Option<String>,
    #[builder(default, setter(into))]
    pub credentials: Option<Credentials>,
}

/// Backend able to run agent calls
///
/// When an approver is supplied every tool invocation is routed through it;
/// without one, tool use is governed by the permission mode alone.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    async fn query(
        &self,
        request: QueryRequest,
        approver: Option<Arc<dyn ToolApprover>>,
    ) -> Result<EventStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let request = QueryRequest::builder()
            .prompt("hello")
            .cwd("/work")
            .build();
        assert_eq!(request.permission_mode, "default");
        assert_eq!(request.model, "sonnet");
        assert_eq!(request.max_turns, 100);
        assert!(request.additional_directories.is_empty());
        assert!(request.resume.is_none());
        assert!(request.credentials.is_none());
    }

    #[test]
    fn test_builder_resume() {
        let request = QueryRequest::builder()
            .prompt("continue")
            .cwd("/work")
            .resume("abc123".to_string())
            .build();
        assert_eq!(request.resume.as_deref(), Some("abc123"));
    }
}
