//! Claude Bridge Library
//!
//! Drives the Claude agent one invocation at a time on behalf of an IDE host.
//! Each call resolves credentials and a working directory, runs the agent
//! through an [`AgentRuntime`], and reports events over a line-tagged stdout
//! protocol. Tool use is mediated by a [`PermissionBroker`] that enforces a
//! local danger-path policy and asks an external approver through a
//! file-based request/response channel.

pub mod claude_process;
pub mod config;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod events;
pub mod history;
pub mod invoker;
pub mod path_rewriter;
pub mod permission_channel;
pub mod permissions;
pub mod protocol;
pub mod recorded;
pub mod runtime;
pub mod workdir;

pub use claude_process::ClaudeCliRuntime;
pub use config::{BridgeConfig, Environment, PermissionConfig};
pub use credentials::{CredentialSource, Credentials};
pub use error::{BridgeError, Result};
pub use events::{AgentEvent, ContentBlock, MessageContent};
pub use invoker::{InvocationOutcome, InvocationState, SendRequest, SessionInvoker};
pub use path_rewriter::{PathRewriter, RewriteReport};
pub use permission_channel::{
    FilePermissionChannel, MemoryPermissionChannel, PermissionChannel, PermissionRequest,
    PermissionResponse,
};
pub use permissions::{Decision, PermissionBroker, PermissionOutcome, ToolApprover};
pub use protocol::ProtocolWriter;
pub use recorded::{RecordedRuntime, RecordedSession, RecordedStep};
pub use runtime::{AgentRuntime, EventStream, QueryRequest};
