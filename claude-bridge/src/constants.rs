//! Fixed values shared across the bridge
//!
//! Anything a caller may want to tune lives in [`crate::config::BridgeConfig`];
//! these are the defaults it starts from.

use std::time::Duration;

/// Model identifier passed to every agent call
pub const DEFAULT_MODEL: &str = "sonnet";

/// Turn budget for a single agent call
pub const DEFAULT_MAX_TURNS: u32 = 100;

/// Ceiling for the agent call to start streaming
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(60);

/// Message reported when the call ceiling fires
pub const QUERY_TIMEOUT_MESSAGE: &str = "Claude Code process aborted by user";

/// Prompt for the short-lived call that only collects the init event
pub const SLASH_COMMANDS_PROMPT: &str = "/help";

/// Permission mode for that call; nothing it starts may touch the workspace
pub const SLASH_COMMANDS_PERMISSION_MODE: &str = "plan";

/// Delay between checks for a permission response file
pub const PERMISSION_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long a single tool request waits for an external decision
pub const PERMISSION_TIMEOUT: Duration = Duration::from_secs(30);

/// Directory name used under the system temp dir when no override is set
pub const PERMISSION_DIR_NAME: &str = "claude-permission";

/// Default permission mode; the only mode that routes tool use through the broker
pub const DEFAULT_PERMISSION_MODE: &str = "default";

/// Default value for `CLAUDE_CODE_ENTRYPOINT` on the child process
pub const DEFAULT_ENTRYPOINT: &str = "sdk-rust";

/// Default agent executable
pub const DEFAULT_CLAUDE_EXECUTABLE: &str = "claude";

/// Directory prefixes treated as throwaway sandbox locations
pub const TEMP_PATH_PREFIXES: &[&str] = &["/tmp", "/var/tmp", "/private/tmp"];

/// Read-only tools approved without an external round trip
pub const AUTO_ALLOWED_TOOLS: &[&str] = &["Read", "Glob", "Grep"];

/// Substrings that mark a tool path as touching a sensitive location
pub const DANGEROUS_PATH_PATTERNS: &[&str] =
    &["/etc/", "/System/", "/usr/", "/bin/", "~/.ssh/", "~/.aws/"];

/// Environment variable names consumed by the bridge
pub mod env {
    pub const ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";
    pub const ANTHROPIC_AUTH_TOKEN: &str = "ANTHROPIC_AUTH_TOKEN";
    pub const ANTHROPIC_BASE_URL: &str = "ANTHROPIC_BASE_URL";
    pub const IDEA_PROJECT_PATH: &str = "IDEA_PROJECT_PATH";
    pub const PROJECT_PATH: &str = "PROJECT_PATH";
    pub const TMPDIR: &str = "TMPDIR";
    pub const CLAUDE_PERMISSION_DIR: &str = "CLAUDE_PERMISSION_DIR";
    pub const CLAUDE_USE_STDIN: &str = "CLAUDE_USE_STDIN";
    pub const CLAUDE_CODE_ENTRYPOINT: &str = "CLAUDE_CODE_ENTRYPOINT";
    pub const CLAUDE_BRIDGE_CLAUDE_PATH: &str = "CLAUDE_BRIDGE_CLAUDE_PATH";
    pub const CLAUDE_BRIDGE_QUERY_TIMEOUT_MS: &str = "CLAUDE_BRIDGE_QUERY_TIMEOUT_MS";
}
