use crate::commands;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "claude-bridge")]
#[command(version)]
#[command(about = "Run the Claude agent on behalf of an IDE host")]
#[command(long_about = "
claude-bridge runs one Claude agent call per process on behalf of an IDE
host. Agent events are streamed to stdout as tag-prefixed lines and every
call ends with a single JSON summary line. Tool permission prompts are
answered through request/response files in the permission directory.

Global arguments control diagnostics, which always go to stderr:
  --verbose     Trace-level logging
  --debug       Debug-level logging
  --quiet       Errors only

Example usage:
  claude-bridge send \"list files\"                      # New session
  claude-bridge send \"continue\" <sessionId> ~/proj     # Resume in a directory
  echo '{\"message\":\"hi\"}' | claude-bridge send --stdin
  claude-bridge getSession <sessionId> ~/proj          # Dump session history
  claude-bridge getSlashCommands ~/proj                # Commands offered there
  claude-bridge permissions pending                    # List open prompts
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send a message to the agent, starting or resuming a session
    #[command(long_about = commands::send::DESCRIPTION)]
    Send {
        /// Message for the agent
        message: Option<String>,

        /// Session to resume
        #[arg(value_name = "SESSION_ID")]
        session_id: Option<String>,

        /// Requested working directory
        cwd: Option<String>,

        /// Permission mode passed to the agent
        #[arg(value_name = "PERMISSION_MODE")]
        permission_mode: Option<String>,

        /// Read the request as JSON from stdin (also enabled by CLAUDE_USE_STDIN=true)
        #[arg(long)]
        stdin: bool,
    },
    /// Print the stored messages of a session
    #[command(name = "getSession")]
    #[command(long_about = commands::get_session::DESCRIPTION)]
    GetSession {
        /// Session to read
        #[arg(value_name = "SESSION_ID")]
        session_id: String,

        /// Project directory the session belongs to (defaults to the current directory)
        cwd: Option<String>,
    },
    /// List the slash commands available in a project
    #[command(name = "getSlashCommands")]
    #[command(long_about = commands::get_slash_commands::DESCRIPTION)]
    GetSlashCommands {
        /// Project directory (defaults to the resolved working directory)
        cwd: Option<String>,

        /// Read {"cwd":...} as JSON from stdin (also enabled by CLAUDE_USE_STDIN=true)
        #[arg(long)]
        stdin: bool,
    },
    /// Inspect and answer pending tool permission requests
    #[command(long_about = commands::permissions::DESCRIPTION)]
    Permissions {
        #[command(subcommand)]
        subcommand: PermissionsSubcommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum PermissionsSubcommand {
    /// List requests waiting for an answer, oldest first
    Pending,
    /// Answer a request
    Respond {
        /// Id of the request to answer
        request_id: String,

        /// Whether the tool call may proceed
        #[arg(value_enum)]
        decision: PermissionDecision,
    },
    /// Remove request and response files nobody is waiting on anymore
    Sweep {
        /// Minimum age in seconds of files to remove
        #[arg(long, value_name = "SECONDS", default_value_t = 300)]
        older_than: u64,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PermissionDecision {
    Allow,
    Deny,
}

impl PermissionDecision {
    pub fn is_allow(self) -> bool {
        self == PermissionDecision::Allow
    }
}
