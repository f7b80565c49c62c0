//! Error handling for the bridge CLI
//!
//! Every command failure ends as a single `{"success":false,"error":...}` line
//! on stdout plus a non-zero exit code.

use std::error::Error;
use std::fmt;

use claude_bridge::protocol;
use claude_bridge::BridgeError;

use crate::exit_codes::EXIT_ERROR;

/// CLI-specific result type that preserves error information
pub type CliResult<T> = Result<T, CliError>;

/// CLI error type that includes both error information and suggested exit code
#[derive(Debug)]
pub struct CliError {
    pub message: String,
    pub exit_code: i32,
    pub source: Option<Box<dyn Error + Send + Sync>>,
}

impl CliError {
    /// Create a new CLI error with a message and exit code
    pub fn new(message: impl Into<String>, exit_code: i32) -> Self {
        Self {
            message: message.into(),
            exit_code,
            source: None,
        }
    }

    /// Get the full error chain as a formatted string
    pub fn full_chain(&self) -> String {
        let mut result = self.message.clone();

        let mut current_source = self.source();
        while let Some(err) = current_source {
            result.push_str(&format!("\n  Caused by: {err}"));
            current_source = err.source();
        }

        result
    }

    /// The failure summary line for this error
    pub fn failure_line(&self) -> String {
        protocol::failure_line(&self.message)
    }

    /// Print the failure summary to stdout and return the exit code
    pub fn report(&self) -> i32 {
        tracing::error!("{}", self.full_chain());
        println!("{}", self.failure_line());
        self.exit_code
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for CliError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn Error + 'static))
    }
}

impl From<BridgeError> for CliError {
    fn from(error: BridgeError) -> Self {
        Self {
            message: error.to_string(),
            exit_code: EXIT_ERROR,
            source: Some(Box::new(error)),
        }
    }
}

impl From<anyhow::Error> for CliError {
    fn from(error: anyhow::Error) -> Self {
        // The summary carries the whole context chain on one line
        Self {
            message: format!("{:#}", error),
            exit_code: EXIT_ERROR,
            source: Some(error.into()),
        }
    }
}
