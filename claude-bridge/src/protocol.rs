//! Line-tagged standard output protocol
//!
//! Every line starts with a bracketed tag, except the final summary, which is a
//! bare JSON object. `[MESSAGE]` carries the exact raw event and is the
//! authoritative form; the other tags are convenience echoes of parts of it.
//! `[CONTENT]` and `[THINKING]` text is escaped (`\\`, `\n`, `\r`) so each
//! echo stays on one line. Logging never goes through this writer.

use crate::error::Result;
use serde::Serialize;
use std::io::Write;

pub const MESSAGE_START: &str = "[MESSAGE_START]";
pub const MESSAGE_END: &str = "[MESSAGE_END]";
pub const MESSAGE: &str = "[MESSAGE]";
pub const CONTENT: &str = "[CONTENT]";
pub const THINKING: &str = "[THINKING]";
pub const TOOL_USE: &str = "[TOOL_USE]";
pub const TOOL_RESULT: &str = "[TOOL_RESULT]";
pub const SESSION_ID: &str = "[SESSION_ID]";
pub const SLASH_COMMANDS: &str = "[SLASH_COMMANDS]";
pub const RESUMING: &str = "[RESUMING]";

/// Writes protocol lines, flushing after each one
pub struct ProtocolWriter<W: Write> {
    out: W,
}

impl<W: Write> ProtocolWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn tagged(&mut self, tag: &str, payload: &str) -> Result<()> {
        writeln!(self.out, "{} {}", tag, payload)?;
        self.out.flush()?;
        Ok(())
    }

    fn bare(&mut self, line: &str) -> Result<()> {
        writeln!(self.out, "{}", line)?;
        self.out.flush()?;
        Ok(())
    }

    pub fn message_start(&mut self) -> Result<()> {
        self.bare(MESSAGE_START)
    }

    pub fn message_end(&mut self) -> Result<()> {
        self.bare(MESSAGE_END)
    }

    pub fn resuming(&mut self, session_id: &str) -> Result<()> {
        self.tagged(RESUMING, session_id)
    }

    pub fn message(&mut self, raw: &str) -> Result<()> {
        self.tagged(MESSAGE, raw)
    }

    pub fn content(&mut self, text: &str) -> Result<()> {
        self.tagged(CONTENT, &escape_text(text))
    }

    pub fn thinking(&mut self, text: &str) -> Result<()> {
        self.tagged(THINKING, &escape_text(text))
    }

    pub fn tool_use(&mut self, block: &serde_json::Value) -> Result<()> {
        self.tagged(TOOL_USE, &block.to_string())
    }

    pub fn tool_result(&mut self, block: &serde_json::Value) -> Result<()> {
        self.tagged(TOOL_RESULT, &block.to_string())
    }

    pub fn session_id(&mut self, session_id: &str) -> Result<()> {
        self.tagged(SESSION_ID, session_id)
    }

    pub fn slash_commands(&mut self, commands: &serde_json::Value) -> Result<()> {
        self.tagged(SLASH_COMMANDS, &commands.to_string())
    }

    /// Final line of a successful call
    pub fn success(&mut self, session_id: Option<&str>) -> Result<()> {
        self.bare(&success_line(session_id))
    }

    /// Final line of a slash command lookup
    pub fn commands(&mut self, commands: &serde_json::Value) -> Result<()> {
        self.bare(&commands_line(commands))
    }

    /// Final line of a failed call
    pub fn failure(&mut self, error: &str) -> Result<()> {
        self.bare(&failure_line(error))
    }
}

#[derive(Serialize)]
struct SuccessSummary<'a> {
    success: bool,
    #[serde(rename = "sessionId")]
    session_id: Option<&'a str>,
}

#[derive(Serialize)]
struct FailureSummary<'a> {
    success: bool,
    error: &'a str,
}

#[derive(Serialize)]
struct CommandsSummary<'a> {
    success: bool,
    commands: &'a serde_json::Value,
}

/// Final line of a slash command lookup
pub fn commands_line(commands: &serde_json::Value) -> String {
    to_line(&CommandsSummary {
        success: true,
        commands,
    })
}

pub fn success_line(session_id: Option<&str>) -> String {
    to_line(&SuccessSummary {
        success: true,
        session_id,
    })
}

pub fn failure_line(error: &str) -> String {
    to_line(&FailureSummary {
        success: false,
        error,
    })
}

/// Escape line breaks and backslashes in free text
fn escape_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn to_line(summary: &impl Serialize) -> String {
    serde_json::to_string(summary)
        .unwrap_or_else(|_| r#"{"success":false,"error":"Unserializable summary"}"#.to_string())
}
