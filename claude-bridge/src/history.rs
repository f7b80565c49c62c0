//! Reader for persisted session logs
//!
//! The agent appends one JSON object per line to
//! `<projects dir>/<project slug>/<session id>.jsonl`, where the slug is the
//! working directory with every UTF-16 code unit outside `[A-Za-z0-9]`
//! replaced by `-`.

use crate::error::{BridgeError, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Directory name used for a project under the projects dir
pub fn project_slug(cwd: &Path) -> String {
    let mut slug = String::new();
    for c in cwd.to_string_lossy().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else {
            // One dash per UTF-16 code unit, as the agent names its directories
            slug.extend(std::iter::repeat_n('-', c.len_utf16()));
        }
    }
    slug
}

/// Location of a session's log file
pub fn session_file(projects_dir: &Path, cwd: &Path, session_id: &str) -> PathBuf {
    projects_dir
        .join(project_slug(cwd))
        .join(format!("{}.jsonl", session_id))
}

/// Read every parseable event of a session, in file order
pub async fn read_session(projects_dir: &Path, cwd: &Path, session_id: &str) -> Result<Vec<Value>> {
    if session_id.is_empty()
        || session_id.contains(['/', '\\'])
        || session_id.starts_with('.')
    {
        return Err(BridgeError::InvalidRequest(format!(
            "Invalid session id: {:?}",
            session_id
        )));
    }

    let path = session_file(projects_dir, cwd, session_id);
    let content = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No session log at {}", path.display());
            return Err(BridgeError::SessionNotFound(session_id.to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    let mut messages = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(message) => messages.push(message),
            Err(e) => tracing::warn!("Skipping line {} of {}: {}", index + 1, path.display(), e),
        }
    }
    tracing::info!("Loaded {} messages for session {}", messages.len(), session_id);
    Ok(messages)
}
