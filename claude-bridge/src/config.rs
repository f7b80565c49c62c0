//! Configuration types for the Claude bridge
//!
//! Every component receives its settings through [`BridgeConfig`] and an
//! [`Environment`] snapshot instead of reading process globals directly, so a
//! single invocation can be reproduced in tests with a hand-built environment.

use crate::constants::{self, env};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Snapshot of the process environment the bridge depends on
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: HashMap<String, String>,
    home_dir: Option<PathBuf>,
    current_dir: Option<PathBuf>,
    temp_dir: PathBuf,
}

impl Environment {
    /// Capture variables and well-known directories from the running process
    pub fn capture() -> Self {
        Self {
            vars: std::env::vars().collect(),
            home_dir: dirs::home_dir(),
            current_dir: std::env::current_dir().ok(),
            temp_dir: std::env::temp_dir(),
        }
    }

    /// Empty environment, used as the starting point for tests
    pub fn empty() -> Self {
        Self {
            temp_dir: PathBuf::from("/tmp"),
            ..Default::default()
        }
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn with_home_dir(mut self, home: impl Into<PathBuf>) -> Self {
        self.home_dir = Some(home.into());
        self
    }

    pub fn with_current_dir(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(cwd.into());
        self
    }

    pub fn with_temp_dir(mut self, temp: impl Into<PathBuf>) -> Self {
        self.temp_dir = temp.into();
        self
    }

    /// Look up a variable, treating empty values as unset
    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    /// Whether a variable is set to a truthy value (`true` or `1`)
    pub fn flag(&self, key: &str) -> bool {
        matches!(
            self.var(key).map(|v| v.to_ascii_lowercase()).as_deref(),
            Some("true") | Some("1")
        )
    }

    /// The externally declared project path, if the host provided one
    pub fn project_path(&self) -> Option<&str> {
        self.var(env::IDEA_PROJECT_PATH)
            .or_else(|| self.var(env::PROJECT_PATH))
    }

    /// Every declared project path, in priority order
    pub fn project_paths(&self) -> Vec<&str> {
        [env::IDEA_PROJECT_PATH, env::PROJECT_PATH]
            .iter()
            .filter_map(|key| self.var(key))
            .collect()
    }

    pub fn home_dir(&self) -> Option<&Path> {
        self.home_dir.as_deref()
    }

    pub fn current_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }
}

/// Settings for the permission broker and its file channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionConfig {
    /// Directory holding `request-*.json` and `response-*.json` files
    pub dir: PathBuf,
    pub poll_interval_ms: u64,
    pub timeout_ms: u64,
    pub auto_allowed_tools: Vec<String>,
    pub dangerous_path_patterns: Vec<String>,
}

impl PermissionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self {
            dir: std::env::temp_dir().join(constants::PERMISSION_DIR_NAME),
            poll_interval_ms: constants::PERMISSION_POLL_INTERVAL.as_millis() as u64,
            timeout_ms: constants::PERMISSION_TIMEOUT.as_millis() as u64,
            auto_allowed_tools: to_strings(constants::AUTO_ALLOWED_TOOLS),
            dangerous_path_patterns: to_strings(constants::DANGEROUS_PATH_PATTERNS),
        }
    }
}

/// Main configuration structure for one bridge invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub model: String,
    pub max_turns: u32,
    /// Ceiling for the agent call to produce its first event
    pub query_timeout_ms: u64,
    /// Agent executable spawned by the CLI runtime
    pub claude_executable: PathBuf,
    /// Value for `CLAUDE_CODE_ENTRYPOINT` on the child process
    pub entrypoint: String,
    /// Local settings file consulted before the environment for credentials
    pub settings_path: Option<PathBuf>,
    /// Root of the persisted per-project session logs
    pub projects_dir: Option<PathBuf>,
    /// Prefixes treated as sandbox temp locations
    pub temp_path_prefixes: Vec<String>,
    pub permission: PermissionConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            model: constants::DEFAULT_MODEL.to_string(),
            max_turns: constants::DEFAULT_MAX_TURNS,
            query_timeout_ms: constants::QUERY_TIMEOUT.as_millis() as u64,
            claude_executable: PathBuf::from(constants::DEFAULT_CLAUDE_EXECUTABLE),
            entrypoint: constants::DEFAULT_ENTRYPOINT.to_string(),
            settings_path: None,
            projects_dir: None,
            temp_path_prefixes: to_strings(constants::TEMP_PATH_PREFIXES),
            permission: PermissionConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Build the configuration from an environment snapshot
    pub fn from_env(environment: &Environment) -> Self {
        let mut temp_path_prefixes = to_strings(constants::TEMP_PATH_PREFIXES);
        if let Some(tmpdir) = environment.var(env::TMPDIR) {
            temp_path_prefixes.push(tmpdir.to_string());
        }

        let permission_dir = environment
            .var(env::CLAUDE_PERMISSION_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|| environment.temp_dir().join(constants::PERMISSION_DIR_NAME));

        let claude_home = environment.home_dir().map(|home| home.join(".claude"));

        let query_timeout_ms = match environment.var(env::CLAUDE_BRIDGE_QUERY_TIMEOUT_MS) {
            Some(raw) => raw.trim().parse::<u64>().unwrap_or_else(|e| {
                tracing::warn!("Ignoring invalid query timeout {:?}: {}", raw, e);
                constants::QUERY_TIMEOUT.as_millis() as u64
            }),
            None => constants::QUERY_TIMEOUT.as_millis() as u64,
        };

        Self {
            query_timeout_ms,
            claude_executable: environment
                .var(env::CLAUDE_BRIDGE_CLAUDE_PATH)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(constants::DEFAULT_CLAUDE_EXECUTABLE)),
            entrypoint: environment
                .var(env::CLAUDE_CODE_ENTRYPOINT)
                .unwrap_or(constants::DEFAULT_ENTRYPOINT)
                .to_string(),
            settings_path: claude_home.as_ref().map(|dir| dir.join("settings.json")),
            projects_dir: claude_home.as_ref().map(|dir| dir.join("projects")),
            temp_path_prefixes,
            permission: PermissionConfig {
                dir: permission_dir,
                ..PermissionConfig::default()
            },
            ..Self::default()
        }
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    /// Override the model, ignoring empty values
    pub fn with_model(mut self, model: Option<&str>) -> Self {
        if let Some(model) = model.filter(|m| !m.trim().is_empty()) {
            self.model = model.trim().to_string();
        }
        self
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}
