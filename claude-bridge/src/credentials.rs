//! API credential resolution
//!
//! The key and the endpoint are resolved on independent chains. A local
//! settings file (`~/.claude/settings.json`, `env` section) always wins over
//! the process environment, and an unreadable or malformed settings file is
//! treated the same as a missing one.

use crate::config::{BridgeConfig, Environment};
use crate::constants::env;
use crate::error::{BridgeError, Result};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::path::Path;

/// Where a credential value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CredentialSource {
    #[serde(rename = "settings.json")]
    SettingsFile,
    #[serde(rename = "environment")]
    Environment,
    #[serde(rename = "default")]
    Default,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CredentialSource::SettingsFile => "settings.json",
            CredentialSource::Environment => "environment",
            CredentialSource::Default => "default",
        };
        f.write_str(label)
    }
}

/// Resolved API credentials for one agent call
///
/// Carried as a value into the agent runtime, which sets them on the child
/// process only.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub base_url: Option<String>,
    pub api_key_source: CredentialSource,
    pub base_url_source: CredentialSource,
}

impl Credentials {
    /// Key rendering safe for logs: first 10 and last 5 characters
    pub fn masked_api_key(&self) -> String {
        let chars: Vec<char> = self.api_key.chars().collect();
        if chars.len() <= 15 {
            return "*".repeat(chars.len());
        }
        let head: String = chars[..10].iter().collect();
        let tail: String = chars[chars.len() - 5..].iter().collect();
        format!("{}...{}", head, tail)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.masked_api_key())
            .field("base_url", &self.base_url)
            .field("api_key_source", &self.api_key_source)
            .field("base_url_source", &self.base_url_source)
            .finish()
    }
}

/// Resolve credentials from the configured settings file and the environment
pub fn resolve(config: &BridgeConfig, environment: &Environment) -> Result<Credentials> {
    let settings_env = config
        .settings_path
        .as_deref()
        .and_then(read_settings_env)
        .unwrap_or(Value::Null);

    let from_settings = |key: &str| -> Option<String> {
        settings_env
            .get(key)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    let (api_key, api_key_source) = if let Some(key) = from_settings(env::ANTHROPIC_API_KEY)
        .or_else(|| from_settings(env::ANTHROPIC_AUTH_TOKEN))
    {
        (key, CredentialSource::SettingsFile)
    } else if let Some(key) = environment.var(env::ANTHROPIC_API_KEY) {
        (key.to_string(), CredentialSource::Environment)
    } else {
        tracing::error!("No API key found in settings file or environment");
        return Err(BridgeError::Config("API Key not configured".to_string()));
    };

    let (base_url, base_url_source) = if let Some(url) = from_settings(env::ANTHROPIC_BASE_URL) {
        (Some(url), CredentialSource::SettingsFile)
    } else if let Some(url) = environment.var(env::ANTHROPIC_BASE_URL) {
        (Some(url.to_string()), CredentialSource::Environment)
    } else {
        (None, CredentialSource::Default)
    };

    let credentials = Credentials {
        api_key,
        base_url,
        api_key_source,
        base_url_source,
    };
    tracing::debug!(
        "Resolved API key {} from {}, base URL from {}",
        credentials.masked_api_key(),
        credentials.api_key_source,
        credentials.base_url_source
    );
    Ok(credentials)
}

fn read_settings_env(path: &Path) -> Option<Value> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            tracing::debug!("Settings file {} not readable: {}", path.display(), e);
            return None;
        }
    };
    match serde_json::from_str::<Value>(&content) {
        Ok(mut settings) => settings.get_mut("env").map(Value::take),
        Err(e) => {
            tracing::warn!("Ignoring malformed settings file {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_with_settings(dir: &TempDir, contents: Option<&str>) -> BridgeConfig {
        let path = dir.path().join("settings.json");
        if let Some(contents) = contents {
            std::fs::write(&path, contents).unwrap();
        }
        BridgeConfig {
            settings_path: Some(path),
            ..BridgeConfig::default()
        }
    }

    #[test]
    fn test_settings_key_beats_environment() {
        let dir = TempDir::new().unwrap();
        let config = config_with_settings(
            &dir,
            Some(r#"{"env":{"ANTHROPIC_API_KEY":"sk-settings-000000000"}}"#),
        );
        let environment = Environment::empty().with_var("ANTHROPIC_API_KEY", "sk-env");

        let creds = resolve(&config, &environment).unwrap();
        assert_eq!(creds.api_key, "sk-settings-000000000");
        assert_eq!(creds.api_key_source, CredentialSource::SettingsFile);
    }

    #[test]
    fn test_auth_token_used_when_settings_key_missing() {
        let dir = TempDir::new().unwrap();
        let config = config_with_settings(
            &dir,
            Some(r#"{"env":{"ANTHROPIC_AUTH_TOKEN":"token-from-settings"}}"#),
        );
        let creds = resolve(&config, &Environment::empty()).unwrap();
        assert_eq!(creds.api_key, "token-from-settings");
        assert_eq!(creds.api_key_source, CredentialSource::SettingsFile);
    }

    #[test]
    fn test_chains_are_independent() {
        let dir = TempDir::new().unwrap();
        let config = config_with_settings(
            &dir,
            Some(r#"{"env":{"ANTHROPIC_BASE_URL":"https://proxy.internal"}}"#),
        );
        let environment = Environment::empty()
            .with_var("ANTHROPIC_API_KEY", "sk-env-key")
            .with_var("ANTHROPIC_BASE_URL", "https://env.example");

        let creds = resolve(&config, &environment).unwrap();
        assert_eq!(creds.api_key, "sk-env-key");
        assert_eq!(creds.api_key_source, CredentialSource::Environment);
        assert_eq!(creds.base_url.as_deref(), Some("https://proxy.internal"));
        assert_eq!(creds.base_url_source, CredentialSource::SettingsFile);
    }

    #[test]
    fn test_malformed_settings_treated_as_absent() {
        let dir = TempDir::new().unwrap();
        let config = config_with_settings(&dir, Some("{not json"));
        let environment = Environment::empty().with_var("ANTHROPIC_API_KEY", "sk-env-key");

        let creds = resolve(&config, &environment).unwrap();
        assert_eq!(creds.api_key_source, CredentialSource::Environment);
        assert_eq!(creds.base_url, None);
        assert_eq!(creds.base_url_source, CredentialSource::Default);
    }

    #[test]
    fn test_missing_key_is_config_error() {
        let dir = TempDir::new().unwrap();
        let config = config_with_settings(&dir, None);

        let err = resolve(&config, &Environment::empty()).unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
        assert_eq!(err.to_string(), "API Key not configured");
    }

    #[test]
    fn test_masked_key_hides_middle() {
        let creds = Credentials {
            api_key: "sk-ant-REDACTED".to_string(),
            base_url: None,
            api_key_source: CredentialSource::Environment,
            base_url_source: CredentialSource::Default,
        };
        assert_eq!(creds.masked_api_key(), "sk-ant-api...XYZ12");
        assert!(!format!("{:?}", creds).contains("abcdefghijklmnop"));
    }
}
