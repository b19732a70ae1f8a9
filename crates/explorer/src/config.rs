//! Engine configuration.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_URL: &str = "http://localhost:10240";

/// Quiet window after the last edit before recompilation starts.
pub const DEFAULT_UPDATE_DELAY_MS: u64 = 1000;

/// Output filter flags forwarded to the remote compiler verbatim. The engine
/// never interprets them; the field names are the service's wire names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Filters {
    pub binary: bool,
    pub execute: bool,
    pub labels: bool,
    pub directives: bool,
    pub comment_only: bool,
    pub trim: bool,
    pub intel: bool,
    pub demangle: bool,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            binary: false,
            execute: false,
            labels: true,
            directives: true,
            comment_only: true,
            trim: false,
            intel: true,
            demangle: true,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    /// Base URL of the remote compilation service.
    pub url: String,
    /// Master switch: when off, every trigger is ignored.
    pub enabled: bool,
    /// Run the local preprocessor before submitting, instead of sending the
    /// raw source.
    pub preprocess_locally: bool,
    pub allow_minor_version_mismatch: bool,
    /// Extra switches, split shell-style, appended to the preprocessor
    /// invocation and forwarded to the remote compiler.
    pub additional_switches: String,
    pub update_delay_ms: u64,
    pub filters: Filters,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("EXPLORER_URL").unwrap_or_else(|_| DEFAULT_URL.into()),
            enabled: env_parsed("EXPLORER_ENABLED", true),
            preprocess_locally: env_parsed("EXPLORER_PREPROCESS_LOCALLY", true),
            allow_minor_version_mismatch: env_parsed("EXPLORER_ALLOW_MINOR_MISMATCH", false),
            additional_switches: std::env::var("EXPLORER_SWITCHES").unwrap_or_default(),
            update_delay_ms: env_parsed("EXPLORER_UPDATE_DELAY_MS", DEFAULT_UPDATE_DELAY_MS),
            filters: Filters::default(),
        }
    }
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl ExplorerConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    pub fn update_delay(&self) -> Duration {
        Duration::from_millis(self.update_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_sane() {
        let config = ExplorerConfig::default();
        assert!(config.enabled);
        assert!(config.preprocess_locally);
        assert!(!config.allow_minor_version_mismatch);
        assert_eq!(config.update_delay(), Duration::from_millis(1000));
    }

    #[test]
    fn filters_serialize_with_wire_names() {
        let value = serde_json::to_value(Filters::default()).unwrap();
        assert_eq!(value["commentOnly"], serde_json::json!(true));
        assert_eq!(value["binary"], serde_json::json!(false));
    }

    #[test]
    fn from_file_reads_partial_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "url = \"http://ce.example:8080\"\nallow_minor_version_mismatch = true\n\n\
             [filters]\nintel = false"
        )
        .unwrap();
        let config = ExplorerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.url, "http://ce.example:8080");
        assert!(config.allow_minor_version_mismatch);
        assert!(!config.filters.intel);
        // Unspecified fields keep their defaults.
        assert!(config.filters.demangle);
        assert_eq!(config.update_delay_ms, DEFAULT_UPDATE_DELAY_MS);
    }

    #[test]
    fn from_file_rejects_garbage() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "url = [not toml").unwrap();
        assert!(ExplorerConfig::from_file(file.path()).is_err());
    }
}
