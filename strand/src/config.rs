//! Engine configuration.

use crate::errors::ContextError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Smallest stack a context may be given.
pub const MIN_STACK_SIZE: usize = 16 * 1024;

/// Configuration for an [`Engine`](crate::engine::Engine).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Stack size in bytes for each context.
    #[serde(default = "default_stack_size")]
    pub stack_size: usize,
    /// Name given to the root context.
    #[serde(default = "default_root_name")]
    pub root_name: String,
    /// Default name for spawned contexts; also the profile name of their entry frame.
    #[serde(default = "default_context_name")]
    pub context_name: String,
    /// Whether to install a logging trace observer at startup.
    #[serde(default)]
    pub log_transfers: bool,
}

fn default_stack_size() -> usize {
    1024 * 1024 // 1MB
}

fn default_root_name() -> String {
    "main".to_string()
}

fn default_context_name() -> String {
    "run".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stack_size: default_stack_size(),
            root_name: default_root_name(),
            context_name: default_context_name(),
            log_transfers: false,
        }
    }
}

impl EngineConfig {
    /// Creates a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-context stack size.
    #[must_use]
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = bytes;
        self
    }

    /// Sets the root context name.
    #[must_use]
    pub fn with_root_name(mut self, name: impl Into<String>) -> Self {
        self.root_name = name.into();
        self
    }

    /// Sets the default context name.
    #[must_use]
    pub fn with_context_name(mut self, name: impl Into<String>) -> Self {
        self.context_name = name.into();
        self
    }

    /// Enables or disables the startup logging observer.
    #[must_use]
    pub fn with_log_transfers(mut self, enabled: bool) -> Self {
        self.log_transfers = enabled;
        self
    }

    /// Parses a configuration from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ContextError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ContextError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ContextError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ContextError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    /// Checks the configuration for values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ContextError> {
        if self.stack_size < MIN_STACK_SIZE {
            return Err(ContextError::Config(format!(
                "stack_size {} is below the minimum of {MIN_STACK_SIZE} bytes",
                self.stack_size
            )));
        }
        if self.root_name.is_empty() || self.context_name.is_empty() {
            return Err(ContextError::Config("context names must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::new();
        assert_eq!(config.stack_size, 1024 * 1024);
        assert_eq!(config.root_name, "main");
        assert_eq!(config.context_name, "run");
        assert!(!config.log_transfers);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::new()
            .with_stack_size(64 * 1024)
            .with_root_name("root")
            .with_context_name("worker")
            .with_log_transfers(true);

        assert_eq!(config.stack_size, 64 * 1024);
        assert_eq!(config.root_name, "root");
        assert_eq!(config.context_name, "worker");
        assert!(config.log_transfers);
    }

    #[test]
    fn test_from_json_partial() {
        let config = EngineConfig::from_json(r#"{"stack_size": 65536}"#).unwrap();
        assert_eq!(config.stack_size, 65536);
        assert_eq!(config.root_name, "main");
    }

    #[test]
    fn test_from_json_rejects_small_stack() {
        let err = EngineConfig::from_json(r#"{"stack_size": 1024}"#).unwrap_err();
        assert!(matches!(err, ContextError::Config(_)));
        assert!(err.to_string().contains("below the minimum"));
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(matches!(
            EngineConfig::from_json("not json"),
            Err(ContextError::Config(_))
        ));
    }

    #[test]
    fn test_validate_rejects_empty_names() {
        let config = EngineConfig::new().with_context_name("");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(file, r#"{{"root_name": "loop", "log_transfers": true}}"#)?;

        let config = EngineConfig::from_file(file.path())?;
        assert_eq!(config.root_name, "loop");
        assert!(config.log_transfers);
        Ok(())
    }

    #[test]
    fn test_from_missing_file() {
        let err = EngineConfig::from_file("/definitely/not/here.json").unwrap_err();
        assert!(err.to_string().contains("not/here.json"));
    }
}
