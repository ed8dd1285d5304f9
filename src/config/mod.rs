//! Configuration management for Colloquy
//!
//! This module provides configuration loading and saving.
//! Configuration is loaded from `~/.colloquy/config.json` (or an explicit
//! JSON/YAML file) with environment variable overrides.

mod types;
pub mod validate;

pub use types::*;

use std::path::{Path, PathBuf};

use crate::error::{ColloquyError, Result};

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "COLLOQUY";

/// On-disk encoding of a config file, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    Json,
    Yaml,
    /// Unknown extension: try JSON, then YAML.
    Either,
}

impl FileFormat {
    fn of(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("yaml") | Some("yml") => Self::Yaml,
            Some("json") | None => Self::Json,
            Some(_) => Self::Either,
        }
    }
}

impl Config {
    /// Returns the Colloquy configuration directory path (~/.colloquy)
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".colloquy")
    }

    /// Returns the path to the config file (~/.colloquy/config.json)
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load configuration from the default path with environment overrides.
    ///
    /// If the config file doesn't exist, returns default configuration.
    /// Environment variables can override config values using the pattern:
    /// `COLLOQUY_SECTION_KEY`
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::path())
    }

    /// Load configuration from a specific path with environment overrides.
    ///
    /// `.yaml`/`.yml` files are parsed as YAML, `.json` (or no extension) as
    /// JSON; anything else is tried as JSON first and then as YAML.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::parse(&content, FileFormat::of(path))?
        } else {
            Config::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn parse(content: &str, format: FileFormat) -> Result<Self> {
        match format {
            FileFormat::Json => Ok(serde_json::from_str(content)?),
            FileFormat::Yaml => Ok(serde_yaml::from_str(content)?),
            FileFormat::Either => serde_json::from_str(content).or_else(|json_err| {
                serde_yaml::from_str(content).map_err(|yaml_err| {
                    ColloquyError::Config(format!(
                        "failed to parse config file (tried JSON: {}; YAML: {})",
                        json_err, yaml_err
                    ))
                })
            }),
        }
    }

    /// Apply `COLLOQUY_*` environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup (keys are full variable names).
    ///
    /// Values that fail to parse are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |section: &str, key: &str| lookup(&format!("{}_{}_{}", ENV_PREFIX, section, key));

        // Model
        if let Some(val) = var("MODEL", "API_KEY") {
            self.model.api_key = Some(val);
        }
        if let Some(val) = var("MODEL", "BASE_URL") {
            self.model.base_url = val;
        }
        if let Some(val) = var("MODEL", "MODEL") {
            self.model.model = val;
        }
        if let Some(v) = var("MODEL", "MAX_TOKENS").and_then(|v| v.parse().ok()) {
            self.model.max_tokens = Some(v);
        }
        if let Some(v) = var("MODEL", "TEMPERATURE").and_then(|v| v.parse().ok()) {
            self.model.temperature = Some(v);
        }

        // Agent
        if let Some(val) = var("AGENT", "SYSTEM_PROMPT") {
            self.agent.system_prompt = val;
        }
        if let Some(v) = var("AGENT", "MAX_HISTORY").and_then(|v| v.parse().ok()) {
            self.agent.max_history = v;
        }
        if let Some(v) = var("AGENT", "STREAM_BUFFER").and_then(|v| v.parse().ok()) {
            self.agent.stream_buffer = v;
        }

        // Memory
        if let Some(v) = var("MEMORY", "BACKEND").and_then(|v| v.parse().ok()) {
            self.memory.backend = v;
        }
        if let Some(val) = var("MEMORY", "PATH") {
            self.memory.path = Some(val);
        }

        // Compaction
        if let Some(v) = var("COMPACTION", "ENABLED").and_then(|v| v.parse().ok()) {
            self.compaction.enabled = v;
        }
        if let Some(v) = var("COMPACTION", "MAX_TOKENS_BEFORE_SUMMARY").and_then(|v| v.parse().ok())
        {
            self.compaction.max_tokens_before_summary = v;
        }
        if let Some(v) =
            var("COMPACTION", "MAX_TOKENS_FOR_RECENT_MESSAGES").and_then(|v| v.parse().ok())
        {
            self.compaction.max_tokens_for_recent_messages = v;
        }
        if let Some(v) = var("COMPACTION", "SPLICE_SUMMARY").and_then(|v| v.parse().ok()) {
            self.compaction.splice_summary = v;
        }

        // Logging
        if let Some(val) = var("LOGGING", "LEVEL") {
            self.logging.level = val;
        }
        if let Some(v) = var("LOGGING", "FORMAT").and_then(|v| v.parse().ok()) {
            self.logging.format = v;
        }
        if let Some(val) = var("LOGGING", "FILE") {
            self.logging.file = Some(val);
        }
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::path())
    }

    /// Save configuration to a specific path, as YAML for `.yaml`/`.yml`
    /// and JSON otherwise.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = match FileFormat::of(path) {
            FileFormat::Yaml => serde_yaml::to_string(self)?,
            _ => serde_json::to_string_pretty(self)?,
        };
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Write a default configuration template to `path`.
    ///
    /// Refuses to overwrite an existing file.
    pub fn save_default(path: &Path) -> Result<()> {
        if path.exists() {
            return Err(ColloquyError::Config(format!(
                "{} already exists",
                path.display()
            )));
        }
        Config::default().save_to_path(path)
    }

    /// Run [`validate::validate_config`] on the raw contents of `path`.
    pub fn check_file(path: &Path) -> Result<Vec<validate::Diagnostic>> {
        let content = std::fs::read_to_string(path)?;
        let raw: serde_json::Value = match FileFormat::of(path) {
            FileFormat::Yaml => serde_yaml::from_str(&content)?,
            FileFormat::Json => serde_json::from_str(&content)?,
            FileFormat::Either => serde_json::from_str(&content)
                .or_else(|_| serde_yaml::from_str(&content))?,
        };
        Ok(validate::validate_config(&raw))
    }

    /// Session directory of the file backend, `~` expanded.
    pub fn sessions_path(&self) -> PathBuf {
        self.memory
            .path
            .as_deref()
            .map(expand_home)
            .unwrap_or_else(|| Self::dir().join("sessions"))
    }
}

/// Expand ~ to home directory in a path string
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            if let Some(stripped) = rest.strip_prefix('/') {
                return home.join(stripped);
            }
            if rest.is_empty() {
                return home;
            }
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.model.model, "gpt-4o");
        assert_eq!(config.model.base_url, "https://api.openai.com/v1");
        assert!(config.model.api_key.is_none());
        assert_eq!(config.agent.system_prompt, "You are a helpful AI assistant.");
        assert_eq!(config.agent.max_history, 0);
        assert_eq!(config.agent.stream_buffer, 100);
        assert_eq!(config.memory.backend, StoreBackend::Memory);
        assert!(!config.compaction.enabled);
        assert_eq!(config.compaction.max_tokens_before_summary, 2000);
        assert_eq!(config.compaction.max_tokens_for_recent_messages, 500);
        assert!(config.compaction.splice_summary);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_partial_json() {
        let json = r#"{"model": {"model": "gpt-4o-mini"}, "memory": {"backend": "file"}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.model.model, "gpt-4o-mini");
        assert_eq!(config.model.base_url, DEFAULT_BASE_URL); // Default
        assert_eq!(config.memory.backend, StoreBackend::File);
        assert_eq!(config.agent.stream_buffer, 100); // Default
    }

    #[test]
    fn test_load_yaml_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "agent:\n  max_history: 5\ncompaction:\n  enabled: true\n  splice_summary: false\n",
        )
        .unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.agent.max_history, 5);
        assert!(config.compaction.enabled);
        assert!(!config.compaction.splice_summary);
    }

    #[test]
    fn test_unknown_extension_falls_back_to_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("colloquy.conf");
        std::fs::write(&path, "logging:\n  level: debug\n").unwrap();
        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_invalid_json_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Config::load_from_path(&path),
            Err(ColloquyError::Json(_))
        ));
    }

    #[test]
    fn test_load_nonexistent() {
        let path = PathBuf::from("/nonexistent/path/config.json");
        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.model.model, DEFAULT_MODEL);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(lookup(&[
            ("COLLOQUY_MODEL_API_KEY", "sk-env"),
            ("COLLOQUY_MODEL_TEMPERATURE", "0.2"),
            ("COLLOQUY_AGENT_MAX_HISTORY", "3"),
            ("COLLOQUY_MEMORY_BACKEND", "FILE"),
            ("COLLOQUY_COMPACTION_ENABLED", "true"),
            ("COLLOQUY_LOGGING_FORMAT", "json"),
        ]));
        assert_eq!(config.model.api_key.as_deref(), Some("sk-env"));
        assert_eq!(config.model.temperature, Some(0.2));
        assert_eq!(config.agent.max_history, 3);
        assert_eq!(config.memory.backend, StoreBackend::File);
        assert!(config.compaction.enabled);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_env_override_bad_values_ignored() {
        let mut config = Config::default();
        config.apply_overrides(lookup(&[
            ("COLLOQUY_AGENT_MAX_HISTORY", "many"),
            ("COLLOQUY_MEMORY_BACKEND", "redis"),
        ]));
        assert_eq!(config.agent.max_history, 0);
        assert_eq!(config.memory.backend, StoreBackend::Memory);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        for name in ["config.json", "config.yml"] {
            let path = dir.path().join("nested").join(name);
            let mut config = Config::default();
            config.model.model = "test-model".to_string();
            config.compaction.max_tokens_before_summary = 42;
            config.save_to_path(&path).unwrap();

            let loaded = Config::load_from_path(&path).unwrap();
            assert_eq!(loaded.model.model, "test-model");
            assert_eq!(loaded.compaction.max_tokens_before_summary, 42);
        }
    }

    #[test]
    fn test_save_default_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        Config::save_default(&path).unwrap();
        assert!(path.exists());
        assert!(matches!(
            Config::save_default(&path),
            Err(ColloquyError::Config(_))
        ));
    }

    #[test]
    fn test_check_file_reports_unknown_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"modle": {}}"#).unwrap();
        let diags = Config::check_file(&path).unwrap();
        assert!(diags.iter().any(|d| d.message.contains("did you mean 'model'")));
    }

    #[test]
    fn test_expand_home() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand_home("~/x/y"), home.join("x/y"));
        assert_eq!(expand_home("~"), home);
        assert_eq!(expand_home("/abs/path"), PathBuf::from("/abs/path"));
        assert_eq!(expand_home("rel"), PathBuf::from("rel"));
    }

    #[test]
    fn test_sessions_path() {
        let mut config = Config::default();
        assert_eq!(config.sessions_path(), Config::dir().join("sessions"));
        config.memory.path = Some("/tmp/colloquy-sessions".into());
        assert_eq!(
            config.sessions_path(),
            PathBuf::from("/tmp/colloquy-sessions")
        );
    }

    #[test]
    fn test_config_dir_and_path() {
        assert!(Config::dir().ends_with(".colloquy"));
        assert!(Config::path().ends_with(".colloquy/config.json"));
    }
}
