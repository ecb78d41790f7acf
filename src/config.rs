//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::variables::{is_identifier, Expression, Variable, WindowPolicy, WindowVariableDetector};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub window: WindowConfig,

    /// Variables defined for every query, name → literal
    #[serde(default)]
    pub variables: BTreeMap<String, toml::Value>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Query backend configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_url")]
    pub url: String,

    #[serde(default)]
    pub org_id: String,

    pub token: Option<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_url() -> String {
    "http://localhost:8086".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            org_id: String::new(),
            token: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Window period configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_desired_points")]
    pub desired_points: u32,

    #[serde(default = "default_min_period")]
    pub min_period_ms: i64,

    #[serde(default = "default_fallback_period")]
    pub fallback_period_ms: i64,

    #[serde(default = "default_use_presets")]
    pub use_presets: bool,

    #[serde(default = "default_identifiers")]
    pub identifiers: Vec<String>,
}

fn default_desired_points() -> u32 {
    WindowPolicy::default().desired_points
}

fn default_min_period() -> i64 {
    WindowPolicy::default().min_period_ms
}

fn default_fallback_period() -> i64 {
    WindowPolicy::default().fallback_period_ms
}

fn default_use_presets() -> bool {
    true
}

fn default_identifiers() -> Vec<String> {
    vec![crate::variables::WINDOW_PERIOD.to_string()]
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            desired_points: default_desired_points(),
            min_period_ms: default_min_period(),
            fallback_period_ms: default_fallback_period(),
            use_presets: default_use_presets(),
            identifiers: default_identifiers(),
        }
    }
}

impl WindowConfig {
    /// Window period policy described by this section
    pub fn policy(&self) -> WindowPolicy {
        WindowPolicy {
            desired_points: self.desired_points,
            min_period_ms: self.min_period_ms,
            fallback_period_ms: self.fallback_period_ms,
            use_presets: self.use_presets,
        }
    }

    /// Detector for the configured window identifiers
    pub fn detector(&self) -> WindowVariableDetector {
        WindowVariableDetector::new(self.identifiers.iter().cloned())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::from_toml(&content).map_err(|e| match e {
            ConfigError::Parse { error, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                error,
            },
            other => other,
        })
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            error: e.to_string(),
        })
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("fluxnote").join("config.toml")),
            Some(PathBuf::from("./fluxnote.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("FLUXNOTE_URL") {
            self.backend.url = url;
        }
        if let Ok(org_id) = std::env::var("FLUXNOTE_ORG_ID") {
            self.backend.org_id = org_id;
        }
        if let Ok(token) = std::env::var("FLUXNOTE_TOKEN") {
            self.backend.token = Some(token);
        }

        if let Ok(level) = std::env::var("FLUXNOTE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("FLUXNOTE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Variables declared in the `[variables]` section
    pub fn variables(&self) -> Result<Vec<Variable>, ConfigError> {
        self.variables
            .iter()
            .map(|(name, value)| {
                if !is_identifier(name) {
                    return Err(ConfigError::InvalidVariable {
                        name: name.clone(),
                        error: "not a valid identifier".to_string(),
                    });
                }
                let expression = match value {
                    toml::Value::String(s) => Expression::parse_literal(s),
                    toml::Value::Integer(i) => Expression::Integer(*i),
                    toml::Value::Float(f) => Expression::Float(*f),
                    toml::Value::Boolean(b) => Expression::Boolean(*b),
                    toml::Value::Datetime(dt) => Expression::parse_literal(&dt.to_string()),
                    other => {
                        return Err(ConfigError::InvalidVariable {
                            name: name.clone(),
                            error: format!("unsupported value type {}", other.type_str()),
                        })
                    }
                };
                Ok(Variable::new(name.clone(), expression))
            })
            .collect()
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid variable '{name}': {error}")]
    InvalidVariable { name: String, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# fluxnote Configuration
#
# Environment variables override these settings:
# - FLUXNOTE_URL
# - FLUXNOTE_ORG_ID
# - FLUXNOTE_TOKEN
# - FLUXNOTE_LOG_LEVEL
# - FLUXNOTE_LOG_FORMAT

[backend]
# Query backend base URL
url = "http://localhost:8086"

# Organization the queries run in
org_id = ""

# API token (prefer FLUXNOTE_TOKEN)
# token = ""

# Request timeout in seconds
request_timeout_secs = 30

[window]
# Target number of points per series when computing v.windowPeriod
desired_points = 360

# Smallest window period ever produced (ms)
min_period_ms = 1

# Window period used when the time range span is unknown (ms)
fallback_period_ms = 15000

# Use fixed periods for well-known ranges (1h -> 10s, 24h -> 4m, ...)
use_presets = true

# Identifiers that trigger a computed window period
identifiers = ["windowPeriod"]

[variables]
# Injected into every query as v.<name>
# bucket = "telegraf"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.backend.url, "http://localhost:8086");
        assert_eq!(config.window.desired_points, 360);
        assert_eq!(config.window.identifiers, vec!["windowPeriod"]);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_generated_config_parses() {
        let config = Config::from_toml(&generate_default_config()).unwrap();
        assert_eq!(config.backend.request_timeout_secs, 30);
        assert_eq!(config.window.policy(), WindowPolicy::default());
        assert!(config.variables.is_empty());
    }

    #[test]
    fn test_load_file_with_variables() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[backend]
url = "http://influx:8086"
org_id = "abc123"

[window]
desired_points = 100

[variables]
bucket = "prod"
limit = 10
ratio = 0.5
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.backend.org_id, "abc123");
        assert_eq!(config.window.policy().desired_points, 100);

        let vars = config.variables().unwrap();
        assert_eq!(vars.len(), 3);
        let bucket = vars.iter().find(|v| v.name == "bucket").unwrap();
        assert_eq!(bucket.resolve()[0].value, Expression::String("prod".into()));
        let limit = vars.iter().find(|v| v.name == "limit").unwrap();
        assert_eq!(limit.resolve()[0].value, Expression::Integer(10));
    }

    #[test]
    fn test_invalid_variable_name() {
        let config = Config::from_toml("[variables]\n\"bad-name\" = 1\n").unwrap();
        assert!(matches!(
            config.variables(),
            Err(ConfigError::InvalidVariable { .. })
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Path::new("/nonexistent/fluxnote.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
