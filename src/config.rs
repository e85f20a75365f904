//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub input: InputConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How delimited input is split into rows and fields
#[derive(Debug, Clone, Deserialize)]
pub struct InputConfig {
    #[serde(default = "default_field_delimiter")]
    pub field_delimiter: char,

    #[serde(default = "default_quote")]
    pub quote: char,

    /// Escape character inside quoted fields; doubled quotes when unset
    #[serde(default)]
    pub escape: Option<char>,

    /// Drop the first record (header)
    #[serde(default)]
    pub skip_first_line: bool,

    /// Drop the last record (footer)
    #[serde(default)]
    pub skip_last_line: bool,

    /// Lines starting with this character are ignored
    #[serde(default)]
    pub comment: Option<char>,
}

fn default_field_delimiter() -> char {
    ','
}

fn default_quote() -> char {
    '"'
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            field_delimiter: default_field_delimiter(),
            quote: default_quote(),
            escape: None,
            skip_first_line: false,
            skip_last_line: false,
            comment: None,
        }
    }
}

/// Result presentation
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// `text` prints the raw result, `json` a status report
    #[serde(default = "default_output_format")]
    pub format: String,
}

fn default_output_format() -> String {
    "text".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_output_format(),
        }
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

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
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
            dirs::config_dir().map(|p| p.join("objselect").join("config.toml")),
            Some(PathBuf::from("/etc/objselect/config.toml")),
            Some(PathBuf::from("./objselect.toml")),
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

        tracing::debug!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // Input overrides
        if let Some(delimiter) = lookup("OBJSELECT_DELIMITER").as_deref().and_then(single_char) {
            self.input.field_delimiter = delimiter;
        }
        if let Some(quote) = lookup("OBJSELECT_QUOTE").as_deref().and_then(single_char) {
            self.input.quote = quote;
        }
        if let Some(skip) = lookup("OBJSELECT_SKIP_FIRST_LINE").as_deref().and_then(parse_flag) {
            self.input.skip_first_line = skip;
        }
        if let Some(skip) = lookup("OBJSELECT_SKIP_LAST_LINE").as_deref().and_then(parse_flag) {
            self.input.skip_last_line = skip;
        }

        // Output overrides
        if let Some(format) = lookup("OBJSELECT_OUTPUT_FORMAT") {
            self.output.format = format;
        }

        // Logging overrides
        if let Some(level) = lookup("OBJSELECT_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("OBJSELECT_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

fn single_char(value: &str) -> Option<char> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r##"# objselect configuration
#
# Environment variables override these settings:
# - OBJSELECT_DELIMITER
# - OBJSELECT_QUOTE
# - OBJSELECT_SKIP_FIRST_LINE
# - OBJSELECT_SKIP_LAST_LINE
# - OBJSELECT_OUTPUT_FORMAT
# - OBJSELECT_LOG_LEVEL
# - OBJSELECT_LOG_FORMAT

[input]
# Field separator of the input records
field_delimiter = ","

# Quote character around fields
quote = '"'

# Escape character inside quoted fields (doubled quotes when unset)
# escape = "\\"

# Drop the header record
skip_first_line = false

# Drop the trailing record
skip_last_line = false

# Ignore lines starting with this character
# comment = "#"

[output]
# Output format: text, json
format = "text"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty, json
format = "pretty"
"##
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.input.field_delimiter, ',');
        assert_eq!(config.input.quote, '"');
        assert!(config.input.escape.is_none());
        assert!(!config.input.skip_first_line);
        assert_eq!(config.output.format, "text");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_generated_config_parses() {
        let text = generate_default_config();
        assert!(text.contains("# comment = \"#\""));
        assert!(text.trim_end().ends_with("format = \"pretty\""));

        let config: Config = toml::from_str(&text).unwrap();
        assert!(config.input.comment.is_none());
        assert_eq!(config.input.field_delimiter, ',');
        assert_eq!(config.input.quote, '"');
        assert_eq!(config.output.format, "text");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[input]\nfield_delimiter = \"|\"\nskip_first_line = true").unwrap();
        writeln!(file, "[logging]\nformat = \"json\"").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.input.field_delimiter, '|');
        assert!(config.input.skip_first_line);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.output.format, "text");
    }

    #[test]
    fn test_load_errors() {
        let err = Config::load(Path::new("/nonexistent/objselect.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[input\nbroken").unwrap();
        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().starts_with("Failed to parse config file"));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("OBJSELECT_DELIMITER", ";"),
            ("OBJSELECT_QUOTE", "too long"),
            ("OBJSELECT_SKIP_LAST_LINE", "yes"),
            ("OBJSELECT_OUTPUT_FORMAT", "json"),
            ("OBJSELECT_LOG_LEVEL", "debug"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.input.field_delimiter, ';');
        assert_eq!(config.input.quote, '"');
        assert!(config.input.skip_last_line);
        assert!(!config.input.skip_first_line);
        assert_eq!(config.output.format, "json");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "pretty");
    }
}
