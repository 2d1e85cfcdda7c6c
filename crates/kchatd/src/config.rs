//! Server configuration.
//!
//! Values are layered, later layers winning:
//!
//! 1. Built-in defaults
//! 2. TOML file (`--config`)
//! 3. Environment (`KCHAT_BIND`, `KCHAT_PORT`)
//! 4. Command-line flags (applied by the binary)
//!
//! ```toml
//! bind = "0.0.0.0"
//! port = 1337
//! max_line_length = 8192
//! write_timeout_ms = 10000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Default interface to listen on
pub const DEFAULT_BIND: &str = "0.0.0.0";

/// Default TCP port
pub const DEFAULT_PORT: u16 = 1337;

/// Longest accepted input line, in bytes
pub const DEFAULT_MAX_LINE_LENGTH: usize = 8192;

/// Per-write timeout for client outputs
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 10_000;

/// Environment variable overriding the bind address
pub const ENV_BIND: &str = "KCHAT_BIND";

/// Environment variable overriding the port
pub const ENV_PORT: &str = "KCHAT_PORT";

/// Runtime settings for the chat server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Interface address to bind
    pub bind: String,

    /// TCP port; 0 picks an ephemeral port
    pub port: u16,

    /// Lines longer than this end the session
    pub max_line_length: usize,

    /// Upper bound on a single write to a client
    pub write_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
        }
    }
}

impl ServerConfig {
    /// Loads a config file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse { error, .. } => ConfigError::Parse {
                path: Some(path.to_path_buf()),
                error,
            },
            other => other,
        })
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: None,
            error: e.to_string(),
        })
    }

    /// Applies `KCHAT_BIND` and `KCHAT_PORT` from the process environment.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary variable lookup.
    ///
    /// Empty values are ignored.
    pub fn apply_env_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup(ENV_BIND).filter(|v| !v.is_empty()) {
            self.bind = bind;
        }

        if let Some(port) = lookup(ENV_PORT).filter(|v| !v.is_empty()) {
            self.port = port.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                key: ENV_PORT,
                value: port.clone(),
            })?;
        }

        Ok(self)
    }

    /// Returns the `host:port` string to bind.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {error}", path.display())]
    Read { path: PathBuf, error: String },

    #[error("Invalid config{}: {error}", describe_path(path))]
    Parse {
        path: Option<PathBuf>,
        error: String,
    },

    #[error("Invalid value for {key}: {value:?}")]
    InvalidEnv { key: &'static str, value: String },
}

fn describe_path(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" in {}", p.display()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.listen_addr(), "0.0.0.0:1337");
        assert_eq!(config.max_line_length, 8192);
        assert_eq!(config.write_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ServerConfig::from_toml_str("port = 4000\n").unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(config.bind, DEFAULT_BIND);
        assert_eq!(config.max_line_length, DEFAULT_MAX_LINE_LENGTH);
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = ServerConfig::from_toml_str("").unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = ServerConfig::from_toml_str("prot = 4000\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { path: None, .. }));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bind = \"127.0.0.1\"").unwrap();
        writeln!(file, "write_timeout_ms = 250").unwrap();

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.listen_addr(), "127.0.0.1:1337");
        assert_eq!(config.write_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_from_file_parse_error_names_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = \"not a number\"").unwrap();

        let err = ServerConfig::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }

    #[test]
    fn test_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ServerConfig::from_file(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let config = ServerConfig::default()
            .apply_env_from(env(&[(ENV_BIND, "127.0.0.1"), (ENV_PORT, "9000")]))
            .unwrap();
        assert_eq!(config.listen_addr(), "127.0.0.1:9000");
    }

    #[test]
    fn test_empty_env_ignored() {
        let config = ServerConfig::default()
            .apply_env_from(env(&[(ENV_BIND, ""), (ENV_PORT, "")]))
            .unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn test_invalid_env_port() {
        let err = ServerConfig::default()
            .apply_env_from(env(&[(ENV_PORT, "seventy")]))
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid value for KCHAT_PORT: \"seventy\"");
    }
}
