use std::path::{Path, PathBuf};

use ccp_protocol::DEFAULT_RELAY_BIND;
use serde::{Deserialize, Serialize};

use crate::RelayError;

/// Relay settings, read from `relay.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Address the HTTP/WebSocket listener binds to.
    pub bind_addr: String,
    /// Concurrent WebSocket connections accepted before answering 503.
    pub max_connections: usize,
    /// Routing trace events kept in memory for `/api/trace`.
    pub trace_capacity: usize,
    /// Correlation routes remembered before the oldest is evicted.
    pub route_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_RELAY_BIND.to_string(),
            max_connections: 256,
            trace_capacity: 1000,
            route_capacity: 4096,
        }
    }
}

impl RelayConfig {
    /// `<config dir>/ccp/relay.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("ccp").join("relay.toml"))
    }

    /// Load from an explicit path, or from the default path when it exists.
    ///
    /// An explicit path that cannot be read is an error; a missing default
    /// file just yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, RelayError> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, RelayError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
            .map_err(|e| RelayError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml(text: &str) -> Result<Self, RelayError> {
        toml::from_str(text).map_err(|e| RelayError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let cfg = RelayConfig::from_toml("max_connections = 8\n").unwrap();
        assert_eq!(cfg.max_connections, 8);
        assert_eq!(cfg.bind_addr, "127.0.0.1:8000");
        assert_eq!(cfg.route_capacity, 4096);
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bind_addr = \"0.0.0.0:9100\"\ntrace_capacity = 5").unwrap();

        let cfg = RelayConfig::load(Some(file.path())).unwrap();
        assert_eq!(cfg.bind_addr, "0.0.0.0:9100");
        assert_eq!(cfg.trace_capacity, 5);
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(RelayConfig::load(Some(&missing)).is_err());
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let err = RelayConfig::from_toml("max_connections = \"many\"").unwrap_err();
        assert!(matches!(err, RelayError::Config(_)));
    }
}
