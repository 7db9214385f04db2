use std::path::{Path, PathBuf};

use ccp_protocol::DEFAULT_RELAY_URL;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Application settings, read from `app.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub relay_url: String,
    /// Overrides the id the application declares for itself.
    pub software_id: Option<String>,
    /// Seconds to wait before reconnecting after the relay goes away.
    pub reconnect_delay_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            relay_url: DEFAULT_RELAY_URL.to_string(),
            software_id: None,
            reconnect_delay_secs: 5,
        }
    }
}

impl AppConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("ccp").join("app.toml"))
    }

    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, AppError> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.toml");
        std::fs::write(&path, "software_id = \"shop-7\"\n").unwrap();

        let cfg = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.software_id.as_deref(), Some("shop-7"));
        assert_eq!(cfg.relay_url, "ws://127.0.0.1:8000");
        assert_eq!(cfg.reconnect_delay_secs, 5);
    }

    #[test]
    fn test_bad_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.toml");
        std::fs::write(&path, "reconnect_delay_secs = \"soon\"\n").unwrap();

        assert!(matches!(AppConfig::load(Some(&path)), Err(AppError::Config(_))));
    }
}
