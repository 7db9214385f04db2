use std::path::{Path, PathBuf};
use std::time::Duration;

use ccp_protocol::{DEFAULT_PLANNER_TIMEOUT_SECS, DEFAULT_RELAY_URL, DEFAULT_RESPONSE_TIMEOUT_SECS};
use serde::{Deserialize, Serialize};

use crate::error::ControllerError;
use crate::session::SessionConfig;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// HTTP endpoint receiving planning requests.
    pub endpoint: Option<String>,
}

/// Controller settings, read from `controller.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub relay_url: String,
    pub client_id: String,
    pub response_timeout_secs: u64,
    pub planner_timeout_secs: u64,
    pub planner: PlannerConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            relay_url: DEFAULT_RELAY_URL.to_string(),
            client_id: "ccp-controller".to_string(),
            response_timeout_secs: DEFAULT_RESPONSE_TIMEOUT_SECS,
            planner_timeout_secs: DEFAULT_PLANNER_TIMEOUT_SECS,
            planner: PlannerConfig::default(),
        }
    }
}

impl ControllerConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("ccp").join("controller.toml"))
    }

    pub fn load(path: Option<&Path>) -> Result<Self, ControllerError> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ControllerError> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text)
            .map_err(|e| ControllerError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            response_timeout: Duration::from_secs(self.response_timeout_secs),
            planner_timeout: Duration::from_secs(self.planner_timeout_secs),
        }
    }
}
