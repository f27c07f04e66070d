use serde::{Deserialize, Serialize};
use std::{fs, net::SocketAddr, path::PathBuf};

use crate::error::{LinkError, LinkResult};
use crate::history::DEFAULT_HISTORY_CAPACITY;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5050;
pub const DEFAULT_BUFFER_SIZE: usize = 65536;

/// Process-wide settings, fixed at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Single-read request limit in bytes. Larger requests are truncated.
    pub buffer_size: usize,
    pub history_capacity: usize,
    pub anomaly_model_path: Option<PathBuf>,
    pub navigation_model_path: Option<PathBuf>,
    pub navigation_meta_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            buffer_size: DEFAULT_BUFFER_SIZE,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            anomaly_model_path: None,
            navigation_model_path: None,
            navigation_meta_path: None,
        }
    }
}

impl ServerConfig {
    /// Load from a JSON file; absent keys keep their defaults.
    pub fn load(path: &str) -> LinkResult<Self> {
        let data = fs::read_to_string(path)
            .map_err(|e| LinkError::Config(format!("cannot read {path}: {e}")))?;
        Self::from_json(&data)
    }

    pub fn from_json(json: &str) -> LinkResult<Self> {
        serde_json::from_str(json).map_err(|e| LinkError::Config(format!("JSON parse error: {e}")))
    }

    pub fn validate(&self) -> LinkResult<()> {
        if self.buffer_size == 0 {
            return Err(LinkError::Config("buffer_size must be > 0".to_string()));
        }
        if self.history_capacity == 0 {
            return Err(LinkError::Config("history_capacity must be > 0".to_string()));
        }
        self.listen_addr()?;
        Ok(())
    }

    pub fn listen_addr(&self) -> LinkResult<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| LinkError::Config(format!("invalid listen address {}:{}: {e}", self.host, self.port)))
    }
}
