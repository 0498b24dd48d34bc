//! Process configuration, read from a JSON file.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::engine::EngineConfig;
use crate::error::{Error, Result};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "PIER_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Engine candidates, tried in order.
    pub engines: Vec<EngineConfig>,
    pub server: ServerConfig,
    /// Directory that build contexts named over HTTP are resolved against.
    pub build_root: PathBuf,
    /// Upper bound on any single engine request, container waits included.
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            engines: vec![
                EngineConfig::endpoint("unix:///var/run/docker.sock", "local docker socket"),
                EngineConfig::from_env("docker from environment"),
            ],
            server: ServerConfig::default(),
            build_root: std::env::temp_dir().join("pier-builds"),
            request_timeout_secs: 24 * 60 * 60,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            address: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Loads from `path` when given, else from `$PIER_CONFIG`, else defaults.
    pub fn resolve(path: Option<PathBuf>) -> Result<Self> {
        match path.or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from)) {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    /// Resolves a build context named by a client against `build_root`.
    /// Absolute paths and `..` components are refused.
    pub fn build_dir(&self, name: &str) -> Result<PathBuf> {
        let relative = Path::new(name);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if name.is_empty() || escapes {
            return Err(Error::Validation(format!(
                "build directory '{name}' must be relative to the build root"
            )));
        }
        Ok(self.build_root.join(relative))
    }
}
