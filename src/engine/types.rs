use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! engine_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                $name(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                $name(value)
            }
        }
    };
}

engine_id!(
    /// Engine-scoped image identifier.
    ImageId
);
engine_id!(
    /// Engine-scoped container identifier.
    ContainerId
);
engine_id!(
    /// Engine-scoped volume name.
    VolumeId
);

/// An image as reported by the engine. Labels carry the service metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub id: ImageId,
    pub repo_tag: String,
    pub labels: HashMap<String, String>,
    pub created: Option<DateTime<Utc>>,
    pub size: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub id: VolumeId,
    pub mountpoint: String,
}

/// Attaches a volume into a container at `mount_path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bind {
    pub volume_id: VolumeId,
    pub mount_path: String,
    pub read_only: bool,
}

impl Bind {
    pub fn new(volume_id: VolumeId, mount_path: impl Into<String>, read_only: bool) -> Self {
        Bind {
            volume_id,
            mount_path: mount_path.into(),
            read_only,
        }
    }

    /// Engine bind string, `volume:path` or `volume:path:ro`.
    pub fn to_spec(&self) -> String {
        if self.read_only {
            format!("{}:{}:ro", self.volume_id, self.mount_path)
        } else {
            format!("{}:{}", self.volume_id, self.mount_path)
        }
    }
}

/// One candidate way of reaching an engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// `unix:///var/run/docker.sock`, `tcp://host:2375` or `http://host:2375`.
    pub endpoint: Option<String>,
    /// Use the local defaults (honours `DOCKER_HOST`).
    pub use_env: bool,
    pub description: String,
}

impl EngineConfig {
    pub fn endpoint(endpoint: impl Into<String>, description: impl Into<String>) -> Self {
        EngineConfig {
            endpoint: Some(endpoint.into()),
            use_env: false,
            description: description.into(),
        }
    }

    pub fn from_env(description: impl Into<String>) -> Self {
        EngineConfig {
            endpoint: None,
            use_env: true,
            description: description.into(),
        }
    }
}

impl fmt::Display for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.endpoint, self.use_env) {
            (Some(endpoint), _) => write!(f, "Endpoint: {} -- {}", endpoint, self.description),
            (None, true) => write!(f, "Environment[DOCKER_HOST] -- {}", self.description),
            (None, false) => write!(f, "unknown -- {}", self.description),
        }
    }
}
