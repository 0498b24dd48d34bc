//! Container engine access: connection management, version gating and the
//! image/container/volume primitives the job pipeline is built from.

pub mod backend;
pub mod client;
pub mod docker;
pub mod types;
pub mod version;

pub use backend::{BuildProgress, Connector, Engine};
pub use client::{EngineClient, Execution};
pub use docker::DockerConnector;
pub use types::{Bind, ContainerId, EngineConfig, Image, ImageId, Volume, VolumeId};
pub use version::{EngineVersion, MINIMAL_ENGINE_VERSION};
