//! The seam between the engine client and a concrete engine API.
//!
//! [`Engine`] is one live connection; [`Connector`] opens connections from an
//! [`EngineConfig`] and is kept around so a lost connection can be rebuilt.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use super::types::{Bind, ContainerId, EngineConfig, Image, ImageId, Volume, VolumeId};
use crate::error::Result;

/// One event of an image build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildProgress {
    /// A line of human-readable build output.
    Line(String),
    /// The engine reported the built image out of band.
    Built(ImageId),
}

#[async_trait]
pub trait Engine: Send + Sync {
    async fn ping(&self) -> Result<()>;

    /// Raw version string, `<major>.<minor>[...]`.
    async fn version(&self) -> Result<String>;

    async fn list_images(&self) -> Result<Vec<Image>>;

    async fn inspect_image(&self, id: &ImageId) -> Result<Image>;

    /// Builds an image from a tar archive of a build context. A failed build
    /// surfaces as an `Err` item in the stream.
    fn build_image(&self, context: Vec<u8>) -> BoxStream<'_, Result<BuildProgress>>;

    async fn create_container(
        &self,
        image: &ImageId,
        cmd: &[String],
        binds: &[Bind],
    ) -> Result<ContainerId>;

    async fn start_container(&self, id: &ContainerId) -> Result<()>;

    /// Blocks until the container stops and returns its exit code.
    async fn wait_container(&self, id: &ContainerId) -> Result<i64>;

    /// Force-removes a container.
    async fn remove_container(&self, id: &ContainerId) -> Result<()>;

    async fn create_volume(&self) -> Result<Volume>;

    async fn inspect_volume(&self, id: &VolumeId) -> Result<Volume>;

    async fn remove_volume(&self, id: &VolumeId) -> Result<()>;
}

#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a connection. Does not ping; the client does that.
    async fn connect(&self, config: &EngineConfig) -> Result<Arc<dyn Engine>>;
}
