//! Validated engine connection with the primitives the job pipeline uses.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use futures_util::stream::StreamExt;
use tracing::{debug, info, warn};

use super::backend::{BuildProgress, Connector, Engine};
use super::types::{Bind, ContainerId, EngineConfig, Image, ImageId, Volume, VolumeId};
use super::version::{EngineVersion, MINIMAL_ENGINE_VERSION};
use crate::error::{Error, Result};

const BUILD_SUCCESS_PREFIX: &str = "Successfully built ";

/// Outcome of running a container to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub container_id: ContainerId,
    pub exit_code: i64,
}

/// A live engine connection plus what is needed to rebuild it.
///
/// Only [`EngineClient::build_image`] re-validates and reconnects; every other
/// operation surfaces transport errors as they are.
pub struct EngineClient {
    config: EngineConfig,
    connector: Arc<dyn Connector>,
    engine: RwLock<Arc<dyn Engine>>,
}

impl std::fmt::Debug for EngineClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl EngineClient {
    /// Tries every candidate in order and keeps the first one that answers a
    /// ping with a supported version. On exhaustion the error lists why each
    /// candidate was rejected.
    pub async fn connect_first_of(
        candidates: &[EngineConfig],
        connector: Arc<dyn Connector>,
    ) -> Result<Self> {
        if candidates.is_empty() {
            return Err(Error::Configuration(
                "no engine configurations given".to_string(),
            ));
        }

        let mut diagnostics = String::new();
        for config in candidates {
            let engine = match open(connector.as_ref(), config).await {
                Ok(engine) => engine,
                Err(err) => {
                    let _ = writeln!(
                        diagnostics,
                        "Failed to connect to engine using configuration:\n\t{config}\n\
                         Reason: {err}"
                    );
                    continue;
                }
            };

            match check_version(engine.as_ref()).await {
                Ok(version) => {
                    info!(%config, %version, "connected to container engine");
                    return Ok(EngineClient {
                        config: config.clone(),
                        connector,
                        engine: RwLock::new(engine),
                    });
                }
                Err(err) => {
                    let _ = writeln!(
                        diagnostics,
                        "Engine version check failed for configuration:\n\t{config}\n\
                         Reason: {err}"
                    );
                }
            }
        }

        Err(Error::Configuration(diagnostics))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn engine(&self) -> Arc<dyn Engine> {
        self.engine
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Live ping; not cached.
    pub async fn is_valid(&self) -> bool {
        self.engine().ping().await.is_ok()
    }

    pub async fn list_images(&self) -> Result<Vec<Image>> {
        self.engine().list_images().await
    }

    pub async fn inspect_image(&self, id: &ImageId) -> Result<Image> {
        self.engine().inspect_image(id).await
    }

    /// Builds an image from a directory holding a `Dockerfile`.
    ///
    /// The image id is taken from the `Successfully built` progress line, or
    /// from the engine's own report when no such line appears. Afterwards the
    /// connection is pinged and rebuilt from the original configuration if it
    /// was lost, so a dropped connection does not hide a finished build.
    pub async fn build_image(&self, context_dir: &Path) -> Result<Image> {
        let context = archive_context(context_dir).await?;

        let mut line_id = None;
        let mut reported_id = None;
        {
            let engine = self.engine();
            let mut progress = engine.build_image(context);
            while let Some(event) = progress.next().await {
                let event = match event {
                    Ok(event) => event,
                    Err(err) if line_id.is_some() && err.is_transport() => {
                        warn!(%err, "build stream broke after the image was built");
                        break;
                    }
                    Err(err) => return Err(err),
                };
                match event {
                    BuildProgress::Line(line) => {
                        debug!("build: {}", line);
                        if let Some(id) = parse_build_success(&line) {
                            line_id = Some(id);
                        }
                    }
                    BuildProgress::Built(id) => reported_id = Some(id),
                }
            }
        }

        self.revalidate().await?;

        let id = line_id.or(reported_id).ok_or_else(|| {
            Error::engine("image build finished without reporting an image id")
        })?;
        info!(image_id = %id, dir = %context_dir.display(), "image built");
        self.inspect_image(&id).await
    }

    /// Pings the current connection and replaces it when the ping fails.
    async fn revalidate(&self) -> Result<()> {
        let Err(err) = self.engine().ping().await else {
            return Ok(());
        };
        warn!(%err, config = %self.config, "engine connection lost, reconnecting");
        let engine = open(self.connector.as_ref(), &self.config).await?;
        *self.engine.write().unwrap_or_else(PoisonError::into_inner) = engine;
        Ok(())
    }

    /// Creates a container from `image` with `binds`, runs it to completion and
    /// returns its exit code. A container that fails to start is removed
    /// before the error is returned. With `auto_remove` the container is also
    /// removed after the wait, whatever its exit code.
    pub async fn execute_image(
        &self,
        image: &ImageId,
        cmd: &[String],
        binds: &[Bind],
        auto_remove: bool,
    ) -> Result<Execution> {
        let engine = self.engine();
        let container_id = engine.create_container(image, cmd, binds).await?;
        debug!(%container_id, image_id = %image, "container created");

        if let Err(err) = engine.start_container(&container_id).await {
            remove_quietly(engine.as_ref(), &container_id).await;
            return Err(err);
        }

        let waited = engine.wait_container(&container_id).await;
        if auto_remove {
            remove_quietly(engine.as_ref(), &container_id).await;
        }

        let exit_code = waited?;
        debug!(%container_id, exit_code, "container finished");
        Ok(Execution {
            container_id,
            exit_code,
        })
    }

    /// Creates an empty engine-managed volume.
    pub async fn new_volume(&self) -> Result<Volume> {
        self.engine().create_volume().await
    }

    pub async fn inspect_volume(&self, id: &VolumeId) -> Result<Volume> {
        self.engine().inspect_volume(id).await
    }

    pub async fn remove_volume(&self, id: &VolumeId) -> Result<()> {
        self.engine().remove_volume(id).await
    }
}

async fn open(connector: &dyn Connector, config: &EngineConfig) -> Result<Arc<dyn Engine>> {
    let engine = connector.connect(config).await?;
    engine.ping().await?;
    Ok(engine)
}

async fn check_version(engine: &dyn Engine) -> Result<EngineVersion> {
    let version = engine.version().await?;
    EngineVersion::check(&version, MINIMAL_ENGINE_VERSION)
}

async fn remove_quietly(engine: &dyn Engine, id: &ContainerId) {
    if let Err(err) = engine.remove_container(id).await {
        warn!(container_id = %id, %err, "failed to remove container");
    }
}

fn parse_build_success(line: &str) -> Option<ImageId> {
    let id = line.strip_prefix(BUILD_SUCCESS_PREFIX)?.trim();
    (!id.is_empty()).then(|| ImageId::from(id))
}

/// Packs a build context directory into an in-memory tar archive.
async fn archive_context(dir: &Path) -> Result<Vec<u8>> {
    if !dir.join("Dockerfile").is_file() {
        return Err(Error::Validation(format!(
            "build context {} has no Dockerfile",
            dir.display()
        )));
    }

    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
        let mut archive = tar::Builder::new(Vec::new());
        archive.follow_symlinks(false);
        archive.append_dir_all(".", &dir)?;
        Ok(archive.into_inner()?)
    })
    .await
    .map_err(|err| Error::Io(std::io::Error::other(err)))?
}
