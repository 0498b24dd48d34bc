//! Docker Engine API adapter built on bollard.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bollard::{
    API_DEFAULT_VERSION, Docker,
    container::{
        Config, CreateContainerOptions, RemoveContainerOptions, StartContainerOptions,
        WaitContainerOptions,
    },
    errors::Error as DockerError,
    image::{BuildImageOptions, ListImagesOptions},
    models::{BuildInfo, HostConfig, ImageInspect, ImageSummary},
    volume::{CreateVolumeOptions, RemoveVolumeOptions},
};
use chrono::{DateTime, Utc};
use futures_util::stream::{self, BoxStream, StreamExt};
use tracing::{debug, info};

use super::backend::{BuildProgress, Connector, Engine};
use super::types::{Bind, ContainerId, EngineConfig, Image, ImageId, Volume, VolumeId};
use crate::error::{Error, Result};

/// Seconds bollard waits while establishing a connection.
const CONNECT_TIMEOUT_SECS: u64 = 120;

/// Opens bollard connections from [`EngineConfig`]s.
#[derive(Debug, Clone)]
pub struct DockerConnector {
    request_timeout: Duration,
}

impl DockerConnector {
    /// `request_timeout` bounds every request, including container waits.
    pub fn new(request_timeout: Duration) -> Self {
        DockerConnector { request_timeout }
    }
}

#[async_trait]
impl Connector for DockerConnector {
    async fn connect(&self, config: &EngineConfig) -> Result<Arc<dyn Engine>> {
        let docker = match (&config.endpoint, config.use_env) {
            (Some(endpoint), _) => connect_endpoint(endpoint)?,
            (None, true) => Docker::connect_with_local_defaults().map_err(classify)?,
            (None, false) => {
                return Err(Error::Configuration(
                    "empty engine configuration".to_string(),
                ));
            }
        };
        Ok(Arc::new(BollardEngine {
            client: docker.with_timeout(self.request_timeout),
        }))
    }
}

fn connect_endpoint(endpoint: &str) -> Result<Docker> {
    if let Some(path) = endpoint.strip_prefix("unix://") {
        return connect_unix(path);
    }
    if endpoint.starts_with("tcp://") || endpoint.starts_with("http://") {
        return Docker::connect_with_http(endpoint, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)
            .map_err(classify);
    }
    Err(Error::Configuration(format!(
        "unsupported engine endpoint scheme: {endpoint}"
    )))
}

#[cfg(unix)]
fn connect_unix(path: &str) -> Result<Docker> {
    Docker::connect_with_unix(path, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION).map_err(classify)
}

#[cfg(not(unix))]
fn connect_unix(path: &str) -> Result<Docker> {
    Err(Error::Configuration(format!(
        "unix sockets are not supported on this platform: {path}"
    )))
}

/// Server-side refusals are semantic; anything else means the engine could
/// not be reached or spoke garbage.
fn classify(err: DockerError) -> Error {
    match err {
        DockerError::DockerResponseServerError {
            status_code,
            message,
        } => Error::Engine {
            status: Some(status_code),
            message,
        },
        other => Error::Transport(other.to_string()),
    }
}

/// A live bollard connection.
#[derive(Debug, Clone)]
pub struct BollardEngine {
    client: Docker,
}

#[async_trait]
impl Engine for BollardEngine {
    async fn ping(&self) -> Result<()> {
        self.client.ping().await.map_err(classify)?;
        Ok(())
    }

    async fn version(&self) -> Result<String> {
        let version = self.client.version().await.map_err(classify)?;
        version
            .version
            .ok_or_else(|| Error::Transport("engine did not report a version".to_string()))
    }

    async fn list_images(&self) -> Result<Vec<Image>> {
        let images = self
            .client
            .list_images(Some(ListImagesOptions::<String> {
                all: false,
                ..Default::default()
            }))
            .await
            .map_err(classify)?;
        Ok(images.into_iter().map(image_from_summary).collect())
    }

    async fn inspect_image(&self, id: &ImageId) -> Result<Image> {
        let image = self
            .client
            .inspect_image(id.as_str())
            .await
            .map_err(classify)?;
        Ok(image_from_inspect(image))
    }

    fn build_image(&self, context: Vec<u8>) -> BoxStream<'_, Result<BuildProgress>> {
        let options = BuildImageOptions {
            dockerfile: "Dockerfile".to_string(),
            rm: true,
            forcerm: true,
            ..Default::default()
        };
        self.client
            .build_image(options, None, Some(context.into()))
            .map(|item| match item {
                Ok(info) => progress_from(info),
                Err(err) => vec![Err(classify(err))],
            })
            .flat_map(stream::iter)
            .boxed()
    }

    async fn create_container(
        &self,
        image: &ImageId,
        cmd: &[String],
        binds: &[Bind],
    ) -> Result<ContainerId> {
        let host_config = HostConfig {
            binds: Some(binds.iter().map(Bind::to_spec).collect()),
            ..Default::default()
        };

        let container_config = Config {
            image: Some(image.to_string()),
            cmd: (!cmd.is_empty()).then(|| cmd.to_vec()),
            host_config: Some(host_config),
            ..Default::default()
        };

        let response = self
            .client
            .create_container(None::<CreateContainerOptions<String>>, container_config)
            .await
            .map_err(classify)?;

        for warning in &response.warnings {
            debug!(container_id = %response.id, "create warning: {}", warning);
        }
        Ok(ContainerId(response.id))
    }

    async fn start_container(&self, id: &ContainerId) -> Result<()> {
        self.client
            .start_container(id.as_str(), None::<StartContainerOptions<String>>)
            .await
            .map_err(classify)
    }

    async fn wait_container(&self, id: &ContainerId) -> Result<i64> {
        let mut stream = self.client.wait_container(
            id.as_str(),
            Some(WaitContainerOptions {
                condition: "not-running",
            }),
        );

        let mut exit_code = None;
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(response) => exit_code = Some(response.status_code),
                // bollard reports a non-zero exit as an error; it is a status here.
                Err(DockerError::DockerContainerWaitError { code, .. }) => exit_code = Some(code),
                Err(err) => return Err(classify(err)),
            }
        }

        exit_code.ok_or_else(|| {
            Error::Transport(format!("wait on container {id} ended without a status"))
        })
    }

    async fn remove_container(&self, id: &ContainerId) -> Result<()> {
        self.client
            .remove_container(
                id.as_str(),
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(classify)
    }

    async fn create_volume(&self) -> Result<Volume> {
        let volume = self
            .client
            .create_volume(CreateVolumeOptions::<String>::default())
            .await
            .map_err(classify)?;
        info!(volume_id = %volume.name, "volume created");
        Ok(Volume {
            id: VolumeId(volume.name),
            mountpoint: volume.mountpoint,
        })
    }

    async fn inspect_volume(&self, id: &VolumeId) -> Result<Volume> {
        let volume = self
            .client
            .inspect_volume(id.as_str())
            .await
            .map_err(classify)?;
        Ok(Volume {
            id: VolumeId(volume.name),
            mountpoint: volume.mountpoint,
        })
    }

    async fn remove_volume(&self, id: &VolumeId) -> Result<()> {
        self.client
            .remove_volume(id.as_str(), None::<RemoveVolumeOptions>)
            .await
            .map_err(classify)
    }
}

fn progress_from(info: BuildInfo) -> Vec<Result<BuildProgress>> {
    if let Some(error) = info.error {
        return vec![Err(Error::engine(format!("image build failed: {error}")))];
    }

    let mut events: Vec<Result<BuildProgress>> = info
        .stream
        .as_deref()
        .unwrap_or_default()
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| Ok(BuildProgress::Line(line.to_string())))
        .collect();

    if let Some(id) = info.aux.and_then(|aux| aux.id) {
        events.push(Ok(BuildProgress::Built(ImageId(id))));
    }
    events
}

fn image_from_summary(image: ImageSummary) -> Image {
    Image {
        id: ImageId(image.id),
        repo_tag: image.repo_tags.into_iter().next().unwrap_or_default(),
        labels: image.labels,
        created: DateTime::<Utc>::from_timestamp(image.created, 0),
        size: image.size,
    }
}

fn image_from_inspect(image: ImageInspect) -> Image {
    let created = image
        .created
        .as_deref()
        .and_then(|created| DateTime::parse_from_rfc3339(created).ok())
        .map(|created| created.with_timezone(&Utc));

    Image {
        id: ImageId(image.id.unwrap_or_default()),
        repo_tag: image
            .repo_tags
            .and_then(|tags| tags.into_iter().next())
            .unwrap_or_default(),
        labels: image
            .config
            .and_then(|config| config.labels)
            .unwrap_or_default(),
        created,
        size: image.size.unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::models::ImageId as BuildAux;

    #[test]
    fn test_classify_server_error_is_semantic() {
        let err = classify(DockerError::DockerResponseServerError {
            status_code: 404,
            message: "No such image".to_string(),
        });
        assert!(err.is_not_found());
        assert!(!err.is_transport());
    }

    #[test]
    fn test_progress_splits_stream_lines() {
        let info = BuildInfo {
            stream: Some("Step 1/2 : FROM alpine\n\nSuccessfully built 0123abcd\n".to_string()),
            ..Default::default()
        };
        let events: Vec<_> = progress_from(info).into_iter().map(|e| e.unwrap()).collect();
        assert_eq!(
            events,
            vec![
                BuildProgress::Line("Step 1/2 : FROM alpine".to_string()),
                BuildProgress::Line("Successfully built 0123abcd".to_string()),
            ]
        );
    }

    #[test]
    fn test_progress_reports_aux_image_id() {
        let info = BuildInfo {
            aux: Some(BuildAux {
                id: Some("sha256:feed".to_string()),
            }),
            ..Default::default()
        };
        let events: Vec<_> = progress_from(info).into_iter().map(|e| e.unwrap()).collect();
        assert_eq!(events, vec![BuildProgress::Built(ImageId::from("sha256:feed"))]);
    }

    #[test]
    fn test_progress_error_fails_the_build() {
        let info = BuildInfo {
            error: Some("COPY failed".to_string()),
            ..Default::default()
        };
        let events = progress_from(info);
        assert_eq!(events.len(), 1);
        assert!(events[0].as_ref().unwrap_err().to_string().contains("COPY failed"));
    }

    #[test]
    fn test_image_from_summary_takes_first_tag() {
        let summary = ImageSummary {
            id: "sha256:1".to_string(),
            repo_tags: vec!["svc:latest".to_string(), "svc:1.0".to_string()],
            created: 1_500_000_000,
            size: 42,
            ..Default::default()
        };
        let image = image_from_summary(summary);
        assert_eq!(image.repo_tag, "svc:latest");
        assert_eq!(image.size, 42);
        assert!(image.created.is_some());
    }

    #[test]
    fn test_unsupported_scheme_is_configuration_error() {
        assert!(matches!(
            connect_endpoint("ftp://host"),
            Err(Error::Configuration(_))
        ));
    }
}
