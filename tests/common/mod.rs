//! In-memory engine used by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use pier::engine::{
    Bind, BuildProgress, Connector, ContainerId, Engine, EngineClient, EngineConfig, Image,
    ImageId, Volume, VolumeId,
};
use pier::jobs::{Job, JobId, Status};
use pier::pier::{Pier, STAGING_SERVICE_NAME};
use pier::{Error, Result};

pub const STAGING_IMAGE: &str = "sha256:stage";
pub const SERVICE_IMAGE: &str = "sha256:service";

#[derive(Debug, Clone)]
pub struct CreatedContainer {
    pub id: ContainerId,
    pub image: ImageId,
    pub cmd: Vec<String>,
    pub binds: Vec<Bind>,
}

/// Scriptable engine. Containers exit with the code registered for their
/// image (0 by default).
#[derive(Default)]
pub struct MockEngine {
    pub version: Mutex<String>,
    pub images: Mutex<Vec<Image>>,
    pub build_events: Mutex<Vec<BuildProgress>>,
    /// Transport error appended after the build events, if set.
    pub build_disconnect: Mutex<Option<String>>,
    pub exit_codes: Mutex<HashMap<ImageId, i64>>,
    pub failing_starts: Mutex<Vec<ImageId>>,
    pub failing_volume_creates: AtomicUsize,
    pub ping_failures: AtomicUsize,
    pub pings: AtomicUsize,
    pub wait_millis: AtomicU64,
    pub created: Mutex<Vec<CreatedContainer>>,
    pub removed_containers: Mutex<Vec<ContainerId>>,
    pub volumes: Mutex<Vec<VolumeId>>,
    pub removed_volumes: Mutex<Vec<VolumeId>>,
    next_id: AtomicUsize,
}

impl MockEngine {
    pub fn new(version: &str) -> Arc<Self> {
        let engine = MockEngine::default();
        *engine.version.lock().unwrap() = version.to_string();
        Arc::new(engine)
    }

    pub fn add_image(&self, id: &str, labels: &[(&str, &str)]) {
        self.images.lock().unwrap().push(Image {
            id: ImageId::from(id),
            repo_tag: format!("{id}:latest"),
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            created: None,
            size: 0,
        });
    }

    pub fn set_exit_code(&self, image: &str, code: i64) {
        self.exit_codes
            .lock()
            .unwrap()
            .insert(ImageId::from(image), code);
    }

    pub fn fail_start(&self, image: &str) {
        self.failing_starts.lock().unwrap().push(ImageId::from(image));
    }

    /// Makes every container run for `millis` before exiting.
    pub fn slow_containers(&self, millis: u64) {
        self.wait_millis.store(millis, Ordering::SeqCst);
    }

    pub fn fail_next_pings(&self, count: usize) {
        self.ping_failures.store(count, Ordering::SeqCst);
    }

    pub fn created(&self) -> Vec<CreatedContainer> {
        self.created.lock().unwrap().clone()
    }

    pub fn removed_containers(&self) -> Vec<ContainerId> {
        self.removed_containers.lock().unwrap().clone()
    }

    fn next(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn image_of(&self, container: &ContainerId) -> Option<ImageId> {
        self.created
            .lock()
            .unwrap()
            .iter()
            .find(|c| &c.id == container)
            .map(|c| c.image.clone())
    }
}

#[async_trait]
impl Engine for MockEngine {
    async fn ping(&self) -> Result<()> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        let remaining = self.ping_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.ping_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::Transport("connection reset by peer".to_string()));
        }
        Ok(())
    }

    async fn version(&self) -> Result<String> {
        Ok(self.version.lock().unwrap().clone())
    }

    async fn list_images(&self) -> Result<Vec<Image>> {
        Ok(self.images.lock().unwrap().clone())
    }

    async fn inspect_image(&self, id: &ImageId) -> Result<Image> {
        self.images
            .lock()
            .unwrap()
            .iter()
            .find(|image| &image.id == id)
            .cloned()
            .ok_or_else(|| Error::Engine {
                status: Some(404),
                message: format!("No such image: {id}"),
            })
    }

    fn build_image(&self, _context: Vec<u8>) -> BoxStream<'_, Result<BuildProgress>> {
        let events: Vec<Result<BuildProgress>> = self
            .build_events
            .lock()
            .unwrap()
            .iter()
            .cloned()
            .map(Ok)
            .chain(
                self.build_disconnect
                    .lock()
                    .unwrap()
                    .clone()
                    .map(|reason| Err(Error::Transport(reason))),
            )
            .collect();
        stream::iter(events).boxed()
    }

    async fn create_container(
        &self,
        image: &ImageId,
        cmd: &[String],
        binds: &[Bind],
    ) -> Result<ContainerId> {
        let id = ContainerId(self.next("container"));
        self.created.lock().unwrap().push(CreatedContainer {
            id: id.clone(),
            image: image.clone(),
            cmd: cmd.to_vec(),
            binds: binds.to_vec(),
        });
        Ok(id)
    }

    async fn start_container(&self, id: &ContainerId) -> Result<()> {
        let image = self.image_of(id);
        if image.is_some_and(|image| self.failing_starts.lock().unwrap().contains(&image)) {
            return Err(Error::Engine {
                status: Some(500),
                message: "OCI runtime create failed".to_string(),
            });
        }
        Ok(())
    }

    async fn wait_container(&self, id: &ContainerId) -> Result<i64> {
        let millis = self.wait_millis.load(Ordering::SeqCst).max(5);
        tokio::time::sleep(Duration::from_millis(millis)).await;
        let code = self
            .image_of(id)
            .and_then(|image| self.exit_codes.lock().unwrap().get(&image).copied())
            .unwrap_or(0);
        Ok(code)
    }

    async fn remove_container(&self, id: &ContainerId) -> Result<()> {
        self.removed_containers.lock().unwrap().push(id.clone());
        Ok(())
    }

    async fn create_volume(&self) -> Result<Volume> {
        let failing = self.failing_volume_creates.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_volume_creates
                .store(failing - 1, Ordering::SeqCst);
            return Err(Error::Transport("engine went away".to_string()));
        }
        let id = VolumeId(self.next("volume"));
        self.volumes.lock().unwrap().push(id.clone());
        Ok(Volume {
            mountpoint: format!("/var/lib/docker/volumes/{id}/_data"),
            id,
        })
    }

    async fn inspect_volume(&self, id: &VolumeId) -> Result<Volume> {
        let exists = self.volumes.lock().unwrap().contains(id)
            && !self.removed_volumes.lock().unwrap().contains(id);
        if !exists {
            return Err(Error::Engine {
                status: Some(404),
                message: format!("get {id}: no such volume"),
            });
        }
        Ok(Volume {
            mountpoint: format!("/var/lib/docker/volumes/{id}/_data"),
            id: id.clone(),
        })
    }

    async fn remove_volume(&self, id: &VolumeId) -> Result<()> {
        self.removed_volumes.lock().unwrap().push(id.clone());
        Ok(())
    }
}

/// Hands out engines by endpoint; unknown endpoints refuse the connection.
#[derive(Default)]
pub struct MockConnector {
    pub engines: HashMap<String, Arc<MockEngine>>,
    pub connects: AtomicUsize,
}

impl MockConnector {
    pub fn with(endpoint: &str, engine: Arc<MockEngine>) -> Self {
        let mut connector = MockConnector::default();
        connector.engines.insert(endpoint.to_string(), engine);
        connector
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, config: &EngineConfig) -> Result<Arc<dyn Engine>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let endpoint = config.endpoint.clone().unwrap_or_default();
        match self.engines.get(&endpoint) {
            Some(engine) => Ok(engine.clone() as Arc<dyn Engine>),
            None => Err(Error::Transport(format!("connection refused: {endpoint}"))),
        }
    }
}

pub fn local_config() -> EngineConfig {
    EngineConfig::endpoint("unix:///mock.sock", "mock engine")
}

pub async fn client_for(engine: Arc<MockEngine>) -> EngineClient {
    let connector = Arc::new(MockConnector::with("unix:///mock.sock", engine));
    EngineClient::connect_first_of(&[local_config()], connector)
        .await
        .expect("mock engine should connect")
}

/// An engine holding a staging image and one runnable service image.
pub fn engine_with_catalog() -> Arc<MockEngine> {
    let engine = MockEngine::new("24.0.7");
    engine.add_image(
        STAGING_IMAGE,
        &[("eudat.gef.service.name", STAGING_SERVICE_NAME)],
    );
    engine.add_image(
        SERVICE_IMAGE,
        &[
            ("eudat.gef.service.name", "Word count"),
            ("eudat.gef.service.input.0.name", "Text"),
            ("eudat.gef.service.input.0.path", "/mnt/input"),
            ("eudat.gef.service.output.0.name", "Counts"),
            ("eudat.gef.service.output.0.path", "/mnt/output"),
        ],
    );
    engine
}

pub async fn pier_for(engine: Arc<MockEngine>) -> Pier {
    Pier::new(client_for(engine).await).await
}

/// Polls until the job reaches a terminal state.
pub async fn wait_for_terminal(pier: &Pier, id: &JobId) -> Job {
    for _ in 0..500 {
        let job = pier.get_job(id).expect("job should be registered");
        if job.state.is_terminal() {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} did not finish");
}

/// Polls the job until it is terminal and returns every distinct status seen,
/// in order.
pub async fn watch_statuses(pier: &Pier, id: &JobId) -> Vec<Status> {
    let mut seen: Vec<Status> = Vec::new();
    for _ in 0..5000 {
        let job = pier.get_job(id).expect("job should be registered");
        if seen.last() != Some(&job.state.status) {
            seen.push(job.state.status);
        }
        if job.state.is_terminal() {
            return seen;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("job {id} did not finish");
}
