use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use super::pipeline::JobRun;
use crate::config::Config;
use crate::engine::{DockerConnector, EngineClient, ImageId, Volume, VolumeId};
use crate::error::{Error, Result};
use crate::jobs::{Job, JobId, JobRegistry};
use crate::services::{Service, ServiceCatalog, ServiceId};

/// Name of the service whose image copies job input into a volume.
pub const STAGING_SERVICE_NAME: &str = "Volume Stage In";

/// Owns the engine client, the service catalog and the job registry, and is
/// the only component that runs containers.
#[derive(Debug)]
pub struct Pier {
    client: Arc<EngineClient>,
    services: ServiceCatalog,
    jobs: Arc<JobRegistry>,
    staging_image: Option<ImageId>,
}

impl Pier {
    /// Connects to the first usable engine in `config` and loads the catalog.
    pub async fn connect(config: &Config) -> Result<Self> {
        let connector = DockerConnector::new(Duration::from_secs(config.request_timeout_secs));
        let client = EngineClient::connect_first_of(&config.engines, Arc::new(connector)).await?;
        Ok(Self::new(client).await)
    }

    /// Builds the catalog from the images the engine already has and resolves
    /// the staging image. A failed listing leaves the catalog empty.
    pub async fn new(client: EngineClient) -> Self {
        let services = ServiceCatalog::new();
        match client.list_images().await {
            Ok(images) => {
                for image in &images {
                    services.add(Service::from_image(image));
                }
            }
            Err(err) => error!(%err, "error while initializing services"),
        }

        let staging_image = services
            .find_by_name(STAGING_SERVICE_NAME)
            .map(|service| service.image_id);
        match &staging_image {
            Some(image_id) => info!(%image_id, "using staging image"),
            None => warn!(
                "no '{}' service found, jobs will fail at staging",
                STAGING_SERVICE_NAME
            ),
        }

        Pier {
            client: Arc::new(client),
            services,
            jobs: Arc::new(JobRegistry::new()),
            staging_image,
        }
    }

    pub async fn engine_available(&self) -> bool {
        self.client.is_valid().await
    }

    /// Builds an image from `context_dir` and registers it as a service.
    pub async fn build_service(&self, context_dir: &Path) -> Result<Service> {
        let image = self.client.build_image(context_dir).await?;
        let service = Service::from_image(&image);
        self.services.add(service.clone());
        Ok(service)
    }

    pub fn list_services(&self) -> Vec<Service> {
        self.services.list()
    }

    pub fn get_service(&self, id: &ServiceId) -> Result<Service> {
        self.services.get(id)
    }

    /// Registers a new job for `service` and starts it on its own task.
    ///
    /// Returns at once. The returned job is a snapshot; poll
    /// [`Pier::get_job`] for progress.
    pub fn run_service(&self, service: &Service, input: impl Into<String>) -> Job {
        let job = Job::new(service.id.clone(), input);
        self.jobs.add(job.clone());
        info!(job_id = %job.id, service_id = %service.id, "job created");

        let run = JobRun {
            job_id: job.id.clone(),
            service: service.clone(),
            input: job.input.clone(),
            staging_image: self.staging_image.clone(),
            client: self.client.clone(),
            jobs: self.jobs.clone(),
        };
        tokio::spawn(run.run());

        job
    }

    pub fn list_jobs(&self) -> Vec<Job> {
        self.jobs.list()
    }

    pub fn get_job(&self, id: &JobId) -> Result<Job> {
        self.jobs
            .get(id)
            .ok_or_else(|| Error::not_found("job", id.to_string()))
    }

    pub async fn inspect_volume(&self, id: &VolumeId) -> Result<Volume> {
        self.client.inspect_volume(id).await
    }

    /// Inspects the volumes recorded on a job so far, input volume first.
    pub async fn job_volumes(&self, id: &JobId) -> Result<Vec<Volume>> {
        let job = self.get_job(id)?;
        let mut volumes = Vec::new();
        for volume in job.input_volume.iter().chain(job.output_volume.iter()) {
            volumes.push(self.client.inspect_volume(volume).await?);
        }
        Ok(volumes)
    }

    /// Forgets a finished job and removes its volumes. Running jobs are left
    /// alone. Volume removal is best effort.
    pub async fn remove_job(&self, id: &JobId) -> Result<Job> {
        let job = self.jobs.remove_terminal(id)?;
        for volume in job.input_volume.iter().chain(job.output_volume.iter()) {
            if let Err(err) = self.client.remove_volume(volume).await {
                warn!(job_id = %id, volume_id = %volume, %err, "failed to remove job volume");
            }
        }
        info!(job_id = %id, "job removed");
        Ok(job)
    }
}
