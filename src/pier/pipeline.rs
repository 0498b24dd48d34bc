//! The per-job pipeline, run on its own task.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::engine::{Bind, EngineClient, ImageId};
use crate::jobs::{JobId, JobRegistry, JobState, Step, StepOutcome, TaskRecord, transition};
use crate::services::Service;

/// Where the staging image expects its target volume.
const STAGING_MOUNT_PATH: &str = "/volume";
const STAGING_TASK_NAME: &str = "Stage in";

/// Everything one job run needs, captured when the job is submitted.
pub(crate) struct JobRun {
    pub job_id: JobId,
    pub service: Service,
    pub input: String,
    pub staging_image: Option<ImageId>,
    pub client: Arc<EngineClient>,
    pub jobs: Arc<JobRegistry>,
}

impl JobRun {
    /// Runs the job to a terminal state. Volumes stay behind as the job's
    /// artifacts; containers are removed after each wait.
    pub async fn run(self) {
        let mut state = JobState::created();

        // Only the first input and the first output port are wired.
        let (input_port, output_port) =
            match (self.service.input.first(), self.service.output.first()) {
                (Some(input), Some(output)) => (input.clone(), output.clone()),
                (_, None) => {
                    let outcome = StepOutcome::Failed("service declares no output port".into());
                    self.advance(&mut state, Step::CheckPorts, outcome);
                    return;
                }
                (None, _) => {
                    let outcome = StepOutcome::Failed("service declares no input port".into());
                    self.advance(&mut state, Step::CheckPorts, outcome);
                    return;
                }
            };

        let input_volume = match self.client.new_volume().await {
            Ok(volume) => volume,
            Err(err) => {
                let outcome = StepOutcome::Failed(err.to_string());
                self.advance(&mut state, Step::CreateInputVolume, outcome);
                return;
            }
        };
        self.record_volume(self.jobs.set_input_volume(&self.job_id, input_volume.id.clone()));
        if !self.advance(&mut state, Step::CreateInputVolume, StepOutcome::Done) {
            return;
        }

        let outcome = match &self.staging_image {
            Some(staging_image) => {
                let binds = [Bind::new(input_volume.id.clone(), STAGING_MOUNT_PATH, false)];
                let cmd = [self.input.clone()];
                self.execute(STAGING_TASK_NAME, staging_image, &cmd, &binds).await
            }
            None => StepOutcome::Failed("no staging image is available".into()),
        };
        if !self.advance(&mut state, Step::StageInput, outcome) {
            return;
        }

        let output_volume = match self.client.new_volume().await {
            Ok(volume) => volume,
            Err(err) => {
                let outcome = StepOutcome::Failed(err.to_string());
                self.advance(&mut state, Step::CreateOutputVolume, outcome);
                return;
            }
        };
        self.record_volume(self.jobs.set_output_volume(&self.job_id, output_volume.id.clone()));
        if !self.advance(&mut state, Step::CreateOutputVolume, StepOutcome::Done) {
            return;
        }

        let binds = [
            Bind::new(input_volume.id, input_port.path, true),
            Bind::new(output_volume.id, output_port.path, false),
        ];
        let task_name = self.service.name.clone();
        let outcome = self
            .execute(&task_name, &self.service.image_id, &[], &binds)
            .await;
        self.advance(&mut state, Step::ExecuteService, outcome);
    }

    /// Applies `outcome` and publishes the new state. Returns whether the job
    /// should continue.
    fn advance(&self, state: &mut JobState, step: Step, outcome: StepOutcome) -> bool {
        let next = transition(state, step, &outcome);
        if next != *state {
            if let Err(err) = self.jobs.set_state(&self.job_id, next.clone()) {
                warn!(job_id = %self.job_id, %err, "failed to publish job state");
            }
            if next.error.is_some() {
                error!(job_id = %self.job_id, status = ?next.status, "{}", next.detail);
            } else {
                info!(job_id = %self.job_id, status = ?next.status, "{}", next.detail);
            }
        }
        *state = next;
        !state.is_terminal()
    }

    async fn execute(
        &self,
        name: &str,
        image: &ImageId,
        cmd: &[String],
        binds: &[Bind],
    ) -> StepOutcome {
        let (task, outcome) = match self.client.execute_image(image, cmd, binds, true).await {
            Ok(execution) => (
                TaskRecord {
                    name: name.to_string(),
                    container_id: Some(execution.container_id),
                    exit_code: Some(execution.exit_code),
                    error: None,
                },
                StepOutcome::Exited(execution.exit_code),
            ),
            Err(err) => (
                TaskRecord {
                    name: name.to_string(),
                    container_id: None,
                    exit_code: None,
                    error: Some(err.to_string()),
                },
                StepOutcome::Failed(err.to_string()),
            ),
        };
        if let Err(err) = self.jobs.add_task(&self.job_id, task) {
            warn!(job_id = %self.job_id, %err, "failed to record job task");
        }
        outcome
    }

    fn record_volume(&self, recorded: crate::error::Result<()>) {
        if let Err(err) = recorded {
            warn!(job_id = %self.job_id, %err, "failed to record job volume");
        }
    }
}
