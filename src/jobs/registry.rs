use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use tracing::warn;

use super::state::valid_status_transition;
use super::types::{Job, JobId, JobState, TaskRecord};
use crate::engine::VolumeId;
use crate::error::{Error, Result};

/// Shared store of job records.
///
/// Every accessor takes the lock for the duration of one operation and hands
/// out clones, so a returned [`Job`] is a snapshot. Updates never create a job.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: RwLock<BTreeMap<JobId, Job>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `job`, replacing any record with the same id.
    pub fn add(&self, job: Job) {
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job.id.clone(), job);
    }

    /// All jobs, ascending by id.
    pub fn list(&self) -> Vec<Job> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Replaces the state of job `id`. Refuses transitions the state machine
    /// does not allow, such as leaving a terminal state.
    pub fn set_state(&self, id: &JobId, state: JobState) -> Result<()> {
        self.update(id, |job| {
            if !valid_status_transition(job.state.status, state.status) {
                warn!(
                    job_id = %id,
                    from = ?job.state.status,
                    to = ?state.status,
                    "rejecting job state transition"
                );
                return Err(Error::Validation(format!(
                    "invalid job state transition from {:?} to {:?}",
                    job.state.status, state.status
                )));
            }
            job.state = state;
            Ok(())
        })
    }

    pub fn set_input_volume(&self, id: &JobId, volume: VolumeId) -> Result<()> {
        self.update(id, |job| {
            job.input_volume = Some(volume);
            Ok(())
        })
    }

    pub fn set_output_volume(&self, id: &JobId, volume: VolumeId) -> Result<()> {
        self.update(id, |job| {
            job.output_volume = Some(volume);
            Ok(())
        })
    }

    pub fn add_task(&self, id: &JobId, task: TaskRecord) -> Result<()> {
        self.update(id, |job| {
            job.tasks.push(task);
            Ok(())
        })
    }

    /// Removes and returns job `id`, but only once it is terminal.
    pub fn remove_terminal(&self, id: &JobId) -> Result<Job> {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let status = jobs
            .get(id)
            .map(|job| job.state.status)
            .ok_or_else(|| Error::not_found("job", id.to_string()))?;
        if !status.is_terminal() {
            return Err(Error::Validation(format!("job {id} is still {status:?}")));
        }
        jobs.remove(id)
            .ok_or_else(|| Error::not_found("job", id.to_string()))
    }

    fn update<F>(&self, id: &JobId, apply: F) -> Result<()>
    where
        F: FnOnce(&mut Job) -> Result<()>,
    {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| Error::not_found("job", id.to_string()))?;
        apply(job)
    }
}
