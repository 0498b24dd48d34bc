use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::{ContainerId, VolumeId};
use crate::services::ServiceId;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub fn generate() -> Self {
        JobId(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        JobId(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Created,
    Staging,
    Running,
    Completed,
    Error,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Completed | Status::Error)
    }
}

/// Where a job stands. Replaced as a whole on every transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobState {
    pub status: Status,
    /// Human-readable progress or failure message.
    pub detail: String,
    pub error: Option<String>,
    /// Exit code of the last container; set once the job is terminal.
    pub code: Option<i64>,
}

impl JobState {
    pub fn created() -> Self {
        JobState {
            status: Status::Created,
            detail: "Created".to_string(),
            error: None,
            code: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// One container run made on behalf of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub name: String,
    pub container_id: Option<ContainerId>,
    pub exit_code: Option<i64>,
    pub error: Option<String>,
}

/// A requested execution of a service against an input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub service_id: ServiceId,
    /// Opaque staging token handed to the staging image, e.g. a PID.
    pub input: String,
    pub created: DateTime<Utc>,
    pub state: JobState,
    pub input_volume: Option<VolumeId>,
    pub output_volume: Option<VolumeId>,
    pub tasks: Vec<TaskRecord>,
}

impl Job {
    pub fn new(service_id: ServiceId, input: impl Into<String>) -> Self {
        Job {
            id: JobId::generate(),
            service_id,
            input: input.into(),
            created: Utc::now(),
            state: JobState::created(),
            input_volume: None,
            output_volume: None,
            tasks: Vec::new(),
        }
    }
}
