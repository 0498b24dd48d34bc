//! Job records, their state machine and the shared job registry.

pub mod registry;
pub mod state;
pub mod types;

pub use registry::JobRegistry;
pub use state::{Step, StepOutcome, transition, valid_status_transition};
pub use types::{Job, JobId, JobState, Status, TaskRecord};
