//! The job state machine as a pure function.

use std::collections::HashMap;

use super::types::{JobState, Status};

/// A step of the job pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    CheckPorts,
    CreateInputVolume,
    StageInput,
    CreateOutputVolume,
    ExecuteService,
}

/// What a step produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Done,
    /// A container ran to completion with this exit code.
    Exited(i64),
    /// The step could not be carried out (engine or validation error).
    Failed(String),
}

impl Step {
    fn failure_message(self) -> &'static str {
        match self {
            Step::CheckPorts => "Service cannot be run",
            Step::CreateInputVolume => "Error while creating new input volume",
            Step::StageInput => "Data staging failed",
            Step::CreateOutputVolume => "Error while creating new output volume",
            Step::ExecuteService => "Service failed",
        }
    }
}

pub fn valid_status_transition(src: Status, dst: Status) -> bool {
    let transitions: HashMap<Status, Vec<Status>> = {
        let mut map = HashMap::new();
        map.insert(Status::Created, vec![Status::Staging, Status::Error]);
        map.insert(Status::Staging, vec![Status::Running, Status::Error]);
        map.insert(
            Status::Running,
            vec![Status::Running, Status::Completed, Status::Error],
        );
        map.insert(Status::Completed, vec![]);
        map.insert(Status::Error, vec![]);
        map
    };

    transitions
        .get(&src)
        .is_some_and(|valid| valid.contains(&dst))
}

/// Computes the state that follows `state` once `step` produced `outcome`.
/// Terminal states absorb every outcome.
pub fn transition(state: &JobState, step: Step, outcome: &StepOutcome) -> JobState {
    if state.is_terminal() {
        return state.clone();
    }

    match outcome {
        StepOutcome::Failed(err) => JobState {
            status: Status::Error,
            detail: format!("{}: {}", step.failure_message(), err),
            error: Some(err.clone()),
            code: None,
        },
        StepOutcome::Exited(code) if *code != 0 => JobState {
            status: Status::Error,
            detail: format!("{} (exit code = {})", step.failure_message(), code),
            error: Some(format!("container exited with code {code}")),
            code: Some(*code),
        },
        StepOutcome::Done | StepOutcome::Exited(_) => advance(state, step),
    }
}

fn advance(state: &JobState, step: Step) -> JobState {
    let (status, detail, code) = match step {
        Step::CheckPorts => return state.clone(),
        Step::CreateInputVolume => (Status::Staging, "Staging input data", None),
        Step::StageInput => (Status::Running, "Input staged", None),
        Step::CreateOutputVolume => (Status::Running, "Running service", None),
        Step::ExecuteService => (Status::Completed, "Ended successfully", Some(0)),
    };
    JobState {
        status,
        detail: detail.to_string(),
        error: None,
        code,
    }
}
