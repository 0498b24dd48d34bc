//! Orchestration: builds services and drives jobs through the engine.

mod pipeline;
#[allow(clippy::module_inception)]
pub mod pier;

pub use pier::{Pier, STAGING_SERVICE_NAME};
