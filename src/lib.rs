//! Container-based job execution.
//!
//! Images describe themselves through labels and become services; running a
//! service stages its input into a fresh volume, runs the image against it and
//! leaves the output in another volume. Jobs run in the background and are
//! observed through the job registry.

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod pier;
pub mod services;

pub use error::{Error, Result};
