//! The service catalog: runnable images described by their labels.

pub mod catalog;
pub mod labels;
pub mod types;

pub use catalog::ServiceCatalog;
pub use labels::{SERVICE_LABEL_PREFIX, ServiceLabels};
pub use types::{IOPort, Service, ServiceId};
