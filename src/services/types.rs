use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::labels::ServiceLabels;
use crate::engine::{Image, ImageId};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceId(pub String);

impl ServiceId {
    pub fn generate() -> Self {
        ServiceId(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServiceId {
    fn from(value: &str) -> Self {
        ServiceId(value.to_string())
    }
}

/// A mount point a service reads its input from or writes its output to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IOPort {
    pub id: String,
    pub name: String,
    pub path: String,
}

/// A runnable image and its declared input/output contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub image_id: ImageId,
    pub name: String,
    pub description: String,
    pub version: String,
    pub repo_tag: String,
    pub created: Option<DateTime<Utc>>,
    pub size: i64,
    pub input: Vec<IOPort>,
    pub output: Vec<IOPort>,
}

impl Service {
    /// Describes `image` as a service. Every call mints a new service id, so
    /// calling it twice for one image yields two distinct catalog entries.
    pub fn from_image(image: &Image) -> Self {
        let labels = ServiceLabels::parse(&image.labels);
        Service {
            id: ServiceId::generate(),
            image_id: image.id.clone(),
            name: labels.name,
            description: labels.description,
            version: labels.version,
            repo_tag: image.repo_tag.clone(),
            created: image.created,
            size: image.size,
            input: labels.input,
            output: labels.output,
        }
    }
}
