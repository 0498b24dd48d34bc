//! Engine version gating.

use std::fmt;

use crate::error::{Error, Result};

/// Oldest engine this crate talks to: 1.6, the first with labels on images.
pub const MINIMAL_ENGINE_VERSION: EngineVersion = EngineVersion { major: 1, minor: 6 };

/// `major.minor` pair, compared lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EngineVersion {
    pub major: u32,
    pub minor: u32,
}

impl EngineVersion {
    /// Parses `<major>.<minor>[...]`. Anything after the minor component is
    /// ignored, so `24.0.7` and `1.13.1-rc2` both parse.
    pub fn parse(version: &str) -> Result<Self> {
        let mut parts = version.split('.');
        let (Some(major), Some(minor)) = (parts.next(), parts.next()) else {
            return Err(unparsable(version, "expected <major>.<minor>"));
        };
        let major = major
            .trim()
            .parse()
            .map_err(|_| unparsable(version, "unparsable major version"))?;
        let minor = minor
            .trim()
            .parse()
            .map_err(|_| unparsable(version, "unparsable minor version"))?;
        Ok(EngineVersion { major, minor })
    }

    /// Parses `version` and rejects it when it is older than `minimum`.
    pub fn check(version: &str, minimum: EngineVersion) -> Result<Self> {
        let parsed = Self::parse(version)?;
        if parsed < minimum {
            return Err(Error::Version {
                version: version.to_string(),
                reason: format!("older than the minimal supported version {minimum}"),
            });
        }
        Ok(parsed)
    }
}

impl fmt::Display for EngineVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

fn unparsable(version: &str, reason: &str) -> Error {
    Error::Version {
        version: version.to_string(),
        reason: reason.to_string(),
    }
}
