//! Parser for the service label convention.
//!
//! Keys live under [`SERVICE_LABEL_PREFIX`]. After the prefix the first
//! segment is `name`, `description`, `version`, or a port direction
//! (`input`/`output`) followed by a port index and a port field:
//!
//! ```text
//! eudat.gef.service.name               = Word count
//! eudat.gef.service.input.0.name       = Text corpus
//! eudat.gef.service.input.0.path       = /mnt/input
//! eudat.gef.service.output.0.path      = /mnt/output
//! ```
//!
//! Malformed keys are skipped with a warning; they never fail the service.

use std::collections::{BTreeMap, HashMap};

use tracing::warn;

use super::types::IOPort;

pub const SERVICE_LABEL_PREFIX: &str = "eudat.gef.service.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    fn port_prefix(self) -> &'static str {
        match self {
            Direction::Input => "input",
            Direction::Output => "output",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortField {
    Name,
    Path,
}

/// A label key with the prefix stripped, in typed form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelKey {
    Name,
    Description,
    Version,
    Port {
        direction: Direction,
        index: u8,
        field: PortField,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LabelKeyError {
    #[error("unknown service label field '{0}'")]
    UnknownField(String),
    #[error("port label must be '<direction>.<index>.<field>'")]
    MalformedPortKey,
    #[error("port index '{0}' is not a small non-negative integer")]
    BadIndex(String),
    #[error("unknown port field '{0}'")]
    UnknownPortField(String),
}

impl LabelKey {
    /// Parses a key with the prefix already removed.
    pub fn parse(key: &str) -> Result<Self, LabelKeyError> {
        let segments: Vec<&str> = key.split('.').collect();
        // Exact grammar: trailing segments (`name.x`, `input.0.path.x`) are
        // rejected rather than ignored.
        let direction = match segments[0] {
            "name" if segments.len() == 1 => return Ok(LabelKey::Name),
            "description" if segments.len() == 1 => return Ok(LabelKey::Description),
            "version" if segments.len() == 1 => return Ok(LabelKey::Version),
            "input" => Direction::Input,
            "output" => Direction::Output,
            _ => return Err(LabelKeyError::UnknownField(key.to_string())),
        };

        let [_, index, field] = segments.as_slice() else {
            return Err(LabelKeyError::MalformedPortKey);
        };
        let index = index
            .parse::<u8>()
            .map_err(|_| LabelKeyError::BadIndex(index.to_string()))?;
        let field = match *field {
            "name" => PortField::Name,
            "path" => PortField::Path,
            other => return Err(LabelKeyError::UnknownPortField(other.to_string())),
        };

        Ok(LabelKey::Port {
            direction,
            index,
            field,
        })
    }
}

/// Service metadata recovered from an image's labels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceLabels {
    pub name: String,
    pub description: String,
    pub version: String,
    pub input: Vec<IOPort>,
    pub output: Vec<IOPort>,
}

impl ServiceLabels {
    /// Extracts service metadata. Labels outside the prefix are ignored.
    ///
    /// Ports are collected by index; ports without a path are dropped and the
    /// survivors get ids `input0`, `input1`, ... in index order.
    pub fn parse(labels: &HashMap<String, String>) -> Self {
        let mut parsed = ServiceLabels::default();
        let mut input: BTreeMap<u8, IOPort> = BTreeMap::new();
        let mut output: BTreeMap<u8, IOPort> = BTreeMap::new();

        // Sorted so diagnostics come out in a stable order.
        let sorted: BTreeMap<&String, &String> = labels.iter().collect();
        for (key, value) in sorted {
            let Some(key) = key.strip_prefix(SERVICE_LABEL_PREFIX) else {
                continue;
            };
            let label = match LabelKey::parse(key) {
                Ok(label) => label,
                Err(err) => {
                    warn!(label = %key, %value, "skipping service label: {}", err);
                    continue;
                }
            };

            match label {
                LabelKey::Name => parsed.name = value.clone(),
                LabelKey::Description => parsed.description = value.clone(),
                LabelKey::Version => parsed.version = value.clone(),
                LabelKey::Port {
                    direction,
                    index,
                    field,
                } => {
                    let ports = match direction {
                        Direction::Input => &mut input,
                        Direction::Output => &mut output,
                    };
                    let port = ports.entry(index).or_default();
                    match field {
                        PortField::Name => port.name = value.clone(),
                        PortField::Path => port.path = value.clone(),
                    }
                }
            }
        }

        parsed.input = renumber(Direction::Input, input);
        parsed.output = renumber(Direction::Output, output);
        parsed
    }
}

fn renumber(direction: Direction, ports: BTreeMap<u8, IOPort>) -> Vec<IOPort> {
    ports
        .into_values()
        .filter(|port| !port.path.is_empty())
        .enumerate()
        .map(|(n, port)| IOPort {
            id: format!("{}{}", direction.port_prefix(), n),
            ..port
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn port(id: &str, name: &str, path: &str) -> IOPort {
        IOPort {
            id: id.to_string(),
            name: name.to_string(),
            path: path.to_string(),
        }
    }

    #[test]
    fn test_scalar_fields() {
        let parsed = ServiceLabels::parse(&labels(&[
            ("eudat.gef.service.name", "Word count"),
            ("eudat.gef.service.description", "Counts words"),
            ("eudat.gef.service.version", "1.2"),
        ]));
        assert_eq!(parsed.name, "Word count");
        assert_eq!(parsed.description, "Counts words");
        assert_eq!(parsed.version, "1.2");
        assert!(parsed.input.is_empty());
        assert!(parsed.output.is_empty());
    }

    #[test]
    fn test_gapped_ports_are_renumbered() {
        let parsed = ServiceLabels::parse(&labels(&[
            ("eudat.gef.service.input.0.name", "a"),
            ("eudat.gef.service.input.0.path", "/in"),
            ("eudat.gef.service.input.2.path", "/in2"),
        ]));
        assert_eq!(
            parsed.input,
            vec![port("input0", "a", "/in"), port("input1", "", "/in2")]
        );
    }

    #[test]
    fn test_ports_without_path_are_dropped() {
        let parsed = ServiceLabels::parse(&labels(&[
            ("eudat.gef.service.output.0.name", "nameless"),
            ("eudat.gef.service.output.1.name", "result"),
            ("eudat.gef.service.output.1.path", "/out"),
        ]));
        assert_eq!(parsed.output, vec![port("output0", "result", "/out")]);
    }

    #[test]
    fn test_ports_ordered_by_index_not_key_text() {
        // "10" sorts before "9" as text.
        let parsed = ServiceLabels::parse(&labels(&[
            ("eudat.gef.service.input.10.path", "/ten"),
            ("eudat.gef.service.input.9.path", "/nine"),
        ]));
        let paths: Vec<&str> = parsed.input.iter().map(|p| p.path.as_str()).collect();
        assert_eq!(paths, vec!["/nine", "/ten"]);
        assert_eq!(parsed.input[1].id, "input1");
    }

    #[test]
    fn test_foreign_labels_ignored() {
        let parsed = ServiceLabels::parse(&labels(&[
            ("maintainer", "someone"),
            ("eudat.gef.name", "wrong prefix"),
        ]));
        assert_eq!(parsed, ServiceLabels::default());
    }

    #[test]
    fn test_malformed_keys_are_skipped_not_fatal() {
        let parsed = ServiceLabels::parse(&labels(&[
            ("eudat.gef.service.name", "ok"),
            ("eudat.gef.service.colour", "blue"),
            ("eudat.gef.service.input", "/missing-index"),
            ("eudat.gef.service.input.0", "/missing-field"),
            ("eudat.gef.service.input.x.path", "/bad-index"),
            ("eudat.gef.service.input.-1.path", "/negative"),
            ("eudat.gef.service.input.999.path", "/too-large"),
            ("eudat.gef.service.input.0.mode", "rw"),
            ("eudat.gef.service.input.1.path", "/good"),
        ]));
        assert_eq!(parsed.name, "ok");
        assert_eq!(parsed.input, vec![port("input0", "", "/good")]);
    }

    #[test]
    fn test_parse_key_variants() {
        assert_eq!(LabelKey::parse("name"), Ok(LabelKey::Name));
        assert_eq!(
            LabelKey::parse("output.3.path"),
            Ok(LabelKey::Port {
                direction: Direction::Output,
                index: 3,
                field: PortField::Path,
            })
        );
        assert_eq!(
            LabelKey::parse("name.extra"),
            Err(LabelKeyError::UnknownField("name.extra".to_string()))
        );
        assert_eq!(LabelKey::parse("input.0"), Err(LabelKeyError::MalformedPortKey));
        assert_eq!(
            LabelKey::parse("input.0.path.more"),
            Err(LabelKeyError::MalformedPortKey)
        );
        assert_eq!(
            LabelKey::parse("input.one.path"),
            Err(LabelKeyError::BadIndex("one".to_string()))
        );
        assert_eq!(
            LabelKey::parse("input.0.size"),
            Err(LabelKeyError::UnknownPortField("size".to_string()))
        );
    }
}
