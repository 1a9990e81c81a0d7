use crate::err::{ExtractionError, ExtractionResult, LookupError};
use crate::xml_tree::{DuplicateChildPolicy, XmlNode};

use log::trace;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

const EVENT_ID_PATH: &[&str] = &["System", "EventID"];
const PROVIDER_PATH: &[&str] = &["System", "Provider"];
const LEVEL_PATH: &[&str] = &["System", "Level"];
const PROVIDER_NAME_ATTRIBUTE: &str = "Name";

/// Standard event levels, as defined by `winmeta.xml`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    LogAlways,
    Critical,
    Error,
    Warning,
    Informational,
    Verbose,
}

impl Level {
    pub fn from_code(code: u8) -> Option<Level> {
        match code {
            0 => Some(Level::LogAlways),
            1 => Some(Level::Critical),
            2 => Some(Level::Error),
            3 => Some(Level::Warning),
            4 => Some(Level::Informational),
            5 => Some(Level::Verbose),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Level::LogAlways => "LogAlways",
            Level::Critical => "Critical",
            Level::Error => "Error",
            Level::Warning => "Warning",
            Level::Informational => "Informational",
            Level::Verbose => "Verbose",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Level {
    type Err = ExtractionError;

    /// Parses the numeric text of a `<Level>` element.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u8>()
            .ok()
            .and_then(Level::from_code)
            .ok_or_else(|| ExtractionError::LevelRange {
                value: s.to_owned(),
            })
    }
}

/// The derived fields that can be requested from a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldName {
    EventId,
    Provider,
    Level,
}

impl FieldName {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldName::EventId => "EventID",
            FieldName::Provider => "Provider",
            FieldName::Level => "Level",
        }
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFields {
    pub event_id: String,
    pub provider: String,
    pub level: Level,
}

impl EventFields {
    /// Renders a single field the way it is shown in a table cell.
    pub fn get(&self, name: FieldName) -> String {
        match name {
            FieldName::EventId => self.event_id.clone(),
            FieldName::Provider => self.provider.clone(),
            FieldName::Level => self.level.name().to_owned(),
        }
    }
}

/// Derives [`EventFields`] out of a record's XML payload.
///
/// The result only depends on the payload. The extractor also counts how many extractions were
/// attempted, which lets callers observe that memoization above it actually works.
#[derive(Debug, Default)]
pub struct FieldExtractor {
    policy: DuplicateChildPolicy,
    extractions: AtomicU64,
}

impl FieldExtractor {
    pub fn new() -> Self {
        FieldExtractor::default()
    }

    pub fn with_policy(policy: DuplicateChildPolicy) -> Self {
        FieldExtractor {
            policy,
            extractions: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> DuplicateChildPolicy {
        self.policy
    }

    /// Number of times [`FieldExtractor::extract`] was called, successful or not.
    pub fn extraction_count(&self) -> u64 {
        self.extractions.load(Ordering::Relaxed)
    }

    pub fn extract(&self, payload: &str) -> ExtractionResult<EventFields> {
        self.extractions.fetch_add(1, Ordering::Relaxed);

        let root = XmlNode::parse_with_policy(payload, self.policy)?;

        let event_id = required_text(&root, EVENT_ID_PATH)?;
        let provider = root
            .navigate(PROVIDER_PATH)?
            .attribute(PROVIDER_NAME_ATTRIBUTE)
            .ok_or_else(|| LookupError::new(PROVIDER_PATH, PROVIDER_NAME_ATTRIBUTE))?;
        let level = required_text(&root, LEVEL_PATH)?.parse::<Level>()?;

        trace!("extracted EventID={} Provider={} Level={}", event_id, provider, level);

        Ok(EventFields {
            event_id: event_id.to_owned(),
            provider: provider.to_owned(),
            level,
        })
    }
}

fn required_text<'a>(root: &'a XmlNode, path: &[&str]) -> Result<&'a str, LookupError> {
    root.navigate(path)?
        .text()
        .ok_or_else(|| LookupError::new(path, "#text"))
}
