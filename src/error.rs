//! Error types for the activity sensor agent.
//!
//! Nothing in the frame pipeline is fatal: these errors surface at the
//! edges (loading configuration, catalogues and templates, talking to the
//! object detector, writing records) and the caller decides how to degrade.

use std::path::PathBuf;

/// Configuration file errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialize error: {0}")]
    Serialize(String),
}

/// Problems with a single activity definition.
///
/// The catalogue loader skips the offending activity and keeps going.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CatalogError {
    #[error("activity has an empty name")]
    EmptyName,

    #[error("activity '{0}': minimum people count must be at least 1")]
    InvalidMinPeople(String),

    #[error("activity '{0}': needs either a template name or an area, not both")]
    AmbiguousArea(String),

    #[error("activity '{0}': no template name and no area")]
    MissingArea(String),

    #[error("activity '{name}': malformed area ({reason})")]
    MalformedArea { name: String, reason: String },

    #[error("activity '{name}': unknown requirement '{requirement}'")]
    UnknownRequirement { name: String, requirement: String },

    #[error("activity '{name}': orientation mask {mask:#x} has bits outside Front|Left|Right|Back")]
    InvalidOrientation { name: String, mask: u32 },
}

/// Template catalogue errors.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("could not read template '{name}' from {path:?}: {source}")]
    Io {
        name: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("template '{name}' line {line}: '{value}' is not a number")]
    BadValue {
        name: String,
        line: usize,
        value: String,
    },

    #[error("template '{name}' has {found} values, expected {expected}")]
    WrongSize {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("template '{0}' has a zero dimension or slide step")]
    EmptyWindow(String),
}

/// Localizer scheduling errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocalizerError {
    #[error("a template scan is already in progress")]
    Busy,

    #[error("template localization is not configured")]
    Disabled,

    #[error("no point cloud has been received yet")]
    NoPointCloud,

    #[error("localizer worker could not be spawned: {0}")]
    Spawn(String),
}

/// Object detector errors.
#[derive(Debug, thiserror::Error)]
pub enum ObjectDetectorError {
    #[error("object detector is already running")]
    AlreadyRunning,

    #[error("tag reader connection failed: {0}")]
    Connection(String),

    #[error("tag reader failed: {0}")]
    Reader(String),
}

/// Record sink errors.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no record session is open")]
    NoSession,
}
