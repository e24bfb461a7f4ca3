use std::{io, path::PathBuf};

use thiserror::Error;

/// Raw text was obtained but could not be interpreted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("could not parse {what} from {raw:?}")]
    Number { what: String, raw: String },

    #[error("no {what} found in output")]
    Missing { what: String },
}

impl ParseError {
    pub fn number(what: impl Into<String>, raw: impl Into<String>) -> Self {
        ParseError::Number {
            what: what.into(),
            raw: raw.into(),
        }
    }

    pub fn missing(what: impl Into<String>) -> Self {
        ParseError::Missing { what: what.into() }
    }
}

/// Every acquisition strategy for a reading failed.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{target}: no acquisition method succeeded ({})", .attempts.join("; "))]
pub struct CollectionError {
    pub target: String,
    pub attempts: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{name} warning threshold ({warn}) exceeds critical threshold ({crit})")]
    InvertedThreshold { name: String, warn: f64, crit: f64 },

    #[error("{name} must be between {min} and {max}, got {value}")]
    OutOfRange {
        name: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{name} must not be zero")]
    Zero { name: String },
}

/// The persisted log could not be opened or appended to.
#[derive(Debug, Error)]
#[error("cannot write log file {}: {source}", .path.display())]
pub struct PersistenceError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}
