use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::sample::Domain;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Ok,
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Ok => "OK",
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One classified observation, created by evaluation and consumed by the reporter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    pub domain: Domain,
    pub severity: Severity,
    pub message: String,
}

impl Finding {
    pub fn new(domain: Domain, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            ts: now(),
            domain,
            severity,
            message: message.into(),
        }
    }

    /// Equality ignoring the timestamp.
    #[cfg(test)]
    pub fn same_as(&self, other: &Finding) -> bool {
        self.domain == other.domain
            && self.severity == other.severity
            && self.message == other.message
    }
}

/// Local wall clock, falling back to UTC when the offset cannot be determined.
pub fn now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}
