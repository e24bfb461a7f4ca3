use std::fmt;

use serde::{Deserialize, Serialize};

/// Monitored subsystem. Declaration order is the reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    System,
    Cpu,
    Memory,
    Disk,
    Network,
    Service,
    Log,
    Security,
}

impl Domain {
    pub fn title(&self) -> &'static str {
        match self {
            Domain::System => "System Information",
            Domain::Cpu => "CPU",
            Domain::Memory => "Memory",
            Domain::Disk => "Disk",
            Domain::Network => "Network",
            Domain::Service => "Services",
            Domain::Log => "System Logs",
            Domain::Security => "Security",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Percent,
    Count,
    Bool,
    Text,
    /// Load average divided by the logical CPU count
    Ratio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Running,
    Stopped,
    NotInstalled,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceState::Running => "running",
            ServiceState::Stopped => "stopped",
            ServiceState::NotInstalled => "not installed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Flag(bool),
    Text(String),
    Service(ServiceState),
}

/// One parsed observation, produced by a source and consumed by evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub domain: Domain,
    pub key: String,
    pub value: Value,
    pub unit: Unit,
}

impl MetricSample {
    pub fn percent(domain: Domain, key: impl Into<String>, value: f64) -> Self {
        Self {
            domain,
            key: key.into(),
            value: Value::Number(value),
            unit: Unit::Percent,
        }
    }

    pub fn count(domain: Domain, key: impl Into<String>, value: u64) -> Self {
        Self {
            domain,
            key: key.into(),
            value: Value::Number(value as f64),
            unit: Unit::Count,
        }
    }

    pub fn ratio(domain: Domain, key: impl Into<String>, value: f64) -> Self {
        Self {
            domain,
            key: key.into(),
            value: Value::Number(value),
            unit: Unit::Ratio,
        }
    }

    pub fn flag(domain: Domain, key: impl Into<String>, value: bool) -> Self {
        Self {
            domain,
            key: key.into(),
            value: Value::Flag(value),
            unit: Unit::Bool,
        }
    }

    pub fn text(domain: Domain, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            domain,
            key: key.into(),
            value: Value::Text(value.into()),
            unit: Unit::Text,
        }
    }

    pub fn service(name: impl Into<String>, state: ServiceState) -> Self {
        Self {
            domain: Domain::Service,
            key: name.into(),
            value: Value::Service(state),
            unit: Unit::Text,
        }
    }

    #[cfg(test)]
    pub fn number(&self) -> Option<f64> {
        match self.value {
            Value::Number(n) => Some(n),
            _ => None,
        }
    }
}

/// Outcome of one reading inside a source.
///
/// `Unknown` keeps a failed reading visible instead of coercing it to zero.
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    Sample(MetricSample),
    Unknown {
        domain: Domain,
        key: String,
        reason: String,
    },
}

impl Reading {
    pub fn unknown(domain: Domain, key: impl Into<String>, reason: impl fmt::Display) -> Self {
        Reading::Unknown {
            domain,
            key: key.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<MetricSample> for Reading {
    fn from(sample: MetricSample) -> Self {
        Reading::Sample(sample)
    }
}

/// Well-known sample keys.
pub mod keys {
    pub const HOSTNAME: &str = "hostname";
    pub const OS: &str = "operating system";
    pub const KERNEL: &str = "kernel";
    pub const UPTIME: &str = "uptime";
    pub const CPU_USAGE: &str = "cpu usage";
    pub const LOAD: &str = "load average";
    pub const MEMORY: &str = "memory usage";
    pub const SWAP: &str = "swap usage";
    pub const INTERNET: &str = "internet connectivity";
    pub const LOG_ERRORS: &str = "error log entries";
    pub const LOG_CRITICAL: &str = "critical log entries";
    pub const UPGRADES: &str = "pending upgrades";
    pub const FAILED_LOGINS: &str = "failed logins";
}
