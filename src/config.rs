use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::error::ConfigError;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/hostwatch/config.toml";

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub thresholds: Thresholds,
    pub limits: Limits,
    pub services: ServicesConfig,
    pub network: NetworkConfig,
    pub collection: CollectionConfig,
    pub logging: LoggingConfig,
}

/// Warning and critical cutoffs, both inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ThresholdSpec {
    pub warn: f64,
    pub crit: f64,
}

impl ThresholdSpec {
    pub const fn new(warn: f64, crit: f64) -> Self {
        Self { warn, crit }
    }

    /// Command-line form: a single critical value, warning ten points below it.
    pub fn from_critical(crit: f64) -> Self {
        Self {
            warn: (crit - 10.0).max(0.0),
            crit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Thresholds {
    pub cpu: ThresholdSpec,
    pub memory: ThresholdSpec,
    pub swap: ThresholdSpec,
    pub disk: ThresholdSpec,
    /// 1-minute load average per logical CPU
    pub load: ThresholdSpec,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cpu: ThresholdSpec::new(70.0, 80.0),
            memory: ThresholdSpec::new(70.0, 80.0),
            swap: ThresholdSpec::new(50.0, 80.0),
            disk: ThresholdSpec::new(80.0, 90.0),
            load: ThresholdSpec::new(1.0, 2.0),
        }
    }
}

/// Counts above these limits are reported.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Limits {
    pub log_errors: u64,
    pub log_critical: u64,
    pub failed_logins: u64,
    pub pending_upgrades: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            log_errors: 0,
            log_critical: 0,
            failed_logins: 5,
            pending_upgrades: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub names: Vec<String>,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            names: ["ssh", "cron", "docker", "nginx"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub probe_host: String,
    pub probe_port: u16,
    pub timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            probe_host: "8.8.8.8".to_string(),
            probe_port: 53,
            timeout_secs: 2,
        }
    }
}

impl NetworkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CollectionConfig {
    pub cpu_sample_ms: u64,
    pub log_window_minutes: u64,
    pub command_timeout_secs: u64,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            cpu_sample_ms: 1000,
            log_window_minutes: 60,
            command_timeout_secs: 10,
        }
    }
}

impl CollectionConfig {
    pub fn cpu_sample_duration(&self) -> Duration {
        Duration::from_millis(self.cpu_sample_ms)
    }

    pub fn log_window(&self) -> Duration {
        Duration::from_secs(self.log_window_minutes * 60)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub enabled: bool,
    pub path: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: PathBuf::from("/var/log/hostwatch.log"),
        }
    }
}

/// Values given on the command line, applied on top of the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub cpu_threshold: Option<f64>,
    pub mem_threshold: Option<f64>,
    pub disk_threshold: Option<f64>,
    pub log: bool,
}

impl Config {
    /// Load from `path`; a missing file yields the built-in defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(n) = overrides.cpu_threshold {
            self.thresholds.cpu = ThresholdSpec::from_critical(n);
        }
        if let Some(n) = overrides.mem_threshold {
            self.thresholds.memory = ThresholdSpec::from_critical(n);
        }
        if let Some(n) = overrides.disk_threshold {
            self.thresholds.disk = ThresholdSpec::from_critical(n);
        }
        if overrides.log {
            self.logging.enabled = true;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.thresholds;
        for (name, spec) in [
            ("cpu", t.cpu),
            ("memory", t.memory),
            ("swap", t.swap),
            ("disk", t.disk),
        ] {
            check_pair(name, spec, 100.0)?;
        }
        check_pair("load", t.load, 1024.0)?;

        for (name, value) in [
            ("network.probe_port", self.network.probe_port as u64),
            ("network.timeout_secs", self.network.timeout_secs),
            ("collection.cpu_sample_ms", self.collection.cpu_sample_ms),
            ("collection.log_window_minutes", self.collection.log_window_minutes),
            ("collection.command_timeout_secs", self.collection.command_timeout_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero {
                    name: name.to_string(),
                });
            }
        }

        Ok(())
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn check_pair(name: &str, spec: ThresholdSpec, max: f64) -> Result<(), ConfigError> {
    for (which, value) in [("warn", spec.warn), ("crit", spec.crit)] {
        if !(0.0..=max).contains(&value) {
            return Err(ConfigError::OutOfRange {
                name: format!("thresholds.{}.{}", name, which),
                value,
                min: 0.0,
                max,
            });
        }
    }

    if spec.warn > spec.crit {
        return Err(ConfigError::InvertedThreshold {
            name: format!("thresholds.{}", name),
            warn: spec.warn,
            crit: spec.crit,
        });
    }
    Ok(())
}
