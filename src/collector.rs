//! Per-domain metric sources.
//!
//! Every source turns raw host text into typed [`Reading`]s. Each reading is
//! acquired through a [`FallbackChain`]: strategies run in declared order and
//! the first one that produces a parseable, non-empty result wins.

pub mod cpu;
pub mod disk;
pub mod log;
pub mod memory;
pub mod network;
pub mod security;
pub mod service;
pub mod system;

use std::sync::Arc;

use anyhow::Result;

use crate::config::Config;
use crate::error::{CollectionError, ParseError};
use crate::probe::{CommandOutput, HostProbe};
use crate::sample::{Domain, Reading};

pub trait MetricSource {
    fn domain(&self) -> Domain;

    /// Fails only when no reading at all could be acquired.
    fn collect(&self) -> Result<Vec<Reading>, CollectionError>;
}

type Strategy<'a, T> = Box<dyn Fn() -> Result<T> + 'a>;

/// Ordered acquisition strategies for a single reading.
pub struct FallbackChain<'a, T> {
    target: String,
    strategies: Vec<(&'static str, Strategy<'a, T>)>,
}

impl<'a, T> FallbackChain<'a, T> {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            strategies: Vec::new(),
        }
    }

    pub fn then(mut self, name: &'static str, strategy: impl Fn() -> Result<T> + 'a) -> Self {
        self.strategies.push((name, Box::new(strategy)));
        self
    }

    pub fn run(self) -> Result<T, CollectionError> {
        let mut attempts = Vec::with_capacity(self.strategies.len());

        for (name, strategy) in self.strategies {
            match strategy() {
                Ok(value) => {
                    tracing::debug!(target_reading = %self.target, strategy = name, "acquired");
                    return Ok(value);
                }
                Err(e) => {
                    tracing::debug!(
                        target_reading = %self.target,
                        strategy = name,
                        error = %e,
                        "strategy failed"
                    );
                    attempts.push(format!("{}: {:#}", name, e));
                }
            }
        }

        Err(CollectionError {
            target: self.target,
            attempts,
        })
    }
}

/// Fails the whole source only when every reading is unknown.
pub(crate) fn finish(
    domain: Domain,
    readings: Vec<Reading>,
) -> Result<Vec<Reading>, CollectionError> {
    let any_sample = readings.iter().any(|r| matches!(r, Reading::Sample(_)));
    if any_sample || readings.is_empty() {
        return Ok(readings);
    }

    let attempts = readings
        .into_iter()
        .filter_map(|r| match r {
            Reading::Unknown { key, reason, .. } => Some(format!("{}: {}", key, reason)),
            Reading::Sample(_) => None,
        })
        .collect();

    Err(CollectionError {
        target: domain.title().to_string(),
        attempts,
    })
}

/// Run a command, requiring a clean exit.
pub(crate) fn run_ok(probe: &dyn HostProbe, program: &str, args: &[&str]) -> Result<CommandOutput> {
    let output = probe.run(program, args)?;
    if !output.success() {
        anyhow::bail!(
            "{} exited with {}{}",
            program,
            output
                .code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string()),
            first_line(&output.stderr)
                .map(|l| format!(": {}", l))
                .unwrap_or_default()
        );
    }
    Ok(output)
}

/// Run a command, requiring a clean exit and non-blank stdout.
pub(crate) fn run_nonempty(probe: &dyn HostProbe, program: &str, args: &[&str]) -> Result<String> {
    let output = run_ok(probe, program, args)?;
    if output.stdout.trim().is_empty() {
        anyhow::bail!("{} produced no output", program);
    }
    Ok(output.stdout)
}

fn first_line(s: &str) -> Option<&str> {
    s.lines().map(str::trim).find(|l| !l.is_empty())
}

/// Parse a reading that may carry a `%` suffix or a decimal comma.
pub fn parse_number(what: &str, raw: &str) -> Result<f64, ParseError> {
    let trimmed = raw.trim().trim_end_matches('%').trim();
    let normalized = if trimmed.contains(',') && !trimmed.contains('.') {
        trimmed.replace(',', ".")
    } else {
        trimmed.replace(',', "")
    };

    match normalized.parse::<f64>() {
        Ok(n) if n.is_finite() => Ok(n),
        _ => Err(ParseError::number(what, raw.trim())),
    }
}

pub fn parse_count(what: &str, raw: &str) -> Result<u64, ParseError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| ParseError::number(what, raw.trim()))
}

/// Sources in reporting order.
pub fn default_sources(probe: Arc<dyn HostProbe>, config: &Config) -> Vec<Box<dyn MetricSource>> {
    vec![
        Box::new(system::SystemSource::new(probe.clone())),
        Box::new(cpu::CpuSource::new(
            probe.clone(),
            config.collection.cpu_sample_duration(),
        )),
        Box::new(memory::MemorySource::new(probe.clone())),
        Box::new(disk::DiskSource::new(probe.clone())),
        Box::new(network::NetworkSource::new(probe.clone(), config.network.clone())),
        Box::new(service::ServiceSource::new(
            probe.clone(),
            config.services.names.clone(),
        )),
        Box::new(log::LogSource::new(
            probe.clone(),
            config.collection.log_window(),
        )),
        Box::new(security::SecuritySource::new(probe)),
    ]
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::sample::MetricSample;

    #[test]
    fn test_fallback_runs_in_declared_order() {
        let order = RefCell::new(Vec::new());

        let result = FallbackChain::new("cpu usage")
            .then("primary", || {
                order.borrow_mut().push("primary");
                anyhow::bail!("no output")
            })
            .then("secondary", || {
                order.borrow_mut().push("secondary");
                anyhow::bail!("unparseable")
            })
            .then("tertiary", || {
                order.borrow_mut().push("tertiary");
                Ok(42.0)
            })
            .then("never", || {
                order.borrow_mut().push("never");
                Ok(0.0)
            })
            .run();

        assert_eq!(result.unwrap(), 42.0);
        assert_eq!(*order.borrow(), vec!["primary", "secondary", "tertiary"]);
    }

    #[test]
    fn test_fallback_exhausted_reports_every_attempt() {
        let err = FallbackChain::<u64>::new("pending upgrades")
            .then("apt", || anyhow::bail!("apt not found"))
            .then("dnf", || anyhow::bail!("dnf not found"))
            .run()
            .unwrap_err();

        assert_eq!(err.target, "pending upgrades");
        assert_eq!(err.attempts.len(), 2);
        assert!(err.to_string().contains("apt not found"));
        assert!(err.to_string().contains("dnf not found"));
    }

    #[test]
    fn test_parse_number_locale_tolerant() {
        assert_eq!(parse_number("cpu", "85").unwrap(), 85.0);
        assert_eq!(parse_number("cpu", " 93.8 ").unwrap(), 93.8);
        assert_eq!(parse_number("cpu", "93,8").unwrap(), 93.8);
        assert_eq!(parse_number("disk", "45%").unwrap(), 45.0);
        assert_eq!(parse_number("mem", "1,024.5").unwrap(), 1024.5);
    }

    #[test]
    fn test_parse_number_rejects_empty_instead_of_zero() {
        assert!(parse_number("cpu", "").is_err());
        assert!(parse_number("cpu", "n/a").is_err());
        assert!(parse_number("cpu", "NaN").is_err());
        assert!(parse_count("upgrades", "-1").is_err());
    }

    #[test]
    fn test_finish_fails_only_when_nothing_was_read() {
        let all_unknown = vec![
            Reading::unknown(Domain::Cpu, "cpu usage", "no data"),
            Reading::unknown(Domain::Cpu, "load average", "no data"),
        ];
        let err = finish(Domain::Cpu, all_unknown).unwrap_err();
        assert_eq!(err.attempts.len(), 2);

        let partial = vec![
            Reading::unknown(Domain::Cpu, "cpu usage", "no data"),
            Reading::Sample(MetricSample::ratio(Domain::Cpu, "load average", 0.5)),
        ];
        assert_eq!(finish(Domain::Cpu, partial).unwrap().len(), 2);
    }
}
