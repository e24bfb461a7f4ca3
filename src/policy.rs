//! Classification of samples into severities.

use crate::config::{Config, Limits, ThresholdSpec, Thresholds};
use crate::finding::{Finding, Severity};
use crate::sample::{Domain, MetricSample, ServiceState, Unit, Value, keys};

/// How a particular sample is judged.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Rule {
    Percent(ThresholdSpec),
    Ratio(ThresholdSpec),
    /// Counts strictly above `limit` are raised to `severity`.
    Count { limit: u64, severity: Severity },
    /// A false flag is raised to `severity`.
    Flag { severity: Severity },
    Service,
    Info,
}

#[derive(Debug, Clone)]
pub struct ThresholdPolicy {
    thresholds: Thresholds,
    limits: Limits,
}

impl ThresholdPolicy {
    pub fn new(thresholds: Thresholds, limits: Limits) -> Self {
        Self { thresholds, limits }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.thresholds.clone(), config.limits.clone())
    }

    fn rule(&self, sample: &MetricSample) -> Rule {
        let t = &self.thresholds;
        let key = sample.key.as_str();

        match (sample.domain, sample.unit) {
            (Domain::Cpu, Unit::Percent) => Rule::Percent(t.cpu),
            (Domain::Cpu, Unit::Ratio) => Rule::Ratio(t.load),
            (Domain::Memory, Unit::Percent) if key == keys::SWAP => Rule::Percent(t.swap),
            (Domain::Memory, Unit::Percent) => Rule::Percent(t.memory),
            (Domain::Disk, Unit::Percent) => Rule::Percent(t.disk),
            (Domain::Network, Unit::Bool) if key == keys::INTERNET => Rule::Flag {
                severity: Severity::Critical,
            },
            (Domain::Network, Unit::Bool) => Rule::Flag {
                severity: Severity::Warning,
            },
            (Domain::Service, _) => Rule::Service,
            (Domain::Log, Unit::Count) if key == keys::LOG_CRITICAL => Rule::Count {
                limit: self.limits.log_critical,
                severity: Severity::Critical,
            },
            (Domain::Log, Unit::Count) => Rule::Count {
                limit: self.limits.log_errors,
                severity: Severity::Warning,
            },
            (Domain::Security, Unit::Count) if key == keys::FAILED_LOGINS => Rule::Count {
                limit: self.limits.failed_logins,
                severity: Severity::Warning,
            },
            (Domain::Security, Unit::Count) => Rule::Count {
                limit: self.limits.pending_upgrades,
                severity: Severity::Warning,
            },
            _ => Rule::Info,
        }
    }

    pub fn evaluate(&self, sample: &MetricSample) -> Severity {
        match (self.rule(sample), &sample.value) {
            (Rule::Percent(spec) | Rule::Ratio(spec), Value::Number(v)) => classify(*v, spec),
            (Rule::Count { limit, severity }, Value::Number(v)) => {
                if *v > limit as f64 {
                    severity
                } else {
                    Severity::Ok
                }
            }
            (Rule::Flag { severity }, Value::Flag(up)) => {
                if *up {
                    Severity::Ok
                } else {
                    severity
                }
            }
            (Rule::Service, Value::Service(state)) => match state {
                ServiceState::Running => Severity::Ok,
                ServiceState::Stopped => Severity::Critical,
                ServiceState::NotInstalled => Severity::Info,
            },
            _ => Severity::Info,
        }
    }

    /// Evaluate and describe a sample as a finding.
    pub fn assess(&self, sample: &MetricSample) -> Finding {
        let severity = self.evaluate(sample);
        let message = describe(self.rule(sample), sample, severity);
        Finding::new(sample.domain, severity, message)
    }
}

/// Both boundaries are inclusive of the higher severity.
fn classify(value: f64, spec: ThresholdSpec) -> Severity {
    if value >= spec.crit {
        Severity::Critical
    } else if value >= spec.warn {
        Severity::Warning
    } else {
        Severity::Ok
    }
}

fn crossed(severity: Severity, spec: ThresholdSpec) -> String {
    match severity {
        Severity::Critical => format!(" (critical threshold {})", spec.crit),
        Severity::Warning => format!(" (warning threshold {})", spec.warn),
        _ => String::new(),
    }
}

fn describe(rule: Rule, sample: &MetricSample, severity: Severity) -> String {
    let key = sample.key.as_str();

    match (rule, &sample.value) {
        (Rule::Percent(spec), Value::Number(v)) => {
            let subject = match sample.domain {
                Domain::Cpu => "CPU usage".to_string(),
                Domain::Memory if key == keys::SWAP => "Swap usage".to_string(),
                Domain::Memory => "Memory usage".to_string(),
                Domain::Disk => format!("Disk usage on {}", key),
                _ => capitalize(key),
            };
            format!("{} is {:.1}%{}", subject, v, crossed(severity, spec))
        }
        (Rule::Ratio(spec), Value::Number(v)) => {
            format!("Load average per core is {:.2}{}", v, crossed(severity, spec))
        }
        (Rule::Count { limit, .. }, Value::Number(v)) => describe_count(key, *v as u64, limit),
        (Rule::Flag { .. }, Value::Flag(up)) if key == keys::INTERNET => {
            if *up {
                "Internet connectivity OK".to_string()
            } else {
                "No internet connectivity".to_string()
            }
        }
        (Rule::Flag { .. }, Value::Flag(up)) => {
            format!("Interface {} is {}", key, if *up { "up" } else { "down" })
        }
        (Rule::Service, Value::Service(state)) => format!("Service {} is {}", key, state),
        (_, value) => format!("{}: {}", capitalize(key), display_value(value)),
    }
}

fn describe_count(key: &str, n: u64, limit: u64) -> String {
    let over = if n > limit && limit > 0 {
        format!(" (limit {})", limit)
    } else {
        String::new()
    };

    match key {
        keys::UPGRADES if n == 0 => "System is up to date".to_string(),
        keys::UPGRADES => format!("{} pending package upgrades{}", n, over),
        keys::FAILED_LOGINS => format!("{} failed login attempts today{}", n, over),
        keys::LOG_ERRORS if n == 0 => "No error entries in system logs".to_string(),
        keys::LOG_ERRORS => format!("{} error entries in system logs{}", n, over),
        keys::LOG_CRITICAL if n == 0 => "No critical entries in system logs".to_string(),
        keys::LOG_CRITICAL => format!("{} critical entries in system logs{}", n, over),
        _ => format!("{}: {}{}", capitalize(key), n, over),
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Number(n) => n.to_string(),
        Value::Flag(b) => b.to_string(),
        Value::Text(s) => s.clone(),
        Value::Service(state) => state.to_string(),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ThresholdPolicy {
        ThresholdPolicy::from_config(&Config::default())
    }

    #[test]
    fn test_percent_boundaries_are_inclusive() {
        let p = policy();
        let disk = |v| MetricSample::percent(Domain::Disk, "/", v);

        assert_eq!(p.evaluate(&disk(79.9)), Severity::Ok);
        assert_eq!(p.evaluate(&disk(80.0)), Severity::Warning);
        assert_eq!(p.evaluate(&disk(89.9)), Severity::Warning);
        assert_eq!(p.evaluate(&disk(90.0)), Severity::Critical);
        assert_eq!(p.evaluate(&disk(100.0)), Severity::Critical);
    }

    #[test]
    fn test_cpu_over_critical_names_value_and_threshold() {
        let finding = policy().assess(&MetricSample::percent(Domain::Cpu, keys::CPU_USAGE, 85.0));
        assert_eq!(finding.severity, Severity::Critical);
        assert!(finding.message.contains("85"));
        assert!(finding.message.contains("80"));
    }

    #[test]
    fn test_swap_uses_its_own_thresholds() {
        let p = policy();
        let swap = MetricSample::percent(Domain::Memory, keys::SWAP, 60.0);
        let mem = MetricSample::percent(Domain::Memory, keys::MEMORY, 60.0);
        assert_eq!(p.evaluate(&swap), Severity::Warning);
        assert_eq!(p.evaluate(&mem), Severity::Ok);
    }

    #[test]
    fn test_load_is_independent_of_cpu_percent() {
        let p = policy();
        assert_eq!(
            p.evaluate(&MetricSample::ratio(Domain::Cpu, keys::LOAD, 1.5)),
            Severity::Warning
        );
        assert_eq!(
            p.evaluate(&MetricSample::ratio(Domain::Cpu, keys::LOAD, 2.0)),
            Severity::Critical
        );
    }

    #[test]
    fn test_upgrades() {
        let p = policy();
        let none = p.assess(&MetricSample::count(Domain::Security, keys::UPGRADES, 0));
        assert_eq!(none.severity, Severity::Ok);
        assert!(none.message.contains("up to date"));

        let three = p.assess(&MetricSample::count(Domain::Security, keys::UPGRADES, 3));
        assert_eq!(three.severity, Severity::Warning);
        assert!(three.message.contains('3'));
    }

    #[test]
    fn test_count_cutoffs_are_strict() {
        let p = policy();
        let logins = |n| MetricSample::count(Domain::Security, keys::FAILED_LOGINS, n);
        assert_eq!(p.evaluate(&logins(5)), Severity::Ok);
        assert_eq!(p.evaluate(&logins(6)), Severity::Warning);

        let critical = |n| MetricSample::count(Domain::Log, keys::LOG_CRITICAL, n);
        assert_eq!(p.evaluate(&critical(0)), Severity::Ok);
        assert_eq!(p.evaluate(&critical(1)), Severity::Critical);

        let errors = MetricSample::count(Domain::Log, keys::LOG_ERRORS, 4);
        assert_eq!(p.evaluate(&errors), Severity::Warning);
    }

    #[test]
    fn test_flags_and_services() {
        let p = policy();
        let internet = p.assess(&MetricSample::flag(Domain::Network, keys::INTERNET, false));
        assert_eq!(internet.severity, Severity::Critical);

        let link = p.assess(&MetricSample::flag(Domain::Network, "eth1", false));
        assert_eq!(link.severity, Severity::Warning);
        assert_eq!(link.message, "Interface eth1 is down");

        let cases = [
            (ServiceState::Running, Severity::Ok),
            (ServiceState::Stopped, Severity::Critical),
            (ServiceState::NotInstalled, Severity::Info),
        ];
        for (state, expected) in cases {
            assert_eq!(p.evaluate(&MetricSample::service("nginx", state)), expected);
        }
    }

    #[test]
    fn test_host_identity_is_info() {
        let finding =
            policy().assess(&MetricSample::text(Domain::System, keys::HOSTNAME, "web-01"));
        assert_eq!(finding.severity, Severity::Info);
        assert_eq!(finding.message, "Hostname: web-01");
    }
}
