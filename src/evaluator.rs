use crate::collector::MetricSource;
use crate::finding::{Finding, Severity};
use crate::policy::ThresholdPolicy;
use crate::sample::Reading;

/// Runs every registered source once and classifies what it returns.
pub struct Evaluator {
    sources: Vec<Box<dyn MetricSource>>,
    policy: ThresholdPolicy,
}

impl Evaluator {
    /// Sources are reordered by domain; registration order breaks ties.
    pub fn new(mut sources: Vec<Box<dyn MetricSource>>, policy: ThresholdPolicy) -> Self {
        sources.sort_by_key(|s| s.domain());
        Self { sources, policy }
    }

    pub fn run(&self) -> Vec<Finding> {
        let mut findings = Vec::new();

        for source in &self.sources {
            let domain = source.domain();
            tracing::debug!(%domain, "collecting");

            match source.collect() {
                Ok(readings) if readings.is_empty() => {
                    findings.push(Finding::new(domain, Severity::Info, "Nothing to report"));
                }
                Ok(readings) => {
                    findings.extend(readings.iter().map(|r| self.judge(r)));
                }
                Err(e) => {
                    tracing::info!(%domain, error = %e, "source unavailable");
                    findings.push(Finding::new(
                        domain,
                        Severity::Warning,
                        format!("{} checks unavailable: {}", domain, e),
                    ));
                }
            }
        }

        findings
    }

    fn judge(&self, reading: &Reading) -> Finding {
        match reading {
            Reading::Sample(sample) => self.policy.assess(sample),
            Reading::Unknown {
                domain,
                key,
                reason,
            } => Finding::new(
                *domain,
                Severity::Warning,
                format!("Could not determine {}: {}", key, reason),
            ),
        }
    }
}
