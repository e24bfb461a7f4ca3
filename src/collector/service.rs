use std::sync::Arc;

use anyhow::Result;

use super::{FallbackChain, MetricSource, finish};
use crate::error::CollectionError;
use crate::probe::HostProbe;
use crate::sample::{Domain, MetricSample, Reading, ServiceState};

/// State of each configured service.
pub struct ServiceSource {
    probe: Arc<dyn HostProbe>,
    names: Vec<String>,
}

impl ServiceSource {
    pub fn new(probe: Arc<dyn HostProbe>, names: Vec<String>) -> Self {
        Self { probe, names }
    }

    fn state(&self, name: &str) -> Result<ServiceState, CollectionError> {
        let probe = self.probe.as_ref();

        FallbackChain::new(name)
            .then("systemctl", || systemctl_state(probe, name))
            .then("service", || sysv_state(probe, name))
            .run()
    }
}

impl MetricSource for ServiceSource {
    fn domain(&self) -> Domain {
        Domain::Service
    }

    fn collect(&self) -> Result<Vec<Reading>, CollectionError> {
        let readings = self
            .names
            .iter()
            .map(|name| match self.state(name) {
                Ok(state) => Reading::Sample(MetricSample::service(name, state)),
                Err(e) => Reading::unknown(Domain::Service, name, e),
            })
            .collect();

        finish(Domain::Service, readings)
    }
}

fn systemctl_state(probe: &dyn HostProbe, name: &str) -> Result<ServiceState> {
    let output = probe.run("systemctl", &["is-active", name])?;
    let state = output.stdout.trim();
    if state.is_empty() {
        anyhow::bail!("systemctl is-active printed nothing");
    }

    if matches!(state, "active" | "reloading" | "activating") {
        return Ok(ServiceState::Running);
    }

    // is-active says "inactive" for units that do not exist at all
    let unit = format!("{}.service", name);
    let listed = probe.run("systemctl", &["list-unit-files", unit.as_str(), "--no-legend"])?;
    if listed.stdout.lines().any(|l| l.split_whitespace().next() == Some(unit.as_str())) {
        Ok(ServiceState::Stopped)
    } else {
        Ok(ServiceState::NotInstalled)
    }
}

/// LSB exit codes: 0 running, 3 not running, 4 unknown service.
fn sysv_state(probe: &dyn HostProbe, name: &str) -> Result<ServiceState> {
    let output = probe.run("service", &[name, "status"])?;
    let text = format!("{}{}", output.stdout, output.stderr).to_lowercase();

    match output.code {
        Some(0) => Ok(ServiceState::Running),
        _ if text.contains("unrecognized service") || text.contains("could not be found") => {
            Ok(ServiceState::NotInstalled)
        }
        Some(3) => Ok(ServiceState::Stopped),
        Some(4) => Ok(ServiceState::NotInstalled),
        other => anyhow::bail!("service status exited with {:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::CommandOutput;
    use crate::probe::fake::FakeProbe;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_systemctl_states() {
        let probe = Arc::new(
            FakeProbe::new()
                .command("systemctl is-active ssh", 0, "active\n")
                .command("systemctl is-active nginx", 3, "inactive\n")
                .command(
                    "systemctl list-unit-files nginx.service --no-legend",
                    0,
                    "nginx.service disabled enabled\n",
                )
                .command("systemctl is-active docker", 3, "inactive\n")
                .command("systemctl list-unit-files docker.service --no-legend", 1, ""),
        );
        let readings = ServiceSource::new(probe, names(&["ssh", "nginx", "docker"]))
            .collect()
            .unwrap();

        assert_eq!(
            readings,
            vec![
                Reading::Sample(MetricSample::service("ssh", ServiceState::Running)),
                Reading::Sample(MetricSample::service("nginx", ServiceState::Stopped)),
                Reading::Sample(MetricSample::service("docker", ServiceState::NotInstalled)),
            ]
        );
    }

    #[test]
    fn test_sysv_fallback_without_systemd() {
        let probe = Arc::new(
            FakeProbe::new()
                .command("service cron status", 0, " * cron is running\n")
                .command("service mysql status", 3, " * MySQL is stopped.\n")
                .command_output(
                    "service apache2 status",
                    CommandOutput {
                        code: Some(1),
                        stdout: String::new(),
                        stderr: "apache2: unrecognized service\n".to_string(),
                    },
                ),
        );
        let readings = ServiceSource::new(probe, names(&["cron", "mysql", "apache2"]))
            .collect()
            .unwrap();

        assert_eq!(
            readings,
            vec![
                Reading::Sample(MetricSample::service("cron", ServiceState::Running)),
                Reading::Sample(MetricSample::service("mysql", ServiceState::Stopped)),
                Reading::Sample(MetricSample::service("apache2", ServiceState::NotInstalled)),
            ]
        );
    }

    #[test]
    fn test_no_service_manager_is_collection_error() {
        let probe = Arc::new(FakeProbe::new());
        let err = ServiceSource::new(probe, names(&["ssh"])).collect().unwrap_err();
        assert_eq!(err.target, "Services");
    }

    #[test]
    fn test_empty_list_yields_nothing() {
        let probe = Arc::new(FakeProbe::new());
        assert!(ServiceSource::new(probe, vec![]).collect().unwrap().is_empty());
    }
}
