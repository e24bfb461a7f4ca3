use std::{sync::Arc, time::Duration};

use anyhow::Result;

use super::{FallbackChain, MetricSource, finish, run_nonempty, run_ok};
use crate::config::NetworkConfig;
use crate::error::CollectionError;
use crate::probe::HostProbe;
use crate::sample::{Domain, MetricSample, Reading, keys};

/// Link state per interface plus one external reachability probe.
pub struct NetworkSource {
    probe: Arc<dyn HostProbe>,
    config: NetworkConfig,
}

impl NetworkSource {
    pub fn new(probe: Arc<dyn HostProbe>, config: NetworkConfig) -> Self {
        Self { probe, config }
    }

    fn interfaces(&self) -> Result<Vec<(String, bool)>, CollectionError> {
        let probe = self.probe.as_ref();

        FallbackChain::new("interfaces")
            .then("ip link", || {
                let links = parse_ip_link(&run_nonempty(probe, "ip", &["-o", "link", "show"])?);
                if links.is_empty() {
                    anyhow::bail!("no interfaces listed");
                }
                Ok(links)
            })
            .then("/sys/class/net", || {
                let links = read_sysfs_links(probe);
                if links.is_empty() {
                    anyhow::bail!("no interfaces under /sys/class/net");
                }
                Ok(links)
            })
            .run()
    }

    fn reachable(&self) -> Result<bool, CollectionError> {
        let probe = self.probe.as_ref();
        let host = self.config.probe_host.as_str();
        let timeout = self.config.timeout();
        let wait = timeout.as_secs().max(1).to_string();

        FallbackChain::new(keys::INTERNET)
            .then("ping", || {
                run_ok(probe, "ping", &["-c", "1", "-W", wait.as_str(), host])?;
                Ok(true)
            })
            .then("tcp connect", || {
                Ok(tcp_reachable(probe, host, self.config.probe_port, timeout))
            })
            .run()
    }
}

impl MetricSource for NetworkSource {
    fn domain(&self) -> Domain {
        Domain::Network
    }

    fn collect(&self) -> Result<Vec<Reading>, CollectionError> {
        let mut readings: Vec<Reading> = match self.interfaces() {
            Ok(links) => links
                .into_iter()
                .map(|(name, up)| Reading::Sample(MetricSample::flag(Domain::Network, name, up)))
                .collect(),
            Err(e) => vec![Reading::unknown(Domain::Network, "interfaces", e)],
        };

        readings.push(match self.reachable() {
            Ok(up) => MetricSample::flag(Domain::Network, keys::INTERNET, up).into(),
            Err(e) => Reading::unknown(Domain::Network, keys::INTERNET, e),
        });

        finish(Domain::Network, readings)
    }
}

fn tcp_reachable(probe: &dyn HostProbe, host: &str, port: u16, timeout: Duration) -> bool {
    match probe.tcp_connect(host, port, timeout) {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(host, port, error = %e, "reachability probe failed");
            false
        }
    }
}

/// `ip -o link show`, one interface per line.
pub fn parse_ip_link(output: &str) -> Vec<(String, bool)> {
    let mut links = Vec::new();

    for line in output.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 3 {
            continue;
        }

        let name = parts[1].trim_end_matches(':');
        let name = name.split('@').next().unwrap_or(name);
        let flags = parts[2];
        if name == "lo" || flags.contains("LOOPBACK") {
            continue;
        }

        let state = parts
            .iter()
            .position(|p| *p == "state")
            .and_then(|i| parts.get(i + 1))
            .copied()
            .unwrap_or("UNKNOWN");

        let up = match state {
            "UP" => true,
            // tunnels and some virtual links never report an operstate
            "UNKNOWN" => flags.contains("LOWER_UP"),
            _ => false,
        };

        links.push((name.to_string(), up));
    }

    links
}

fn read_sysfs_links(probe: &dyn HostProbe) -> Vec<(String, bool)> {
    let mut links = Vec::new();

    for path in probe.glob("/sys/class/net/*/operstate") {
        let Some(dir) = path.parent() else { continue };
        let Some(name) = dir.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        if name == "lo" {
            continue;
        }

        let Ok(state) = probe.read_file(&path) else { continue };
        let up = match state.trim() {
            "up" => true,
            "unknown" => probe
                .read_file(&dir.join("carrier"))
                .map(|c| c.trim() == "1")
                .unwrap_or(false),
            _ => false,
        };
        links.push((name, up));
    }

    links
}
