use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};

use super::{FallbackChain, MetricSource, finish, parse_number, run_nonempty};
use crate::error::CollectionError;
use crate::probe::HostProbe;
use crate::sample::{Domain, MetricSample, Reading, keys};

/// Host identity: hostname, OS, kernel and uptime.
pub struct SystemSource {
    probe: Arc<dyn HostProbe>,
}

impl SystemSource {
    pub fn new(probe: Arc<dyn HostProbe>) -> Self {
        Self { probe }
    }
}

impl MetricSource for SystemSource {
    fn domain(&self) -> Domain {
        Domain::System
    }

    fn collect(&self) -> Result<Vec<Reading>, CollectionError> {
        let probe = self.probe.as_ref();

        let hostname = FallbackChain::new(keys::HOSTNAME)
            .then("/proc/sys/kernel/hostname", || {
                non_blank(probe.read_file(Path::new("/proc/sys/kernel/hostname"))?)
            })
            .then("hostname", || non_blank(run_nonempty(probe, "hostname", &[])?))
            .run();

        let os = FallbackChain::new(keys::OS)
            .then("/etc/os-release", || {
                parse_os_release(&probe.read_file(Path::new("/etc/os-release"))?)
            })
            .then("uname -o", || non_blank(run_nonempty(probe, "uname", &["-o"])?))
            .run();

        let kernel = FallbackChain::new(keys::KERNEL)
            .then("/proc/sys/kernel/osrelease", || {
                non_blank(probe.read_file(Path::new("/proc/sys/kernel/osrelease"))?)
            })
            .then("uname -r", || non_blank(run_nonempty(probe, "uname", &["-r"])?))
            .run();

        let uptime = FallbackChain::new(keys::UPTIME)
            .then("/proc/uptime", || {
                let secs = parse_proc_uptime(&probe.read_file(Path::new("/proc/uptime"))?)?;
                Ok(format_duration(secs))
            })
            .then("uptime -p", || {
                let out = run_nonempty(probe, "uptime", &["-p"])?;
                non_blank(out.trim().trim_start_matches("up ").to_string())
            })
            .run();

        let readings = [
            (keys::HOSTNAME, hostname),
            (keys::OS, os),
            (keys::KERNEL, kernel),
            (keys::UPTIME, uptime),
        ]
        .into_iter()
        .map(|(key, result)| match result {
            Ok(value) => MetricSample::text(Domain::System, key, value).into(),
            Err(e) => Reading::unknown(Domain::System, key, e),
        })
        .collect();

        finish(Domain::System, readings)
    }
}

fn non_blank(s: String) -> Result<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        anyhow::bail!("empty value");
    }
    Ok(trimmed.to_string())
}

fn parse_os_release(content: &str) -> Result<String> {
    let value = content
        .lines()
        .find_map(|line| line.strip_prefix("PRETTY_NAME="))
        .context("PRETTY_NAME not found")?;
    non_blank(value.trim().trim_matches('"').to_string())
}

fn parse_proc_uptime(content: &str) -> Result<u64> {
    let first = content.split_whitespace().next().context("Empty /proc/uptime")?;
    Ok(parse_number("uptime", first)? as u64)
}

pub fn format_duration(seconds: u64) -> String {
    let days = seconds / 86400;
    let hours = (seconds % 86400) / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}
