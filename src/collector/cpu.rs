use std::{path::Path, sync::Arc, time::Duration};

use anyhow::{Context, Result};

use super::{FallbackChain, MetricSource, finish, parse_number, run_nonempty};
use crate::error::{CollectionError, ParseError};
use crate::probe::HostProbe;
use crate::sample::{Domain, MetricSample, Reading, keys};

/// CPU utilisation and per-core load average.
pub struct CpuSource {
    probe: Arc<dyn HostProbe>,
    sample_interval: Duration,
}

impl CpuSource {
    pub fn new(probe: Arc<dyn HostProbe>, sample_interval: Duration) -> Self {
        Self {
            probe,
            sample_interval,
        }
    }

    fn usage(&self) -> Result<f64, CollectionError> {
        let probe = self.probe.as_ref();

        FallbackChain::new(keys::CPU_USAGE)
            .then("mpstat", || {
                let out = run_nonempty(probe, "mpstat", &["1", "1"])?;
                Ok(100.0 - parse_mpstat_idle(&out)?)
            })
            .then("top", || {
                let out = run_nonempty(probe, "top", &["-bn1"])?;
                Ok(100.0 - parse_top_idle(&out)?)
            })
            .then("/proc/stat", || {
                let first = read_cpu_stats(probe)?;
                probe.pause(self.sample_interval);
                let second = read_cpu_stats(probe)?;
                second
                    .usage_percent(&first)
                    .context("no CPU time elapsed between samples")
            })
            .run()
            .map(|usage| usage.clamp(0.0, 100.0))
    }

    fn load_per_core(&self) -> Result<f64, CollectionError> {
        let probe = self.probe.as_ref();

        let load = FallbackChain::new(keys::LOAD)
            .then("/proc/loadavg", || {
                parse_loadavg(&probe.read_file(Path::new("/proc/loadavg"))?)
            })
            .then("uptime", || parse_uptime_load(&run_nonempty(probe, "uptime", &[])?))
            .run()?;

        let cores = probe.cpu_count().max(1);
        Ok(load / cores as f64)
    }
}

impl MetricSource for CpuSource {
    fn domain(&self) -> Domain {
        Domain::Cpu
    }

    fn collect(&self) -> Result<Vec<Reading>, CollectionError> {
        let usage = match self.usage() {
            Ok(v) => MetricSample::percent(Domain::Cpu, keys::CPU_USAGE, v).into(),
            Err(e) => Reading::unknown(Domain::Cpu, keys::CPU_USAGE, e),
        };
        let load = match self.load_per_core() {
            Ok(v) => MetricSample::ratio(Domain::Cpu, keys::LOAD, v).into(),
            Err(e) => Reading::unknown(Domain::Cpu, keys::LOAD, e),
        };

        finish(Domain::Cpu, vec![usage, load])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CpuStats {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

impl CpuStats {
    pub fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }

    pub fn idle_total(&self) -> u64 {
        self.idle + self.iowait
    }

    /// Busy share between two snapshots; `None` if no ticks elapsed.
    pub fn usage_percent(&self, prev: &CpuStats) -> Option<f64> {
        let total_delta = self.total().saturating_sub(prev.total());
        let idle_delta = self.idle_total().saturating_sub(prev.idle_total());

        if total_delta == 0 {
            return None;
        }

        let busy_delta = total_delta.saturating_sub(idle_delta);
        Some(busy_delta as f64 / total_delta as f64 * 100.0)
    }
}

fn read_cpu_stats(probe: &dyn HostProbe) -> Result<CpuStats> {
    let content = probe
        .read_file(Path::new("/proc/stat"))
        .context("Failed to read /proc/stat")?;
    parse_cpu_stats(&content)
}

pub fn parse_cpu_stats(content: &str) -> Result<CpuStats> {
    let line = content.lines().next().context("Empty /proc/stat")?;

    if !line.starts_with("cpu ") {
        anyhow::bail!("Unexpected /proc/stat format");
    }

    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 9 {
        anyhow::bail!("Not enough fields in /proc/stat cpu line");
    }

    Ok(CpuStats {
        user: parts[1].parse().context("Parse user")?,
        nice: parts[2].parse().context("Parse nice")?,
        system: parts[3].parse().context("Parse system")?,
        idle: parts[4].parse().context("Parse idle")?,
        iowait: parts[5].parse().context("Parse iowait")?,
        irq: parts[6].parse().context("Parse irq")?,
        softirq: parts[7].parse().context("Parse softirq")?,
        steal: parts[8].parse().context("Parse steal")?,
    })
}

/// `%idle` column of the `Average:` row.
fn parse_mpstat_idle(output: &str) -> Result<f64, ParseError> {
    let header = output
        .lines()
        .find(|l| l.contains("%idle"))
        .ok_or_else(|| ParseError::missing("mpstat header"))?;
    let columns: Vec<&str> = header.split_whitespace().collect();
    let from_end = columns
        .iter()
        .rev()
        .position(|c| *c == "%idle")
        .ok_or_else(|| ParseError::missing("%idle column"))?;

    // counted from the right: the time column may carry an AM/PM suffix
    let average = output
        .lines()
        .find(|l| l.starts_with("Average:"))
        .ok_or_else(|| ParseError::missing("mpstat average row"))?;
    let raw = average
        .split_whitespace()
        .rev()
        .nth(from_end)
        .ok_or_else(|| ParseError::missing("%idle value"))?;

    parse_number("mpstat idle", raw)
}

/// Idle figure from the `%Cpu(s):` / `Cpu(s):` summary line.
fn parse_top_idle(output: &str) -> Result<f64, ParseError> {
    let line = output
        .lines()
        .find(|l| l.contains("Cpu(s)"))
        .ok_or_else(|| ParseError::missing("Cpu(s) line"))?;

    let tokens: Vec<&str> = line.split_whitespace().map(|t| t.trim_end_matches(',')).collect();

    // older procps prints "95.8%id" as a single token
    if let Some(raw) = tokens.iter().find_map(|t| t.strip_suffix("%id")) {
        return parse_number("top idle", raw);
    }

    let idx = tokens
        .iter()
        .position(|t| *t == "id")
        .ok_or_else(|| ParseError::missing("idle field"))?;
    let raw = idx
        .checked_sub(1)
        .and_then(|i| tokens.get(i))
        .ok_or_else(|| ParseError::missing("idle value"))?;

    parse_number("top idle", raw)
}

fn parse_loadavg(content: &str) -> Result<f64> {
    let first = content
        .split_whitespace()
        .next()
        .context("Invalid /proc/loadavg format")?;
    Ok(parse_number("1m load", first)?)
}

fn parse_uptime_load(output: &str) -> Result<f64> {
    let (_, rest) = output
        .split_once("load average:")
        .or_else(|| output.split_once("load averages:"))
        .context("no load average in uptime output")?;
    let first = rest
        .split(", ")
        .next()
        .context("empty load average")?;
    Ok(parse_number("1m load", first)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::fake::FakeProbe;

    const MPSTAT: &str = "\
Linux 6.8.0 (web-01) \t10/19/2026 \t_x86_64_\t(4 CPU)

02:30:01 PM  CPU    %usr   %nice    %sys %iowait    %irq   %soft  %steal  %guest  %gnice   %idle
02:30:02 PM  all   10.25    0.00    4.75    0.00    0.00    0.00    0.00    0.00    0.00   85.00
Average:     all   10.25    0.00    4.75    0.00    0.00    0.00    0.00    0.00    0.00   85.00
";

    const TOP: &str = "\
top - 14:30:00 up 1 day,  2:03,  1 user,  load average: 0.52, 0.58, 0.59
Tasks: 212 total,   1 running, 211 sleeping,   0 stopped,   0 zombie
%Cpu(s): 12,5 us,  2,5 sy,  0,0 ni, 85,0 id,  0,0 wa,  0,0 hi,  0,0 si,  0,0 st
";

    fn usage_of(readings: &[Reading]) -> f64 {
        match &readings[0] {
            Reading::Sample(s) => s.number().unwrap(),
            other => panic!("expected sample, got {:?}", other),
        }
    }

    #[test]
    fn test_mpstat_is_primary() {
        let probe = Arc::new(
            FakeProbe::new()
                .command("mpstat 1 1", 0, MPSTAT)
                .command("top -bn1", 0, TOP)
                .file("/proc/loadavg", "0.52 0.58 0.59 1/212 4242\n"),
        );
        let source = CpuSource::new(probe.clone(), Duration::from_secs(1));
        let readings = source.collect().unwrap();

        assert!((usage_of(&readings) - 15.0).abs() < 1e-9);
        assert!(!probe.calls().iter().any(|c| c.contains("top")));
    }

    #[test]
    fn test_top_with_decimal_comma() {
        let probe = Arc::new(
            FakeProbe::new()
                .command("top -bn1", 0, TOP)
                .file("/proc/loadavg", "0.52 0.58 0.59 1/212 4242\n"),
        );
        let readings = CpuSource::new(probe, Duration::from_secs(1)).collect().unwrap();
        assert!((usage_of(&readings) - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_utilities_fall_back_to_proc_stat_delta() {
        let probe = Arc::new(
            FakeProbe::new()
                .command("mpstat 1 1", 0, "")
                .command("top -bn1", 0, "garbage\n")
                .file("/proc/stat", "cpu  100 0 100 800 0 0 0 0 0 0\n")
                .file("/proc/stat", "cpu  150 0 150 900 0 0 0 0 0 0\n")
                .file("/proc/loadavg", "2.00 1.00 0.50 1/100 1\n"),
        );
        let readings = CpuSource::new(probe.clone(), Duration::from_secs(1))
            .collect()
            .unwrap();

        // 100 busy out of 200 elapsed ticks
        assert!((usage_of(&readings) - 50.0).abs() < 1e-9);

        let calls = probe.calls();
        let mpstat = calls.iter().position(|c| c == "run mpstat 1 1").unwrap();
        let top = calls.iter().position(|c| c == "run top -bn1").unwrap();
        let stat = calls.iter().position(|c| c == "read /proc/stat").unwrap();
        assert!(mpstat < top && top < stat);
    }

    #[test]
    fn test_load_is_divided_by_cores() {
        let probe = Arc::new(
            FakeProbe::new()
                .cpus(4)
                .command("mpstat 1 1", 0, MPSTAT)
                .command(
                    "uptime",
                    0,
                    " 14:30:00 up 1 day,  1 user,  load average: 6,00, 5,00, 4,00\n",
                ),
        );
        let readings = CpuSource::new(probe, Duration::from_secs(1)).collect().unwrap();
        assert_eq!(
            readings[1],
            Reading::Sample(MetricSample::ratio(Domain::Cpu, keys::LOAD, 1.5))
        );
    }

    #[test]
    fn test_no_usage_source_is_unknown_not_zero() {
        let probe = Arc::new(FakeProbe::new().file("/proc/loadavg", "0.10 0.10 0.10 1/1 1\n"));
        let readings = CpuSource::new(probe, Duration::from_secs(1)).collect().unwrap();
        assert!(matches!(&readings[0], Reading::Unknown { key, .. } if key == keys::CPU_USAGE));
    }

    #[test]
    fn test_top_legacy_format() {
        let out = "Cpu(s):  3.1%us,  1.0%sy,  0.0%ni, 95.8%id,  0.1%wa\n";
        assert!((parse_top_idle(out).unwrap() - 95.8).abs() < 1e-9);
    }

    #[test]
    fn test_cpu_stats_usage() {
        let prev = parse_cpu_stats("cpu  10 0 10 80 0 0 0 0\n").unwrap();
        let cur = parse_cpu_stats("cpu  10 0 10 80 0 0 0 0\n").unwrap();
        assert_eq!(cur.usage_percent(&prev), None);
        assert!(parse_cpu_stats("intr 1 2 3\n").is_err());
    }
}
