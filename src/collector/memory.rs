use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};

use super::{FallbackChain, MetricSource, finish, parse_count, run_nonempty};
use crate::error::CollectionError;
use crate::probe::HostProbe;
use crate::sample::{Domain, MetricSample, Reading, keys};

/// RAM and swap usage.
pub struct MemorySource {
    probe: Arc<dyn HostProbe>,
}

impl MemorySource {
    pub fn new(probe: Arc<dyn HostProbe>) -> Self {
        Self { probe }
    }
}

impl MetricSource for MemorySource {
    fn domain(&self) -> Domain {
        Domain::Memory
    }

    fn collect(&self) -> Result<Vec<Reading>, CollectionError> {
        let probe = self.probe.as_ref();

        let stats = FallbackChain::new(keys::MEMORY)
            .then("/proc/meminfo", || {
                parse_meminfo(&probe.read_file(Path::new("/proc/meminfo"))?)
            })
            .then("free", || parse_free(&run_nonempty(probe, "free", &["-b"])?))
            .run()?;

        let mut readings: Vec<Reading> = Vec::with_capacity(2);
        match stats.usage_percent() {
            Some(pct) => {
                readings.push(MetricSample::percent(Domain::Memory, keys::MEMORY, pct).into())
            }
            None => readings.push(Reading::unknown(
                Domain::Memory,
                keys::MEMORY,
                "total memory reported as zero",
            )),
        }
        if let Some(pct) = stats.swap_usage_percent() {
            readings.push(MetricSample::percent(Domain::Memory, keys::SWAP, pct).into());
        }

        finish(Domain::Memory, readings)
    }
}

/// Sizes in bytes.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MemoryStats {
    pub total: u64,
    pub free: u64,
    pub available: Option<u64>,
    pub buffers: u64,
    pub cached: u64,
    pub swap_total: u64,
    pub swap_free: u64,
}

impl MemoryStats {
    pub fn used(&self) -> u64 {
        match self.available {
            Some(available) => self.total.saturating_sub(available),
            // kernels before 3.14 lack MemAvailable
            None => self
                .total
                .saturating_sub(self.free + self.buffers + self.cached),
        }
    }

    pub fn usage_percent(&self) -> Option<f64> {
        if self.total == 0 {
            return None;
        }
        Some(self.used() as f64 / self.total as f64 * 100.0)
    }

    /// `None` when the host has no swap configured.
    pub fn swap_usage_percent(&self) -> Option<f64> {
        if self.swap_total == 0 {
            return None;
        }
        let used = self.swap_total.saturating_sub(self.swap_free);
        Some(used as f64 / self.swap_total as f64 * 100.0)
    }
}

pub fn parse_meminfo(content: &str) -> Result<MemoryStats> {
    let mut stats = MemoryStats::default();
    let mut saw_total = false;

    for line in content.lines() {
        if let Some(value) = line.strip_prefix("MemTotal:") {
            stats.total = parse_meminfo_value(value)?;
            saw_total = true;
        } else if let Some(value) = line.strip_prefix("MemFree:") {
            stats.free = parse_meminfo_value(value)?;
        } else if let Some(value) = line.strip_prefix("MemAvailable:") {
            stats.available = Some(parse_meminfo_value(value)?);
        } else if let Some(value) = line.strip_prefix("Buffers:") {
            stats.buffers = parse_meminfo_value(value)?;
        } else if let Some(value) = line.strip_prefix("Cached:") {
            stats.cached = parse_meminfo_value(value)?;
        } else if let Some(value) = line.strip_prefix("SwapTotal:") {
            stats.swap_total = parse_meminfo_value(value)?;
        } else if let Some(value) = line.strip_prefix("SwapFree:") {
            stats.swap_free = parse_meminfo_value(value)?;
        }
    }

    if !saw_total {
        anyhow::bail!("MemTotal missing from /proc/meminfo");
    }
    Ok(stats)
}

fn parse_meminfo_value(s: &str) -> Result<u64> {
    let kb = s
        .split_whitespace()
        .next()
        .context("Missing value")?;
    Ok(parse_count("meminfo value", kb)? * 1024)
}

/// `free -b`. Columns are located by header name: procps-ng before 3.3.10
/// prints `shared buffers cached` and has no `available` column.
pub fn parse_free(output: &str) -> Result<MemoryStats> {
    let mut stats = MemoryStats::default();
    let mut saw_mem = false;
    let mut header: Vec<&str> = Vec::new();

    for line in output.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.first() == Some(&"total") {
            header = parts;
            continue;
        }

        // row values are shifted one right of their header by the `Mem:` label
        let column = |name: &str| {
            header
                .iter()
                .position(|h| *h == name)
                .and_then(|i| parts.get(i + 1).copied())
        };

        match parts.first().copied() {
            Some("Mem:") if parts.len() >= 4 => {
                stats.total = parse_count("free total", parts[1])?;
                stats.free = parse_count("free free", parts[3])?;
                if let Some(raw) = column("available") {
                    stats.available = Some(parse_count("free available", raw)?);
                }
                if let Some(raw) = column("buffers") {
                    stats.buffers = parse_count("free buffers", raw)?;
                }
                if let Some(raw) = column("cached") {
                    stats.cached = parse_count("free cached", raw)?;
                }
                saw_mem = true;
            }
            Some("Swap:") if parts.len() >= 4 => {
                stats.swap_total = parse_count("swap total", parts[1])?;
                stats.swap_free = parse_count("swap free", parts[3])?;
            }
            _ => {}
        }
    }

    if !saw_mem {
        anyhow::bail!("no Mem: row in free output");
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::fake::FakeProbe;

    const MEMINFO: &str = "\
MemTotal:        8000000 kB
MemFree:          500000 kB
MemAvailable:    2000000 kB
Buffers:          100000 kB
Cached:          1500000 kB
SwapTotal:       2000000 kB
SwapFree:        1500000 kB
";

    #[test]
    fn test_meminfo_uses_available() {
        let probe = Arc::new(FakeProbe::new().file("/proc/meminfo", MEMINFO));
        let readings = MemorySource::new(probe).collect().unwrap();

        assert_eq!(
            readings,
            vec![
                Reading::Sample(MetricSample::percent(Domain::Memory, keys::MEMORY, 75.0)),
                Reading::Sample(MetricSample::percent(Domain::Memory, keys::SWAP, 25.0)),
            ]
        );
    }

    #[test]
    fn test_free_fallback_without_swap() {
        let free = "\
               total        used        free      shared  buff/cache   available
Mem:      1000000000   600000000   100000000     1000000   300000000   400000000
Swap:              0           0           0
";
        let probe = Arc::new(FakeProbe::new().command("free -b", 0, free));
        let readings = MemorySource::new(probe).collect().unwrap();

        assert_eq!(
            readings,
            vec![Reading::Sample(MetricSample::percent(Domain::Memory, keys::MEMORY, 60.0))]
        );
    }

    #[test]
    fn test_old_free_has_no_available_column() {
        let free = "\
             total       used       free     shared    buffers     cached
Mem:          1000        900        100          0        100        300
-/+ buffers/cache:        500        500
Swap:            0          0          0
";
        let stats = parse_free(free).unwrap();
        assert_eq!(stats.available, None);
        assert_eq!((stats.buffers, stats.cached), (100, 300));
        assert_eq!(stats.usage_percent(), Some(50.0));
    }

    #[test]
    fn test_legacy_meminfo_without_available() {
        let stats = parse_meminfo(
            "MemTotal: 1000 kB\nMemFree: 200 kB\nBuffers: 100 kB\nCached: 200 kB\n",
        )
        .unwrap();
        assert_eq!(stats.usage_percent(), Some(50.0));
    }

    #[test]
    fn test_nothing_readable_is_collection_error() {
        let probe = Arc::new(FakeProbe::new().command("free -b", 1, ""));
        let err = MemorySource::new(probe).collect().unwrap_err();
        assert_eq!(err.attempts.len(), 2);
    }
}
