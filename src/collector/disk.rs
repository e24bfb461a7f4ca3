use std::{collections::HashSet, path::Path, sync::Arc};

use anyhow::Result;

use super::{FallbackChain, MetricSource, parse_number, run_nonempty};
use crate::error::CollectionError;
use crate::probe::HostProbe;
use crate::sample::{Domain, MetricSample, Reading};

const PSEUDO_TYPES: &[&str] = &[
    "tmpfs",
    "devtmpfs",
    "ramfs",
    "squashfs",
    "iso9660",
    "udf",
    "overlay",
    "proc",
    "sysfs",
    "devpts",
    "cgroup",
    "cgroup2",
    "efivarfs",
    "autofs",
    "debugfs",
    "tracefs",
    "securityfs",
    "pstore",
    "bpf",
    "mqueue",
    "hugetlbfs",
    "fusectl",
    "configfs",
    "binfmt_misc",
    "nsfs",
];

const PSEUDO_DEVICES: &[&str] = &["/dev/loop", "/dev/sr", "/dev/cdrom"];

/// One usage sample per mounted, non-virtual filesystem.
pub struct DiskSource {
    probe: Arc<dyn HostProbe>,
}

impl DiskSource {
    pub fn new(probe: Arc<dyn HostProbe>) -> Self {
        Self { probe }
    }
}

impl MetricSource for DiskSource {
    fn domain(&self) -> Domain {
        Domain::Disk
    }

    fn collect(&self) -> Result<Vec<Reading>, CollectionError> {
        let probe = self.probe.as_ref();

        FallbackChain::new("filesystems")
            .then("df", || {
                require_any(parse_df(&run_nonempty(probe, "df", &["-P", "-T"])?))
            })
            .then("/proc/mounts", || {
                let mounts = probe.read_file(Path::new("/proc/mounts"))?;
                require_any(read_mounts(probe, &mounts))
            })
            .run()
    }
}

pub fn is_pseudo(device: &str, fstype: &str) -> bool {
    device == "none"
        || PSEUDO_TYPES.contains(&fstype)
        || PSEUDO_DEVICES.iter().any(|p| device.starts_with(p))
}

fn require_any(readings: Vec<Reading>) -> Result<Vec<Reading>> {
    if readings.is_empty() {
        anyhow::bail!("no real filesystems listed");
    }
    Ok(readings)
}

/// `df -P -T`: `Filesystem Type 1024-blocks Used Available Capacity Mounted on`.
pub fn parse_df(output: &str) -> Vec<Reading> {
    let mut seen = HashSet::new();
    let mut readings = Vec::new();

    for line in output.lines().skip(1) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 7 {
            continue;
        }

        let (device, fstype, capacity) = (parts[0], parts[1], parts[5]);
        if is_pseudo(device, fstype) {
            continue;
        }

        let mount_point = parts[6..].join(" ");
        if !seen.insert(mount_point.clone()) {
            continue;
        }

        readings.push(match parse_number(&format!("usage of {}", mount_point), capacity) {
            Ok(pct) => MetricSample::percent(Domain::Disk, mount_point, pct).into(),
            Err(e) => Reading::unknown(Domain::Disk, mount_point, e),
        });
    }

    readings
}

fn read_mounts(probe: &dyn HostProbe, mounts: &str) -> Vec<Reading> {
    let mut seen = HashSet::new();
    let mut readings = Vec::new();

    for line in mounts.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 3 {
            continue;
        }

        let (device, fstype) = (parts[0], parts[2]);
        // block devices and network shares only
        if is_pseudo(device, fstype) || !(device.starts_with('/') || device.contains(':')) {
            continue;
        }

        let mount_point = unescape_mount(parts[1]);
        if !seen.insert(mount_point.clone()) {
            continue;
        }

        let reading = match probe.fs_usage(&mount_point) {
            Ok(usage) => match usage.usage_percent() {
                Some(pct) => MetricSample::percent(Domain::Disk, mount_point, pct).into(),
                None => Reading::unknown(Domain::Disk, mount_point, "filesystem reports zero size"),
            },
            Err(e) => Reading::unknown(Domain::Disk, mount_point, format!("statvfs failed: {}", e)),
        };
        readings.push(reading);
    }

    readings
}

/// `/proc/mounts` encodes space, tab, newline and backslash as octal escapes.
fn unescape_mount(raw: &str) -> String {
    raw.replace("\\040", " ")
        .replace("\\011", "\t")
        .replace("\\012", "\n")
        .replace("\\134", "\\")
}
