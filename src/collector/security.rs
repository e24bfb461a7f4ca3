use std::{path::Path, sync::Arc};

use anyhow::Result;
use chrono::NaiveDateTime;

use super::log::{line_timestamp, read_journal};
use super::{FallbackChain, MetricSource, finish, run_ok};
use crate::error::CollectionError;
use crate::probe::HostProbe;
use crate::sample::{Domain, MetricSample, Reading, keys};

/// sshd's own report of a rejected credential, one line per attempt.
const SSHD_FAILURES: &[&str] = &["Failed password", "Failed publickey"];

/// Pending package upgrades and today's failed login attempts.
pub struct SecuritySource {
    probe: Arc<dyn HostProbe>,
}

impl SecuritySource {
    pub fn new(probe: Arc<dyn HostProbe>) -> Self {
        Self { probe }
    }

    fn upgrades(&self) -> Result<u64, CollectionError> {
        let probe = self.probe.as_ref();

        FallbackChain::new(keys::UPGRADES)
            .then("apt list", || {
                let output = run_ok(probe, "apt", &["list", "--upgradable"])?;
                Ok(count_matching(&output.stdout, |l| l.contains("[upgradable from")))
            })
            .then("apt-get -s upgrade", || {
                let output = run_ok(probe, "apt-get", &["-s", "upgrade"])?;
                Ok(count_matching(&output.stdout, |l| l.starts_with("Inst ")))
            })
            .then("dnf check-update", || dnf_updates(probe))
            .run()
    }

    fn failed_logins(&self) -> Result<u64, CollectionError> {
        let probe = self.probe.as_ref();
        let now = probe.local_now();
        let since = format!("{} 00:00:00", now.format("%Y-%m-%d"));

        FallbackChain::new(keys::FAILED_LOGINS)
            .then("journalctl", || {
                // auth (4) is sshd's default facility, authpriv (10) carries PAM
                let stdout = read_journal(
                    probe,
                    &["--since", since.as_str(), "SYSLOG_FACILITY=4", "SYSLOG_FACILITY=10"],
                )?;
                Ok(count_matching(&stdout, is_failed_login))
            })
            .then("/var/log/auth.log", || {
                failed_logins_in(probe, Path::new("/var/log/auth.log"), now)
            })
            .then("/var/log/secure", || {
                failed_logins_in(probe, Path::new("/var/log/secure"), now)
            })
            .run()
    }
}

impl MetricSource for SecuritySource {
    fn domain(&self) -> Domain {
        Domain::Security
    }

    fn collect(&self) -> Result<Vec<Reading>, CollectionError> {
        let readings = [
            (keys::UPGRADES, self.upgrades()),
            (keys::FAILED_LOGINS, self.failed_logins()),
        ]
        .into_iter()
        .map(|(key, result)| match result {
            Ok(n) => Reading::Sample(MetricSample::count(Domain::Security, key, n)),
            Err(e) => Reading::unknown(Domain::Security, key, e),
        })
        .collect();

        finish(Domain::Security, readings)
    }
}

fn count_matching(output: &str, pred: impl Fn(&str) -> bool) -> u64 {
    output.lines().filter(|&l| pred(l)).count() as u64
}

/// One match per attempt: sshd also logs each failed password through
/// `pam_unix(sshd:auth)`, so PAM failures only count for other services.
fn is_failed_login(line: &str) -> bool {
    if SSHD_FAILURES.iter().any(|m| line.contains(m)) {
        return true;
    }
    line.contains("authentication failure") && !line.contains("(sshd:auth)")
}

/// `dnf check-update` exits 100 when updates exist and 0 when there are none.
fn dnf_updates(probe: &dyn HostProbe) -> Result<u64> {
    let output = probe.run("dnf", &["check-update", "-q"])?;
    match output.code {
        Some(0) => Ok(0),
        Some(100) => {
            let stdout = output.stdout.lines().take_while(|l| !l.starts_with("Obsoleting"));
            Ok(stdout.filter(|l| l.split_whitespace().count() >= 3).count() as u64)
        }
        other => anyhow::bail!("dnf check-update exited with {:?}", other),
    }
}

fn failed_logins_in(probe: &dyn HostProbe, path: &Path, now: NaiveDateTime) -> Result<u64> {
    let content = probe.read_file(path)?;
    let today = now.date();

    let count = content
        .lines()
        .filter(|l| line_timestamp(l, now).is_some_and(|ts| ts.date() == today))
        .filter(|l| is_failed_login(l))
        .count();
    Ok(count as u64)
}
