use std::{path::Path, sync::Arc, time::Duration};

use anyhow::Result;
use chrono::{Datelike, NaiveDateTime, TimeDelta};

use super::{FallbackChain, MetricSource, run_ok};
use crate::error::CollectionError;
use crate::probe::HostProbe;
use crate::sample::{Domain, MetricSample, Reading, keys};

const JOURNAL_TIME: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LogCounts {
    pub errors: u64,
    pub critical: u64,
}

/// Error and critical entries within a trailing time window.
pub struct LogSource {
    probe: Arc<dyn HostProbe>,
    window: Duration,
}

impl LogSource {
    pub fn new(probe: Arc<dyn HostProbe>, window: Duration) -> Self {
        Self { probe, window }
    }

    fn cutoff(&self) -> NaiveDateTime {
        let window = TimeDelta::from_std(self.window).unwrap_or(TimeDelta::hours(1));
        self.probe.local_now() - window
    }
}

impl MetricSource for LogSource {
    fn domain(&self) -> Domain {
        Domain::Log
    }

    fn collect(&self) -> Result<Vec<Reading>, CollectionError> {
        let probe = self.probe.as_ref();
        let cutoff = self.cutoff();
        let since = cutoff.format(JOURNAL_TIME).to_string();

        let counts = FallbackChain::new("system logs")
            .then("journalctl", || {
                Ok(LogCounts {
                    errors: journal_count(probe, &since, "err..err")?,
                    critical: journal_count(probe, &since, "emerg..crit")?,
                })
            })
            .then("/var/log/syslog", || {
                scan_log_file(probe, Path::new("/var/log/syslog"), cutoff)
            })
            .then("/var/log/messages", || {
                scan_log_file(probe, Path::new("/var/log/messages"), cutoff)
            })
            .run()?;

        Ok(vec![
            Reading::Sample(MetricSample::count(
                Domain::Log,
                keys::LOG_ERRORS,
                counts.errors,
            )),
            Reading::Sample(MetricSample::count(
                Domain::Log,
                keys::LOG_CRITICAL,
                counts.critical,
            )),
        ])
    }
}

fn journal_count(probe: &dyn HostProbe, since: &str, priority: &str) -> Result<u64> {
    let stdout = read_journal(probe, &["--since", since, "-p", priority])?;
    Ok(count_entries(&stdout))
}

/// System journal as plain message text.
///
/// Without read access journalctl still exits 0 with an empty listing, so its
/// permission notice is treated as a failure rather than as zero entries.
pub(crate) fn read_journal(probe: &dyn HostProbe, filters: &[&str]) -> Result<String> {
    let mut args = vec!["--system"];
    args.extend_from_slice(filters);
    args.extend_from_slice(&["--no-pager", "-o", "cat"]);

    let output = run_ok(probe, "journalctl", &args)?;
    let stderr = output.stderr.to_lowercase();
    if stderr.contains("insufficient permissions") || stderr.contains("not seeing messages") {
        anyhow::bail!("journal not readable by this user");
    }
    Ok(output.stdout)
}

/// Non-blank lines, ignoring journalctl's `-- ... --` markers.
fn count_entries(output: &str) -> u64 {
    output
        .lines()
        .filter(|l| !l.trim().is_empty() && !l.starts_with("-- "))
        .count() as u64
}

fn scan_log_file(probe: &dyn HostProbe, path: &Path, cutoff: NaiveDateTime) -> Result<LogCounts> {
    let content = probe.read_file(path)?;
    let now = probe.local_now();

    let mut counts = LogCounts::default();
    let mut dated = 0usize;

    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        let Some(ts) = line_timestamp(line, now) else { continue };
        dated += 1;
        if ts < cutoff {
            continue;
        }

        match classify_message(message_body(line)) {
            Some(Level::Critical) => counts.critical += 1,
            Some(Level::Error) => counts.errors += 1,
            None => {}
        }
    }

    if dated == 0 && !content.trim().is_empty() {
        anyhow::bail!("no recognisable timestamps in {}", path.display());
    }
    Ok(counts)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Error,
    Critical,
}

const CRITICAL_WORDS: &[&str] = &["crit", "critical", "emerg", "emergency", "alert", "panic"];
const ERROR_WORDS: &[&str] = &["err", "error", "errors"];

/// Text after the `<stamp> <host> <tag>:` prefix.
fn message_body(line: &str) -> &str {
    line.split_once(": ").map(|(_, body)| body).unwrap_or("")
}

/// Severity keywords, matched as whole words so hostnames and program names
/// such as `alertmanager` do not count.
fn classify_message(body: &str) -> Option<Level> {
    let lower = body.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    if words.iter().any(|w| CRITICAL_WORDS.contains(w)) {
        Some(Level::Critical)
    } else if words.iter().any(|w| ERROR_WORDS.contains(w)) {
        Some(Level::Error)
    } else {
        None
    }
}

/// Timestamp of a syslog line, either RFC3339 or the classic `Oct 19 14:03:22`.
///
/// Classic stamps carry no year; one in the future belongs to last year.
pub(crate) fn line_timestamp(line: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let first = line.split_whitespace().next()?;
    if let Ok(ts) = chrono::DateTime::parse_from_rfc3339(first) {
        return Some(ts.naive_local());
    }

    let mut tokens = line.split_whitespace();
    let (month, day, clock) = (tokens.next()?, tokens.next()?, tokens.next()?);
    let stamp = format!("{} {} {} {}", now.year(), month, day, clock);
    let ts = NaiveDateTime::parse_from_str(&stamp, "%Y %b %d %H:%M:%S").ok()?;

    if ts > now + TimeDelta::days(1) {
        return ts.with_year(now.year() - 1);
    }
    Some(ts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::CommandOutput;
    use crate::probe::fake::FakeProbe;

    fn counts(readings: &[Reading]) -> (f64, f64) {
        let value = |r: &Reading| match r {
            Reading::Sample(s) => s.number().unwrap(),
            other => panic!("expected sample, got {:?}", other),
        };
        (value(&readings[0]), value(&readings[1]))
    }

    const JOURNAL_ERR: &str =
        "journalctl --system --since 2026-10-19 13:30:00 -p err..err --no-pager -o cat";
    const JOURNAL_CRIT: &str =
        "journalctl --system --since 2026-10-19 13:30:00 -p emerg..crit --no-pager -o cat";

    #[test]
    fn test_journal_window_is_bounded() {
        let probe = Arc::new(
            FakeProbe::new()
                .command(JOURNAL_ERR, 0, "disk error on sda\nnginx: upstream error\n")
                .command(JOURNAL_CRIT, 0, "-- No entries --\n"),
        );
        let readings = LogSource::new(probe, Duration::from_secs(3600)).collect().unwrap();
        assert_eq!(counts(&readings), (2.0, 0.0));
    }

    #[test]
    fn test_syslog_fallback_counts_only_recent_lines() {
        let syslog = "\
Oct 19 12:00:00 web-01 kernel: I/O error, dev sda, sector 1
Oct 19 13:45:10 web-01 nginx[881]: connect() failed with error 111
Oct 19 14:01:02 web-01 kernel: CRITICAL temperature reached
Oct 19 14:10:00 web-01 systemd[1]: Started Daily apt upgrade.
2026-10-19T14:20:00.123456+02:00 web-01 app[42]: unhandled error in worker
";
        let probe = Arc::new(
            FakeProbe::new()
                .command(JOURNAL_ERR, 1, "")
                .file("/var/log/syslog", syslog),
        );
        let readings = LogSource::new(probe, Duration::from_secs(3600)).collect().unwrap();
        assert_eq!(counts(&readings), (2.0, 1.0));
    }

    #[test]
    fn test_unreadable_journal_falls_through() {
        let denied = CommandOutput {
            code: Some(0),
            stdout: "-- No entries --\n".to_string(),
            stderr: "Hint: You are currently not seeing messages from other users and the \
                     system.\nNo journal files were opened due to insufficient permissions.\n"
                .to_string(),
        };
        let probe = Arc::new(
            FakeProbe::new()
                .command_output(JOURNAL_ERR, denied.clone())
                .command_output(JOURNAL_CRIT, denied),
        );

        let err = LogSource::new(probe, Duration::from_secs(3600)).collect().unwrap_err();
        assert!(err.attempts[0].contains("not readable"));
    }

    #[test]
    fn test_program_and_host_names_are_not_severities() {
        let syslog = "\
Oct 19 14:00:01 mon-01 alertmanager[900]: level=info msg=\"Completed loading of configuration\"
Oct 19 14:05:00 critter-01 systemd-logind[611]: New session 42 of user deploy.
Oct 19 14:06:00 critter-01 systemd[1]: Started Session 42 of User deploy.
Oct 19 14:07:00 mon-01 alertmanager[900]: level=error msg=\"Notify for alerts failed\"
Oct 19 14:08:00 critter-01 kernel: [ 12.3] Kernel panic - not syncing
";
        let probe = Arc::new(FakeProbe::new().file("/var/log/syslog", syslog));
        let readings = LogSource::new(probe, Duration::from_secs(3600)).collect().unwrap();
        assert_eq!(counts(&readings), (1.0, 1.0));
    }

    #[test]
    fn test_messages_is_last_resort() {
        let probe = Arc::new(
            FakeProbe::new()
                .file("/var/log/syslog", "garbage without dates\n")
                .file("/var/log/messages", "Oct 19 14:29:59 db kernel: panic averted\n"),
        );
        let readings = LogSource::new(probe, Duration::from_secs(3600)).collect().unwrap();
        assert_eq!(counts(&readings), (0.0, 1.0));
    }

    #[test]
    fn test_no_log_access_is_collection_error() {
        let probe = Arc::new(FakeProbe::new());
        let err = LogSource::new(probe, Duration::from_secs(3600)).collect().unwrap_err();
        assert_eq!(err.attempts.len(), 3);
    }

    #[test]
    fn test_count_entries_skips_journal_markers() {
        assert_eq!(count_entries("-- No entries --\n"), 0);
        assert_eq!(count_entries("a\n\n-- Boot 3f2a --\nb\n"), 2);
    }

    #[test]
    fn test_year_rollover() {
        let now = NaiveDateTime::parse_from_str("2026-01-01 00:10:00", JOURNAL_TIME).unwrap();
        let ts = line_timestamp("Dec 31 23:59:00 host cron: x", now).unwrap();
        assert_eq!(ts.year(), 2025);
    }
}
