use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use anyhow::Result;
use time::macros::format_description;

use crate::cli::OutputFormat;
use crate::error::PersistenceError;
use crate::finding::{Finding, Severity};
use crate::sample::Domain;

const RESET: &str = "\x1b[0m";

/// Append-only text log, one line per finding.
struct LogFile {
    path: PathBuf,
    file: File,
}

impl LogFile {
    fn open(path: &Path) -> Result<Self, PersistenceError> {
        let wrap = |source| PersistenceError {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(wrap)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(wrap)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    fn append(&mut self, findings: &[Finding]) -> Result<(), PersistenceError> {
        let mut buf = String::new();
        for finding in findings {
            buf.push_str(&log_line(finding));
            buf.push('\n');
        }

        self.file
            .write_all(buf.as_bytes())
            .and_then(|()| self.file.flush())
            .map_err(|source| PersistenceError {
                path: self.path.clone(),
                source,
            })
    }
}

/// `[YYYY-MM-DD HH:MM:SS] [SEVERITY] message`
pub fn log_line(finding: &Finding) -> String {
    let stamp = finding
        .ts
        .format(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second]"
        ))
        .unwrap_or_else(|_| finding.ts.to_string());
    format!("[{}] [{}] {}", stamp, finding.severity, finding.message)
}

/// Renders findings to the console and, when enabled, the persisted log.
///
/// `out` receives findings; `diag` receives the single persistence warning so
/// that JSON output stays parseable.
pub struct Reporter<W: Write, E: Write> {
    out: W,
    diag: E,
    format: OutputFormat,
    quiet: bool,
    color: bool,
    log: Option<LogFile>,
}

impl<W: Write, E: Write> Reporter<W, E> {
    pub fn new(out: W, diag: E, format: OutputFormat) -> Self {
        Self {
            out,
            diag,
            format,
            quiet: false,
            color: false,
            log: None,
        }
    }

    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    /// Open the persisted log. Failure disables logging after one warning.
    pub fn log_to(mut self, path: &Path) -> Self {
        match LogFile::open(path) {
            Ok(log) => self.log = Some(log),
            Err(e) => self.disable_log(e),
        }
        self
    }

    fn disable_log(&mut self, err: PersistenceError) {
        self.log = None;
        tracing::debug!(error = ?err, "persisted log disabled");
        let _ = writeln!(self.diag, "warning: logging disabled: {}", err);
    }

    pub fn emit(&mut self, findings: &[Finding]) -> Result<()> {
        match self.format {
            OutputFormat::Human => self.write_human(findings)?,
            OutputFormat::Json => {
                serde_json::to_writer_pretty(&mut self.out, findings)?;
                writeln!(self.out)?;
            }
        }
        self.out.flush()?;

        let failed = self.log.as_mut().and_then(|log| log.append(findings).err());
        if let Some(e) = failed {
            self.disable_log(e);
        }
        Ok(())
    }

    fn write_human(&mut self, findings: &[Finding]) -> io::Result<()> {
        let mut section: Option<Domain> = None;

        for finding in findings {
            if self.quiet && finding.severity < Severity::Warning {
                continue;
            }

            if section != Some(finding.domain) {
                if section.is_some() {
                    writeln!(self.out)?;
                }
                writeln!(self.out, "=== {} ===", finding.domain)?;
                section = Some(finding.domain);
            }

            let tag = format!("[{}]", finding.severity);
            if self.color {
                writeln!(
                    self.out,
                    "{}{}{} {}",
                    colour(finding.severity),
                    tag,
                    RESET,
                    finding.message
                )?;
            } else {
                writeln!(self.out, "{} {}", tag, finding.message)?;
            }
        }

        if section.is_some() {
            writeln!(self.out)?;
        }
        writeln!(self.out, "{}", summary(findings))
    }

    #[cfg(test)]
    fn into_parts(self) -> (W, E) {
        (self.out, self.diag)
    }
}

fn colour(severity: Severity) -> &'static str {
    match severity {
        Severity::Ok => "\x1b[32m",
        Severity::Info => "\x1b[36m",
        Severity::Warning => "\x1b[33m",
        Severity::Critical => "\x1b[31m",
    }
}

pub fn summary(findings: &[Finding]) -> String {
    let count = |s: Severity| findings.iter().filter(|f| f.severity == s).count();
    format!(
        "Summary: {} ok, {} info, {} warning, {} critical",
        count(Severity::Ok),
        count(Severity::Info),
        count(Severity::Warning),
        count(Severity::Critical)
    )
}
