use std::{
    ffi::CString,
    fs, io,
    net::{SocketAddr, TcpStream, ToSocketAddrs},
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use tokio::runtime::Runtime;

/// Captured result of one external command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FsUsage {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub available_bytes: u64,
}

impl FsUsage {
    /// Used share of the space visible to unprivileged users, as `df` reports it.
    pub fn usage_percent(&self) -> Option<f64> {
        let visible = self.used_bytes + self.available_bytes;
        if visible == 0 {
            return None;
        }
        Some(self.used_bytes as f64 / visible as f64 * 100.0)
    }
}

/// Raw access to the host. Sources only ever talk to the OS through this.
pub trait HostProbe: Send + Sync {
    fn read_file(&self, path: &Path) -> io::Result<String>;

    /// Run a program to completion. Errors only when it cannot be spawned
    /// or exceeds the command timeout; a non-zero exit is a normal output.
    fn run(&self, program: &str, args: &[&str]) -> io::Result<CommandOutput>;

    fn glob(&self, pattern: &str) -> Vec<PathBuf>;

    fn fs_usage(&self, mount_point: &str) -> io::Result<FsUsage>;

    fn tcp_connect(&self, host: &str, port: u16, timeout: Duration) -> io::Result<()>;

    fn cpu_count(&self) -> usize;

    fn pause(&self, duration: Duration);

    fn local_now(&self) -> NaiveDateTime;
}

/// Probe backed by the live machine.
pub struct SystemProbe {
    runtime: Runtime,
    command_timeout: Duration,
}

impl SystemProbe {
    pub fn new(command_timeout: Duration) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to start command runtime")?;

        Ok(Self {
            runtime,
            command_timeout,
        })
    }
}

impl HostProbe for SystemProbe {
    fn read_file(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn run(&self, program: &str, args: &[&str]) -> io::Result<CommandOutput> {
        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args)
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let timeout = self.command_timeout;
        let output = self.runtime.block_on(async move {
            match tokio::time::timeout(timeout, cmd.output()).await {
                Ok(result) => result,
                Err(_) => Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("timed out after {}s", timeout.as_secs()),
                )),
            }
        });

        let output =
            output.inspect_err(|e| tracing::debug!(program, error = %e, "command failed"))?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn glob(&self, pattern: &str) -> Vec<PathBuf> {
        match glob::glob(pattern) {
            Ok(paths) => paths.flatten().collect(),
            Err(e) => {
                tracing::debug!(pattern, error = %e, "invalid glob pattern");
                Vec::new()
            }
        }
    }

    fn fs_usage(&self, mount_point: &str) -> io::Result<FsUsage> {
        let path = CString::new(mount_point)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
        if unsafe { libc::statvfs(path.as_ptr(), &mut stat) } != 0 {
            return Err(io::Error::last_os_error());
        }

        let frsize = stat.f_frsize as u64;
        let total = stat.f_blocks as u64 * frsize;
        let free = stat.f_bfree as u64 * frsize;
        let available = stat.f_bavail as u64 * frsize;

        Ok(FsUsage {
            total_bytes: total,
            used_bytes: total.saturating_sub(free),
            available_bytes: available,
        })
    }

    fn tcp_connect(&self, host: &str, port: u16, timeout: Duration) -> io::Result<()> {
        let addrs: Vec<SocketAddr> = (host, port).to_socket_addrs()?.collect();
        let mut last_err = io::Error::new(io::ErrorKind::NotFound, "no address resolved");
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(_) => return Ok(()),
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }

    fn cpu_count(&self) -> usize {
        num_cpus::get()
    }

    fn pause(&self, duration: Duration) {
        std::thread::sleep(duration);
    }

    fn local_now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}
