use anyhow::{Context, Result};
use std::{fs, io::Write, path::Path};

use crate::config::Config;

pub fn show_config(path: &Path, out: &mut impl Write) -> Result<()> {
    let config = Config::load(path)?;

    writeln!(out, "Effective configuration ({})", path.display())?;
    writeln!(out, "=====================")?;
    writeln!(out)?;
    writeln!(out, "{}", config.to_toml()?)?;

    Ok(())
}

/// Reports problems instead of failing so the caller can choose the exit code.
pub fn validate_config(path: &Path, out: &mut impl Write) -> Result<bool> {
    writeln!(out, "Validating {}...", path.display())?;

    let result = Config::load(path).and_then(|config| {
        config.validate()?;
        Ok(config)
    });

    match result {
        Ok(config) => {
            let t = &config.thresholds;
            writeln!(out, "✓ Configuration is valid")?;
            writeln!(out)?;
            writeln!(out, "Thresholds (warn / crit):")?;
            writeln!(out, "  CPU:    {}% / {}%", t.cpu.warn, t.cpu.crit)?;
            writeln!(out, "  Memory: {}% / {}%", t.memory.warn, t.memory.crit)?;
            writeln!(out, "  Swap:   {}% / {}%", t.swap.warn, t.swap.crit)?;
            writeln!(out, "  Disk:   {}% / {}%", t.disk.warn, t.disk.crit)?;
            writeln!(out, "  Load:   {} / {} per core", t.load.warn, t.load.crit)?;
            writeln!(out)?;
            writeln!(out, "Services: {}", config.services.names.join(", "))?;
            writeln!(
                out,
                "Reachability probe: {}:{} ({}s)",
                config.network.probe_host, config.network.probe_port, config.network.timeout_secs
            )?;
            if config.logging.enabled {
                writeln!(out, "Log file: {}", config.logging.path.display())?;
            } else {
                writeln!(out, "Log file: disabled")?;
            }
            Ok(true)
        }
        Err(e) => {
            writeln!(out, "✗ Configuration is invalid:")?;
            writeln!(out, "  {}", e)?;
            Ok(false)
        }
    }
}

pub fn init_config(path: &Path, force: bool, out: &mut impl Write) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            path.display()
        );
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let toml_content = Config::default().to_toml()?;
    fs::write(path, toml_content).context("Failed to write config file")?;

    writeln!(out, "✓ Default configuration written to {}", path.display())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_then_validate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("etc/hostwatch/config.toml");

        let mut out = Vec::new();
        init_config(&path, false, &mut out).unwrap();
        assert_eq!(Config::load(&path).unwrap(), Config::default());

        assert!(init_config(&path, false, &mut out).is_err());
        init_config(&path, true, &mut out).unwrap();

        let mut out = Vec::new();
        assert!(validate_config(&path, &mut out).unwrap());
        assert!(String::from_utf8(out).unwrap().contains("Services: ssh, cron, docker, nginx"));
    }

    #[test]
    fn test_validate_reports_inverted_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[thresholds.cpu]\nwarn = 95\ncrit = 90\n").unwrap();

        let mut out = Vec::new();
        assert!(!validate_config(&path, &mut out).unwrap());
        assert!(String::from_utf8(out).unwrap().contains("thresholds.cpu"));
    }

    #[test]
    fn test_show_prints_toml() {
        let dir = tempfile::tempdir().unwrap();
        let mut out = Vec::new();
        show_config(&dir.path().join("none.toml"), &mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().contains("[thresholds.disk]"));
    }
}
