//! Process management for the Baileys sidecar.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use {
    tokio::{
        io::{AsyncBufReadExt, BufReader},
        process::{Child, Command},
    },
    tracing::{debug, error, info, warn},
};

use crate::{
    error::{Error, Result},
    sidecar::DEFAULT_SIDECAR_PORT,
};

/// Environment variable pointing at the sidecar checkout.
pub const SIDECAR_DIR_VAR: &str = "VOLTRON_WHATSAPP_SIDECAR_DIR";

const SIDECAR_DIR_CANDIDATES: &[&str] = &[
    "sidecar/whatsapp-baileys",
    "../sidecar/whatsapp-baileys",
    "../../sidecar/whatsapp-baileys",
];

/// Handle to a running sidecar process.
pub struct SidecarProcess {
    child: Child,
    port: u16,
}

impl SidecarProcess {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// SIGTERM the sidecar and wait up to five seconds before killing it.
    pub async fn stop(&mut self) -> Result<()> {
        info!("stopping whatsapp sidecar");

        #[cfg(unix)]
        {
            use nix::{
                sys::signal::{Signal, kill},
                unistd::Pid,
            };

            if let Some(pid) = self.child.id()
                && let Ok(pid) = i32::try_from(pid)
            {
                let _ = kill(Pid::from_raw(pid), Signal::SIGTERM);
            }
        }

        #[cfg(not(unix))]
        {
            let _ = self.child.kill().await;
        }

        match tokio::time::timeout(Duration::from_secs(5), self.child.wait()).await {
            Ok(Ok(status)) => info!(?status, "whatsapp sidecar exited"),
            Ok(Err(e)) => warn!(error = %e, "error waiting for sidecar"),
            Err(_) => {
                warn!("sidecar did not exit in time, killing");
                self.child.kill().await?;
            },
        }
        Ok(())
    }
}

/// How to launch the sidecar.
#[derive(Debug, Clone)]
pub struct SidecarConfig {
    /// Directory containing the sidecar's `package.json`.
    pub sidecar_dir: PathBuf,
    pub port: u16,
    /// Root of the per-session auth stores.
    pub sessions_dir: Option<PathBuf>,
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            sidecar_dir: PathBuf::new(),
            port: DEFAULT_SIDECAR_PORT,
            sessions_dir: None,
        }
    }
}

fn has_package_json(dir: &Path) -> bool {
    dir.join("package.json").exists()
}

/// Locate the sidecar checkout.
///
/// Order: the explicit path, `VOLTRON_WHATSAPP_SIDECAR_DIR`, paths next to the
/// executable, then paths relative to the working directory.
pub fn find_sidecar_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if has_package_json(path) {
            return Ok(path.to_path_buf());
        }
        return Err(Error::message(format!(
            "no package.json in sidecar directory {}",
            path.display()
        )));
    }

    if let Ok(dir) = std::env::var(SIDECAR_DIR_VAR) {
        let path = PathBuf::from(&dir);
        if has_package_json(&path) {
            return Ok(path);
        }
        warn!(path = %dir, "{SIDECAR_DIR_VAR} set but package.json not found");
    }

    if let Ok(exe) = std::env::current_exe()
        && let Some(exe_dir) = exe.parent()
    {
        for rel in ["../sidecar/whatsapp-baileys", "../../sidecar/whatsapp-baileys"] {
            let candidate = exe_dir.join(rel);
            if has_package_json(&candidate) {
                return Ok(candidate);
            }
        }
    }

    SIDECAR_DIR_CANDIDATES
        .iter()
        .map(PathBuf::from)
        .find(|path| has_package_json(path))
        .map(|path| path.canonicalize().unwrap_or(path))
        .ok_or_else(|| {
            Error::message(format!(
                "whatsapp sidecar not found; set {SIDECAR_DIR_VAR} or check out \
                 sidecar/whatsapp-baileys"
            ))
        })
}

/// `dist/index.js` exists.
pub fn is_sidecar_built(sidecar_dir: &Path) -> bool {
    sidecar_dir.join("dist/index.js").exists()
}

/// Build the sidecar if needed, spawn it and forward its logs to tracing.
pub async fn start_sidecar(config: SidecarConfig) -> Result<SidecarProcess> {
    let dir = &config.sidecar_dir;
    if !has_package_json(dir) {
        return Err(Error::message(format!(
            "whatsapp sidecar not found at {}",
            dir.display()
        )));
    }

    if !is_sidecar_built(dir) {
        info!(path = %dir.display(), "building whatsapp sidecar");
        if !dir.join("node_modules").exists() {
            run_npm(dir, &["install"]).await?;
        }
        run_npm(dir, &["run", "build"]).await?;
    }

    info!(path = %dir.display(), port = config.port, "starting whatsapp sidecar");

    let mut cmd = Command::new("node");
    cmd.arg("dist/index.js")
        .current_dir(dir)
        .env("VOLTRON_WHATSAPP_PORT", config.port.to_string())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(sessions_dir) = &config.sessions_dir {
        cmd.env("VOLTRON_WHATSAPP_AUTH_DIR", sessions_dir);
    }

    let mut child = cmd.spawn()?;

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                forward_log_line(&line);
            }
        });
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                warn!(target: "whatsapp_sidecar", "{line}");
            }
        });
    }

    // Give the process a moment to fail fast on bad installs.
    tokio::time::sleep(Duration::from_millis(500)).await;
    if let Some(status) = child.try_wait()? {
        return Err(Error::message(format!(
            "sidecar exited immediately with status {status}"
        )));
    }

    info!(port = config.port, "whatsapp sidecar started");
    Ok(SidecarProcess {
        child,
        port: config.port,
    })
}

/// Re-emit a sidecar log line at its pino level.
fn forward_log_line(line: &str) {
    let parsed = line
        .starts_with('{')
        .then(|| serde_json::from_str::<serde_json::Value>(line).ok())
        .flatten();
    let Some(log) = parsed else {
        info!(target: "whatsapp_sidecar", "{line}");
        return;
    };

    let level = log.get("level").and_then(|v| v.as_u64()).unwrap_or(30);
    let msg = log.get("msg").and_then(|v| v.as_str()).unwrap_or(line);
    match level {
        10 | 20 => debug!(target: "whatsapp_sidecar", "{msg}"),
        30 => info!(target: "whatsapp_sidecar", "{msg}"),
        40 => warn!(target: "whatsapp_sidecar", "{msg}"),
        _ => error!(target: "whatsapp_sidecar", "{msg}"),
    }
}

async fn run_npm(dir: &Path, args: &[&str]) -> Result<()> {
    info!(path = %dir.display(), ?args, "running npm");
    let output = Command::new("npm").args(args).current_dir(dir).output().await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::message(format!(
            "npm {} failed: {stderr}",
            args.join(" ")
        )));
    }
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_dir_needs_package_json() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_sidecar_dir(Some(dir.path())).is_err());

        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        assert_eq!(find_sidecar_dir(Some(dir.path())).unwrap(), dir.path());
        assert!(!is_sidecar_built(dir.path()));
    }

    #[tokio::test]
    async fn start_fails_without_checkout() {
        let dir = tempfile::tempdir().unwrap();
        let result = start_sidecar(SidecarConfig {
            sidecar_dir: dir.path().to_path_buf(),
            ..SidecarConfig::default()
        })
        .await;
        assert!(result.is_err());
    }
}
