//! OS-level privilege detection and elevation.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Queries and raises the privileges of the running process.
#[async_trait]
pub trait PrivilegeBroker: Send + Sync {
    fn is_elevated(&self) -> bool;

    /// Attempt to obtain elevated privileges.  Returns `true` on success.
    async fn request_elevation(&self) -> bool;
}

/// Broker backed by the host OS (sudo / osascript / Windows admin check).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPrivileges;

const PROBE_TIMEOUT: Duration = Duration::from_secs(1);
const PROMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Run a command with no stdin/stdout, returning `true` on exit status 0.
/// Spawn failures and timeouts count as failure.
async fn run_quiet(program: &str, args: &[&str], timeout: Duration) -> bool {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    match tokio::time::timeout(timeout, cmd.status()).await {
        Ok(Ok(status)) => status.success(),
        Ok(Err(e)) => {
            debug!(program, error = %e, "failed to spawn");
            false
        }
        Err(_) => {
            warn!(program, timeout_secs = timeout.as_secs(), "timed out");
            false
        }
    }
}

#[async_trait]
impl PrivilegeBroker for SystemPrivileges {
    fn is_elevated(&self) -> bool {
        is_process_elevated()
    }

    async fn request_elevation(&self) -> bool {
        if self.is_elevated() {
            return true;
        }
        let granted = elevate().await;
        info!(granted, os = std::env::consts::OS, "privilege elevation requested");
        granted
    }
}

#[cfg(unix)]
fn is_process_elevated() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

#[cfg(windows)]
fn is_process_elevated() -> bool {
    // `net session` only succeeds from an elevated shell.
    std::process::Command::new("net")
        .arg("session")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(not(any(unix, windows)))]
fn is_process_elevated() -> bool {
    false
}

#[cfg(target_os = "macos")]
async fn elevate() -> bool {
    run_quiet(
        "osascript",
        &["-e", r#"do shell script "sudo -v" with administrator privileges"#],
        PROMPT_TIMEOUT,
    )
    .await
}

#[cfg(all(unix, not(target_os = "macos")))]
async fn elevate() -> bool {
    if run_quiet("sudo", &["-n", "true"], PROBE_TIMEOUT).await {
        return true;
    }
    run_quiet("sudo", &["-v"], PROMPT_TIMEOUT).await
}

#[cfg(not(unix))]
async fn elevate() -> bool {
    // A running process cannot be elevated in place on Windows; the user has
    // to restart the agent from an elevated shell.
    warn!("privilege elevation requires restarting as administrator");
    false
}

/// Broker with a fixed answer.  Used in tests and wherever elevation must
/// never touch the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedPrivileges {
    pub elevated: bool,
    pub grant: bool,
}

impl FixedPrivileges {
    pub fn granting() -> Self {
        Self {
            elevated: false,
            grant: true,
        }
    }

    pub fn refusing() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PrivilegeBroker for FixedPrivileges {
    fn is_elevated(&self) -> bool {
        self.elevated
    }

    async fn request_elevation(&self) -> bool {
        self.elevated || self.grant
    }
}
