//! Gateway process supervision.
//!
//! A [`GatewaySupervisor`] owns at most one gateway process at a time. `start` materializes the
//! backend configuration into a temp file and launches the gateway in its own process group; a
//! monitor task then owns the child, sets the lifecycle signals and tears the whole group down
//! when the gateway exits or an abort is requested.
//!
//! Launch failures are the only errors. Crashes are observed through [`LifecycleSignals`] and
//! [`GatewaySupervisor::state`]; `stop` and `cleanup` never fail and may be called any number
//! of times, in any order relative to `start`.

use crate::config::{McpConfig, SupervisorConfig};
use crate::error::{BridgeError, Result};
use crate::readiness::{self, POLL_SLICE};
use crate::signals::LifecycleSignals;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

/// Time the gateway gets to exit after SIGTERM before the group is killed.
pub const TERM_GRACE: Duration = Duration::from_secs(2);

/// Upper bound on joining the monitor task in `stop`.
const MONITOR_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

#[cfg(windows)]
const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

/// Outcome of `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// `start(false)`: no readiness check was made.
    Skipped,
    Ready,
    /// The deadline passed without a 2xx from the health endpoint.
    TimedOut,
    /// The gateway exited before readiness was confirmed.
    Exited,
}

impl Readiness {
    #[must_use]
    pub fn is_ready(self) -> bool {
        self == Readiness::Ready
    }
}

/// Lifecycle state derived from the signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayState {
    NotStarted,
    Starting,
    Ready,
    Stopping,
    Stopped,
    /// Exited on its own before readiness was ever confirmed.
    Crashed,
}

#[derive(Debug)]
struct RunningGateway {
    pid: u32,
    config_path: PathBuf,
    monitor: Option<JoinHandle<()>>,
}

#[derive(Debug)]
pub struct GatewaySupervisor {
    config: SupervisorConfig,
    mcp_config: McpConfig,
    client: Client,
    signals: LifecycleSignals,
    running: Option<RunningGateway>,
    ready_confirmed: bool,
}

impl GatewaySupervisor {
    #[must_use]
    pub fn new(config: SupervisorConfig, mcp_config: McpConfig) -> Self {
        Self {
            config,
            mcp_config,
            client: Client::new(),
            signals: LifecycleSignals::new(),
            running: None,
            ready_confirmed: false,
        }
    }

    #[must_use]
    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    #[must_use]
    pub fn mcp_config(&self) -> &McpConfig {
        &self.mcp_config
    }

    /// Signals of the current (or last) gateway run.
    #[must_use]
    pub fn signals(&self) -> &LifecycleSignals {
        &self.signals
    }

    /// Pid of the current (or last) gateway; also its process group id.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.running.as_ref().map(|r| r.pid)
    }

    /// Path of the materialized config while it exists.
    #[must_use]
    pub fn config_path(&self) -> Option<&Path> {
        self.running.as_ref().map(|r| r.config_path.as_path())
    }

    #[must_use]
    pub fn base_url(&self) -> String {
        self.config.base_url()
    }

    #[must_use]
    pub fn health_url(&self) -> String {
        format!("{}/docs", self.base_url())
    }

    #[must_use]
    pub fn state(&self) -> GatewayState {
        if self.running.is_none() {
            return GatewayState::NotStarted;
        }
        let s = self.signals.snapshot();
        match (s.abort_requested, s.finished) {
            (true, true) => GatewayState::Stopped,
            (true, false) => GatewayState::Stopping,
            (false, true) if self.ready_confirmed => GatewayState::Stopped,
            (false, true) => GatewayState::Crashed,
            (false, false) if self.ready_confirmed => GatewayState::Ready,
            (false, false) => GatewayState::Starting,
        }
    }

    fn live_pid(&self) -> Option<u32> {
        match &self.running {
            Some(r) if !self.signals.finished.is_set() => Some(r.pid),
            _ => None,
        }
    }

    /// Launch the gateway, optionally waiting for readiness.
    ///
    /// # Errors
    ///
    /// [`BridgeError::AlreadyRunning`] if a previous gateway is still alive,
    /// [`BridgeError::Launch`] if the executable cannot be spawned, and IO/JSON errors while
    /// writing the temp config. A readiness timeout is not an error.
    pub async fn start(&mut self, wait_for_ready: bool) -> Result<Readiness> {
        if let Some(pid) = self.live_pid() {
            return Err(BridgeError::AlreadyRunning { pid });
        }
        if let Some(previous) = self.running.take() {
            remove_config_file(&previous.config_path);
        }
        self.signals = LifecycleSignals::new();
        self.ready_confirmed = false;

        let config_path = write_config_file(&self.mcp_config)?;
        let gateway = &self.config.gateway;
        let program = gateway.program.display().to_string();

        let mut cmd = Command::new(&gateway.program);
        cmd.args(&gateway.args)
            .arg("--host")
            .arg(&self.config.host)
            .arg("--port")
            .arg(self.config.port.to_string())
            .arg("--config")
            .arg(&config_path)
            .envs(&gateway.env)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);
        #[cfg(windows)]
        cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(source) => {
                remove_config_file(&config_path);
                return Err(BridgeError::Launch { program, source });
            }
        };
        let Some(pid) = child.id() else {
            remove_config_file(&config_path);
            return Err(BridgeError::Launch {
                program,
                source: std::io::Error::other("gateway exited before its pid was recorded"),
            });
        };

        tracing::info!(
            pid,
            program = %program,
            host = %self.config.host,
            port = self.config.port,
            config = %config_path.display(),
            "Gateway launched"
        );

        let monitor = tokio::spawn(monitor(
            child,
            pid,
            self.signals.clone(),
            config_path.clone(),
        ));
        self.running = Some(RunningGateway {
            pid,
            config_path,
            monitor: Some(monitor),
        });

        if !wait_for_ready {
            return Ok(Readiness::Skipped);
        }
        Ok(self.wait_until_ready().await)
    }

    /// Wait for the running gateway to become reachable, bounded by the configured timeout.
    pub async fn wait_until_ready(&mut self) -> Readiness {
        if self.running.is_none() {
            return Readiness::Exited;
        }
        let health_url = self.health_url();
        let ok = readiness::wait_until_ready(
            &self.client,
            &self.signals,
            &health_url,
            self.config.timeout,
        )
        .await;

        if ok {
            self.ready_confirmed = true;
            Readiness::Ready
        } else if self.signals.finished.is_set() {
            Readiness::Exited
        } else {
            Readiness::TimedOut
        }
    }

    /// Request termination and wait (bounded) for the process group to be gone.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.as_mut() else {
            tracing::debug!("No gateway to stop");
            return;
        };

        self.signals.abort_requested.set();

        if let Some(handle) = running.monitor.take() {
            match tokio::time::timeout(MONITOR_JOIN_TIMEOUT, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(pid = running.pid, "Gateway monitor failed: {e}"),
                Err(_) => tracing::warn!(pid = running.pid, "Timed out joining gateway monitor"),
            }
        }

        if !self.signals.finished.wait(self.config.timeout / 3).await {
            tracing::warn!(pid = running.pid, "Gateway did not report finished in time");
        }
    }

    /// Force-kill the recorded process group and remove the temp config.
    ///
    /// Safe to call whether or not `stop` ran or succeeded; a process that is already gone is
    /// not an error.
    pub fn cleanup(&mut self) {
        let Some(running) = self.running.as_ref() else {
            return;
        };
        self.signals.abort_requested.set();
        if !self.signals.finished.is_set() {
            force_kill_group(running.pid);
        }
        remove_config_file(&running.config_path);
    }
}

impl Drop for GatewaySupervisor {
    fn drop(&mut self) {
        let Some(running) = self.running.as_ref() else {
            return;
        };
        let s = self.signals.snapshot();
        if !s.finished && !s.abort_requested {
            tracing::debug!(pid = running.pid, "Supervisor dropped without stop; killing gateway");
            force_kill_group(running.pid);
            remove_config_file(&running.config_path);
        }
    }
}

async fn monitor(mut child: Child, pid: u32, signals: LifecycleSignals, config_path: PathBuf) {
    signals.started.set();

    loop {
        tokio::select! {
            status = child.wait() => {
                match status {
                    Ok(status) => tracing::info!(pid, %status, "Gateway exited"),
                    Err(e) => tracing::warn!(pid, "Failed to wait on gateway: {e}"),
                }
                break;
            }
            aborted = signals.abort_requested.wait(POLL_SLICE) => {
                if aborted {
                    tracing::info!(pid, "Abort requested, terminating gateway");
                    break;
                }
            }
        }
    }

    terminate_group(&mut child, pid).await;
    remove_config_file(&config_path);
    signals.finished.set();
}

/// SIGTERM the group, give it [`TERM_GRACE`], SIGKILL whatever is left, reap the leader.
#[cfg(unix)]
async fn terminate_group(child: &mut Child, pgid: u32) {
    use nix::sys::signal::Signal;

    signal_group(pgid, Signal::SIGTERM);
    if tokio::time::timeout(TERM_GRACE, child.wait()).await.is_err() {
        tracing::warn!(pid = pgid, "Gateway ignored SIGTERM");
    }
    // Descendants may outlive the leader.
    signal_group(pgid, Signal::SIGKILL);
    if let Err(e) = child.wait().await {
        tracing::debug!(pid = pgid, "Failed to reap gateway: {e}");
    }
}

#[cfg(not(unix))]
async fn terminate_group(child: &mut Child, pid: u32) {
    let pid_arg = pid.to_string();
    match Command::new("taskkill")
        .args(["/PID", pid_arg.as_str(), "/T", "/F"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
    {
        Ok(status) => tracing::debug!(pid, %status, "taskkill finished"),
        Err(e) => tracing::warn!(pid, "Failed to run taskkill: {e}"),
    }
    if let Err(e) = child.kill().await {
        tracing::debug!(pid, "Failed to kill gateway: {e}");
    }
}

/// Returns whether the signal was delivered.
#[cfg(unix)]
fn signal_group(pgid: u32, signal: nix::sys::signal::Signal) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pgid) else {
        return false;
    };
    match killpg(Pid::from_raw(raw), signal) {
        Ok(()) => {
            tracing::debug!(pid = pgid, ?signal, "Signaled gateway process group");
            true
        }
        Err(Errno::ESRCH) => false,
        Err(e) => {
            tracing::warn!(pid = pgid, ?signal, error = ?e, "killpg failed");
            false
        }
    }
}

#[cfg(unix)]
fn force_kill_group(pgid: u32) {
    signal_group(pgid, nix::sys::signal::Signal::SIGKILL);
}

#[cfg(not(unix))]
fn force_kill_group(pid: u32) {
    let result = std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    if let Err(e) = result {
        tracing::warn!(pid, "Failed to run taskkill: {e}");
    }
}

fn write_config_file(config: &McpConfig) -> Result<PathBuf> {
    let mut file = tempfile::Builder::new()
        .prefix("mcpo-config-")
        .suffix(".json")
        .tempfile()?;
    serde_json::to_writer_pretty(file.as_file_mut(), &config.to_value()?)?;
    let path = file
        .into_temp_path()
        .keep()
        .map_err(|e| BridgeError::Io(e.error))?;
    tracing::debug!(path = %path.display(), "Wrote gateway config");
    Ok(path)
}

fn remove_config_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed gateway config"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), "Failed to remove gateway config: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayCommand;
    use serde_json::json;

    fn mcp_config() -> McpConfig {
        McpConfig::from_value(json!({"mcpServers": {"a": {"command": "sleep", "args": ["30"]}}}))
            .unwrap()
    }

    fn supervisor(program: &str, args: &[&str]) -> GatewaySupervisor {
        let mut gateway = GatewayCommand::new(program);
        for a in args {
            gateway = gateway.arg(*a);
        }
        let config = SupervisorConfig {
            gateway,
            host: "127.0.0.1".to_string(),
            port: mcpo_test_support::pick_unused_port().unwrap(),
            timeout: Duration::from_secs(3),
        };
        GatewaySupervisor::new(config, mcp_config())
    }

    #[tokio::test]
    async fn test_stop_and_cleanup_before_start_are_noops() {
        let mut sup = supervisor("mcpo", &[]);
        sup.stop().await;
        sup.cleanup();
        sup.stop().await;
        assert_eq!(sup.state(), GatewayState::NotStarted);
        assert!(sup.pid().is_none());
    }

    #[tokio::test]
    async fn test_launch_failure_is_reported_and_leaves_no_file() {
        let mut sup = supervisor("/nonexistent/definitely-not-a-gateway", &[]);
        let err = sup.start(false).await.unwrap_err();
        assert!(matches!(err, BridgeError::Launch { .. }));
        assert_eq!(sup.state(), GatewayState::NotStarted);
        assert!(sup.config_path().is_none());
    }

    #[test]
    fn test_health_url() {
        let mut sup = supervisor("mcpo", &[]);
        sup.config.host = "0.0.0.0".to_string();
        sup.config.port = 5090;
        assert_eq!(sup.health_url(), "http://127.0.0.1:5090/docs");
    }

    #[test]
    fn test_written_config_round_trips() {
        let path = write_config_file(&mcp_config()).unwrap();
        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["mcpServers"]["a"]["command"], "sleep");
        assert!(
            path.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("mcpo-config-")
        );
        remove_config_file(&path);
        assert!(!path.exists());
        // Second removal is tolerated.
        remove_config_file(&path);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_abort_terminates_process_and_removes_config() {
        // `sh -c 'sleep 30' --host ...`: the extra flags become positional parameters.
        let mut sup = supervisor("sh", &["-c", "sleep 30"]);
        let readiness = sup.start(false).await.unwrap();
        assert_eq!(readiness, Readiness::Skipped);
        assert!(sup.signals().started.wait(Duration::from_secs(2)).await);
        assert_eq!(sup.state(), GatewayState::Starting);

        let err = sup.start(false).await.unwrap_err();
        assert!(matches!(err, BridgeError::AlreadyRunning { .. }));

        let path = sup.config_path().unwrap().to_path_buf();
        assert!(path.exists());

        sup.stop().await;
        assert!(sup.signals().finished.is_set());
        assert_eq!(sup.state(), GatewayState::Stopped);
        assert!(!path.exists());

        sup.stop().await;
        sup.cleanup();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_before_ready_is_a_crash() {
        let mut sup = supervisor("sh", &["-c", "exit 3"]);
        let readiness = sup.start(true).await.unwrap();
        assert_eq!(readiness, Readiness::Exited);
        assert_eq!(sup.state(), GatewayState::Crashed);
        let s = sup.signals().snapshot();
        assert!(s.finished);
        assert!(!s.abort_requested);

        // A crashed gateway can be started again.
        let first_pid = sup.pid();
        sup.start(false).await.unwrap();
        assert_ne!(sup.pid(), first_pid);
        sup.stop().await;
        assert!(sup.signals().finished.is_set());
    }
}
