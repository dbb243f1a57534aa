#![allow(dead_code)]

use anyhow::Context as _;
use mcpo_bridge::{GatewayCommand, McpConfig, SupervisorConfig};
use serde_json::{Map, Value, json};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use mcpo_test_support::KillOnDrop;
#[allow(unused_imports)]
pub use mcpo_test_support::wait_port_closed;

pub fn pick_unused_port() -> anyhow::Result<u16> {
    mcpo_test_support::pick_unused_port()
}

pub async fn wait_http_ok(url: &str, timeout_dur: Duration) -> anyhow::Result<()> {
    mcpo_test_support::wait_http_ok(url, timeout_dur).await
}

pub fn stub_gateway() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_mcpo-stub-gateway"))
}

/// One long-running backend command per name.
pub fn backend_config(names: &[&str]) -> anyhow::Result<McpConfig> {
    let servers: Map<String, Value> = names
        .iter()
        .map(|n| ((*n).to_string(), json!({"command": "sleep", "args": ["60"]})))
        .collect();
    McpConfig::from_value(json!({ "mcpServers": servers })).context("build backend config")
}

/// Supervisor settings that launch the stub gateway on a free loopback port.
pub fn stub_supervisor_config(stub_args: &[&str]) -> anyhow::Result<SupervisorConfig> {
    let mut gateway = GatewayCommand::new(stub_gateway());
    for a in stub_args {
        gateway = gateway.arg(*a);
    }
    Ok(SupervisorConfig {
        gateway,
        host: "127.0.0.1".to_string(),
        port: pick_unused_port()?,
        timeout: Duration::from_secs(10),
    })
}

pub fn write_config(config: &McpConfig) -> anyhow::Result<tempfile::NamedTempFile> {
    let file = tempfile::NamedTempFile::new().context("create temp config")?;
    std::fs::write(file.path(), serde_json::to_vec(&config.to_value()?)?)
        .context("write temp config")?;
    Ok(file)
}

/// A stub gateway launched outside the supervisor. Dropping it kills its whole process group,
/// backends included.
pub struct StubProcess(KillOnDrop);

impl StubProcess {
    pub fn id(&self) -> u32 {
        self.0.0.id()
    }
}

impl Drop for StubProcess {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Ok(pgid) = i32::try_from(self.id()) {
            use nix::sys::signal::{Signal, killpg};
            let _ = killpg(nix::unistd::Pid::from_raw(pgid), Signal::SIGKILL);
        }
    }
}

/// Launch the stub gateway directly, bypassing the supervisor.
pub fn spawn_stub(config_path: &Path, port: u16) -> anyhow::Result<StubProcess> {
    let mut cmd = Command::new(stub_gateway());
    cmd.arg("--host")
        .arg("127.0.0.1")
        .arg("--port")
        .arg(port.to_string())
        .arg("--config")
        .arg(config_path);
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt as _;
        cmd.process_group(0);
    }
    let child = cmd.spawn().context("spawn stub gateway")?;
    Ok(StubProcess(KillOnDrop(child)))
}

/// Pids of the backend processes the stub gateway launched.
pub async fn stub_children(base_url: &str) -> anyhow::Result<Vec<i32>> {
    let body: Value = reqwest::get(format!("{base_url}/_stub/children"))
        .await?
        .error_for_status()?
        .json()
        .await?;
    body["pids"]
        .as_array()
        .context("children listing has no pids")?
        .iter()
        .map(|p| {
            p.as_i64()
                .and_then(|p| i32::try_from(p).ok())
                .context("pid is not an integer")
        })
        .collect()
}

/// A process counts as gone once it no longer exists or is a zombie awaiting its reaper.
#[cfg(unix)]
pub fn process_gone(pid: i32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    if kill(Pid::from_raw(pid), None).is_err() {
        return true;
    }
    std::fs::read_to_string(format!("/proc/{pid}/stat"))
        .ok()
        .and_then(|stat| {
            stat.rsplit_once(')')
                .and_then(|(_, rest)| rest.split_whitespace().next().map(str::to_string))
        })
        .is_some_and(|state| state == "Z" || state == "X")
}

#[cfg(unix)]
pub async fn wait_processes_gone(pids: &[i32], timeout_dur: Duration) -> anyhow::Result<()> {
    let start = std::time::Instant::now();
    loop {
        let alive: Vec<i32> = pids.iter().copied().filter(|p| !process_gone(*p)).collect();
        if alive.is_empty() {
            return Ok(());
        }
        if start.elapsed() > timeout_dur {
            anyhow::bail!("processes still alive: {alive:?}");
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
