use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use sysinfo::{Pid, ProcessesToUpdate, System};

use crate::config::SPAWN_PATH_EXTENSION;

/// What to spawn: argv, working directory, and environment overrides
/// layered on top of the inherited environment.
#[derive(Clone, Debug)]
pub struct SpawnSpec {
    pub argv: Vec<String>,
    pub cwd: PathBuf,
    pub env: BTreeMap<String, String>,
}

impl SpawnSpec {
    pub fn new(argv: Vec<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            argv,
            cwd: cwd.into(),
            env: BTreeMap::new(),
        }
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in vars {
            self.env.insert(key.into(), value.into());
        }
        self
    }
}

/// Spawns a child in its own process group with stdio discarded, so it
/// survives this process exiting. Returns the child's pid; the handle
/// is dropped immediately and never waited on.
pub fn spawn_detached(spec: &SpawnSpec) -> std::io::Result<u32> {
    let mut command = Command::new(&spec.argv[0]);
    if spec.argv.len() > 1 {
        command.args(&spec.argv[1..]);
    }
    command.current_dir(&spec.cwd);
    command.envs(spec.env.iter());
    command.env("PATH", extended_spawn_path());
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        unsafe {
            command.pre_exec(|| {
                if libc::setpgid(0, 0) != 0 {
                    let err = std::io::Error::last_os_error();
                    if err.raw_os_error() == Some(libc::EPERM) {
                        return Ok(());
                    }
                    return Err(err);
                }
                Ok(())
            });
        }
    }

    let child = command.spawn()?;
    Ok(child.id())
}

fn extended_spawn_path() -> OsString {
    let mut path = std::env::var_os("PATH").unwrap_or_default();
    path.push(":");
    path.push(SPAWN_PATH_EXTENSION);
    path
}

pub fn process_exists(pid: u32) -> bool {
    let mut system = System::new();
    let pid = Pid::from_u32(pid);
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system.process(pid).is_some()
}

/// Unconditional SIGKILL. An already-dead target is success, not an
/// error, so kills are freely repeatable.
#[cfg(unix)]
pub fn kill_pid(pid: u32) {
    let result = unsafe { libc::kill(pid as i32, libc::SIGKILL) };
    if result != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            tracing::warn!("kill -9 {pid} failed: {err}");
        }
    }
}

#[cfg(windows)]
pub fn kill_pid(pid: u32) {
    let status = Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .status();
    if let Err(err) = status {
        tracing::warn!("taskkill for pid {pid} failed: {err}");
    }
}

/// Tail a log file to the caller's terminal until interrupted.
pub fn tail_log(path: &Path) -> anyhow::Result<()> {
    if !path.exists() {
        return Err(anyhow::anyhow!(
            "log file does not exist: {}",
            path.display()
        ));
    }

    #[cfg(unix)]
    {
        let status = Command::new("tail")
            .args(["-f", &path.display().to_string()])
            .status()?;
        if !status.success() {
            return Err(anyhow::anyhow!("tail exited with {}", status));
        }
        Ok(())
    }

    #[cfg(windows)]
    {
        let contents = std::fs::read_to_string(path)?;
        println!("{contents}");
        Ok(())
    }
}
