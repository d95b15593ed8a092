//! Starting and stopping the server process.

use crate::core::{Result, TestbedError};
use crate::instance::workspace::parse_pid;
use log::{debug, warn};
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::waitpid;
use nix::unistd::Pid;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const WRAPPER_GRACE: Duration = Duration::from_secs(2);

/// How to start `bin/cassandra` inside one unpacked distribution.
#[derive(Debug, Clone)]
pub struct Launcher {
    install_dir: PathBuf,
    pid_file: PathBuf,
    log_file: PathBuf,
    java_binary: Option<String>,
    timeout: Duration,
}

/// A started server.
///
/// `pid` is the server as recorded in the pid file. `wrapper` is the launch
/// script, kept only if it had not exited yet when the pid file appeared.
#[derive(Debug)]
pub struct LaunchedProcess {
    pub pid: i32,
    pub wrapper: Option<Child>,
}

impl Launcher {
    pub fn new(install_dir: impl Into<PathBuf>, pid_file: impl Into<PathBuf>, log_file: impl Into<PathBuf>) -> Self {
        Self {
            install_dir: install_dir.into(),
            pid_file: pid_file.into(),
            log_file: log_file.into(),
            java_binary: None,
            timeout: Duration::from_secs(30),
        }
    }

    /// Require `binary` to be resolvable on PATH before launching.
    pub fn require_java(mut self, binary: &str) -> Self {
        self.java_binary = Some(binary.to_string());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn script(&self) -> PathBuf {
        self.install_dir.join("bin").join("cassandra")
    }

    /// Arguments passed to the launch script.
    ///
    /// No `-f`: `bin/cassandra` only writes the pid file when it puts the JVM
    /// in the background itself.
    pub fn args(&self) -> Vec<std::ffi::OsString> {
        vec!["-p".into(), self.pid_file.clone().into_os_string()]
    }

    /// Run the launch script and wait until the server pid has been recorded.
    pub fn launch(&self) -> Result<LaunchedProcess> {
        if let Some(java) = &self.java_binary {
            let resolved = which::which(java)
                .map_err(|e| TestbedError::LaunchFailed(format!("'{java}' not found on PATH: {e}")))?;
            debug!("Using Java launcher {}", resolved.display());
        }

        let script = self.script();
        if !script.is_file() {
            return Err(TestbedError::LaunchFailed(format!("'{}' does not exist", script.display())));
        }

        let log = File::create(&self.log_file)
            .map_err(|e| TestbedError::LaunchFailed(format!("cannot create '{}': {e}", self.log_file.display())))?;
        let log_err = log
            .try_clone()
            .map_err(|e| TestbedError::LaunchFailed(format!("cannot duplicate log handle: {e}")))?;

        let mut command = Command::new(&script);
        command
            .args(self.args())
            .current_dir(&self.install_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));

        let child = spawn_retrying_busy(&mut command)
            .map_err(|e| TestbedError::LaunchFailed(format!("failed to spawn '{}': {e}", script.display())))?;

        debug!("Spawned {} as pid {}", script.display(), child.id());
        self.await_pid_file(child)
    }

    fn await_pid_file(&self, mut child: Child) -> Result<LaunchedProcess> {
        let deadline = Instant::now() + self.timeout;

        loop {
            // Poll the exit first: a script that wrote the pid and exited
            // between the two checks must still be seen as a success.
            let exited = child
                .try_wait()
                .map_err(|e| TestbedError::LaunchFailed(format!("failed to poll launch script: {e}")))?;

            if let Some(pid) = read_pid_file(&self.pid_file) {
                let wrapper = match exited {
                    Some(status) => {
                        debug!("Launch script exited with {}", status);
                        None
                    }
                    None => settle(child),
                };
                return Ok(LaunchedProcess { pid, wrapper });
            }

            if let Some(status) = exited {
                return Err(TestbedError::LaunchFailed(format!(
                    "launch script exited with {status} without writing '{}', see '{}'",
                    self.pid_file.display(),
                    self.log_file.display()
                )));
            }

            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(TestbedError::LaunchFailed(format!(
                    "'{}' did not appear within {:?}",
                    self.pid_file.display(),
                    self.timeout
                )));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

// Give a launch script that already wrote the pid a moment to exit so it
// can be reaped here. One still running afterwards is handed back.
fn settle(mut child: Child) -> Option<Child> {
    let deadline = Instant::now() + WRAPPER_GRACE;
    while Instant::now() < deadline {
        match child.try_wait() {
            Ok(Some(_)) => return None,
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                debug!("Could not poll launch script {}: {}", child.id(), e);
                break;
            }
        }
    }
    warn!("Launch script {} still running after the pid file appeared", child.id());
    Some(child)
}

// A script that was just unpacked can still be open for writing in a forked
// sibling, which makes exec fail with ETXTBSY for a short moment.
fn spawn_retrying_busy(command: &mut Command) -> std::io::Result<Child> {
    let mut attempts = 0;
    loop {
        match command.spawn() {
            Err(e) if e.raw_os_error() == Some(Errno::ETXTBSY as i32) && attempts < 10 => {
                attempts += 1;
                thread::sleep(Duration::from_millis(50));
            }
            result => return result,
        }
    }
}

fn read_pid_file(path: &Path) -> Option<i32> {
    fs::read_to_string(path).ok().as_deref().and_then(parse_pid)
}

/// Send SIGKILL to `pid`. Returns `false` if no such process exists.
///
/// The pid is not checked against anything: if the server died and the pid
/// was reused, the new owner gets killed.
pub fn kill_process(pid: i32) -> std::result::Result<bool, Errno> {
    match kill(Pid::from_raw(pid), Signal::SIGKILL) {
        Ok(()) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Collect the exit status of a killed `pid` if it is a child of this
/// process. Servers are normally adopted by init, which reaps them instead.
pub fn reap(pid: i32) {
    match waitpid(Pid::from_raw(pid), None) {
        Ok(status) => debug!("Reaped pid {}: {:?}", pid, status),
        Err(Errno::ECHILD) => {}
        Err(e) => debug!("Could not reap pid {}: {}", pid, e),
    }
}

/// Make this process the parent of servers whose launch script exits.
///
/// Needed where pid 1 does not reap orphans (minimal containers): killed
/// servers would otherwise linger as zombies and still look alive.
#[cfg(target_os = "linux")]
pub fn adopt_orphans() -> Result<()> {
    nix::sys::prctl::set_child_subreaper(true)
        .map_err(|e| TestbedError::LaunchFailed(format!("cannot become child subreaper: {e}")))
}

#[cfg(not(target_os = "linux"))]
pub fn adopt_orphans() -> Result<()> {
    Ok(())
}

/// Whether a process with `pid` exists.
pub fn process_alive(pid: i32) -> bool {
    match kill(Pid::from_raw(pid), None::<Signal>) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}
