//! Launching and tearing down the service under test.
//!
//! [`ServiceProcess::launch`] starts the binary with the session secret and an
//! isolated state directory, then drains stdout and stderr on two background
//! tasks into a shared [`OutputLog`]. The child never blocks on a full pipe.
//!
//! [`ServiceProcess::shutdown`] is the teardown step: terminate, wait for a
//! grace period, then kill. It is idempotent. `kill_on_drop` covers the
//! paths where `shutdown` is never reached (panics, early returns).

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::{AbortHandle, JoinHandle};

use crate::error::HarnessError;
use crate::output_log::OutputLog;
use crate::secret::ServiceSecret;

/// Environment variable the service reads its state root from.
pub const STATE_DIR_ENV: &str = "TT_DATA_ROOT";

/// File the service records `{pid, port}` in, under the state root.
pub const STATE_FILE_NAME: &str = "connection.json";

/// Default wait between terminate and kill.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

// Drain tasks end at pipe EOF; grandchildren holding the pipe can delay that.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// What to launch and where its state lives.
#[derive(Clone, Debug)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub secret: ServiceSecret,
    pub state_dir: PathBuf,
    pub state_dir_env: String,
}

impl LaunchSpec {
    pub fn new(
        program: impl Into<PathBuf>,
        secret: ServiceSecret,
        state_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            secret,
            state_dir: state_dir.into(),
            state_dir_env: STATE_DIR_ENV.to_string(),
        }
    }

    /// Location of the service's connection file.
    pub fn state_file(&self) -> PathBuf {
        self.state_dir.join(STATE_FILE_NAME)
    }
}

/// Lifecycle of a supervised process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    /// The process exited on its own or after a terminate signal.
    Exited(ExitStatus),
    /// The process ignored the grace period and was killed.
    Killed,
}

/// A running service instance.
#[derive(Debug)]
pub struct ServiceProcess {
    child: Child,
    pid: u32,
    output: OutputLog,
    state: ProcessState,
    drains: Vec<JoinHandle<()>>,
}

impl ServiceProcess {
    /// Spawn the service described by `spec`.
    pub fn launch(spec: &LaunchSpec) -> Result<Self, HarnessError> {
        let launch_failure = |error| HarnessError::LaunchFailure {
            program: spec.program.display().to_string(),
            error,
        };

        let mut child = Command::new(&spec.program)
            .arg(spec.secret.launch_arg())
            .args(&spec.args)
            .env(&spec.state_dir_env, &spec.state_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(launch_failure)?;

        let pid = child
            .id()
            .ok_or_else(|| launch_failure(std::io::Error::other("process exited during spawn")))?;

        let output = OutputLog::new();
        let mut drains = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            drains.push(tokio::spawn(drain(stdout, output.clone(), "stdout")));
        }
        if let Some(stderr) = child.stderr.take() {
            drains.push(tokio::spawn(drain(stderr, output.clone(), "stderr")));
        }

        tracing::info!(
            pid,
            program = %spec.program.display(),
            state_dir = %spec.state_dir.display(),
            "service launched"
        );

        Ok(Self {
            child,
            pid,
            output,
            state: ProcessState::Running,
            drains,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Shared handle to the captured output.
    pub fn output(&self) -> &OutputLog {
        &self.output
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Exit status if the process has ended, without blocking.
    pub fn try_exited(&mut self) -> Result<Option<ExitStatus>, HarnessError> {
        match self.state {
            ProcessState::Exited(status) => return Ok(Some(status)),
            ProcessState::Killed => return Ok(None),
            ProcessState::Running => {}
        }
        let status = self.child.try_wait()?;
        if let Some(status) = status {
            self.state = ProcessState::Exited(status);
        }
        Ok(status)
    }

    /// Terminate, wait up to `grace`, then kill.
    ///
    /// Safe to call repeatedly and after the process already exited.
    pub async fn shutdown(&mut self, grace: Duration) -> Result<ProcessState, HarnessError> {
        if self.state == ProcessState::Running && self.try_exited()?.is_none() {
            self.terminate()?;
            match tokio::time::timeout(grace, self.child.wait()).await {
                Ok(status) => {
                    let status = status?;
                    tracing::info!(pid = self.pid, %status, "service stopped");
                    self.state = ProcessState::Exited(status);
                }
                Err(_) => {
                    tracing::warn!(pid = self.pid, ?grace, "service ignored terminate; killing");
                    self.child.kill().await?;
                    self.state = ProcessState::Killed;
                }
            }
        }

        let drains = std::mem::take(&mut self.drains);
        let aborts: Vec<_> = drains.iter().map(JoinHandle::abort_handle).collect();
        if tokio::time::timeout(DRAIN_GRACE, futures::future::join_all(drains))
            .await
            .is_err()
        {
            aborts.iter().for_each(AbortHandle::abort);
        }

        Ok(self.state)
    }

    #[cfg(unix)]
    fn terminate(&mut self) -> Result<(), HarnessError> {
        let pid = libc::pid_t::try_from(self.pid)
            .map_err(|_| std::io::Error::other(format!("pid {} out of range", self.pid)))?;
        // SAFETY: kill(2) has no memory effects; `pid` is our own child, not yet reaped.
        let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            // ESRCH: it exited between the check and the signal.
            if err.raw_os_error() != Some(libc::ESRCH) {
                return Err(err.into());
            }
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) -> Result<(), HarnessError> {
        self.child.start_kill()?;
        Ok(())
    }
}

/// Copy lines from `reader` into `log` until EOF.
async fn drain<R>(reader: R, log: OutputLog, stream: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\r', '\n']);
                tracing::info!(target: "service", stream, "{line}");
                log.append(line);
            }
            Err(e) => {
                tracing::warn!(stream, error = %e, "stopped reading service output");
                break;
            }
        }
    }
}
