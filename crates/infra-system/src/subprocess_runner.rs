// Subprocess runner implementation
// reason: tokio::process for non-blocking spawn + line streaming, nix for process-group signals
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
#[cfg(unix)]
use std::os::fd::OwnedFd;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use suterm_core::application::constants::{GRACEFUL_KILL_TIMEOUT, OUTPUT_DRAIN_TIMEOUT};
use suterm_core::application::CancelToken;
use suterm_core::domain::{CommandRequest, CommandSpec};
use suterm_core::port::{LineSender, ProcessExit, ProcessRunner, RunError};

/// Subprocess runner
///
/// Spawns each request as a child in its own process group with an allowlisted
/// environment. stdout and stderr share one pipe, so lines arrive in the order
/// the child wrote them. On timeout or cancel the whole group is killed
/// (SIGTERM, then SIGKILL). A child that exits by itself is left alone: anything
/// it started in the background keeps running, and its output is read only
/// until the drain window closes.
pub struct SubprocessRunner {
    env_allowlist: Vec<String>,
}

/// Why the wait loop stopped
enum Stop {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

impl SubprocessRunner {
    /// Create a new subprocess runner
    ///
    /// # Arguments
    /// * `env_allowlist` - Environment variables passed through to children
    ///
    /// # Example
    /// ```ignore
    /// let runner = SubprocessRunner::new(vec!["PATH".to_string(), "HOME".to_string()]);
    /// ```
    pub fn new(env_allowlist: Vec<String>) -> Self {
        Self { env_allowlist }
    }

    /// Keep allowlisted variables only
    fn filter_env<I>(&self, env: I) -> HashMap<String, String>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        env.into_iter()
            .filter(|(k, _)| self.env_allowlist.contains(k))
            .collect()
    }

    fn build_command(&self, request: &CommandRequest) -> Result<Command, RunError> {
        let mut command = match &request.command {
            CommandSpec::Argv(argv) => {
                let (program, args) = argv
                    .split_first()
                    .ok_or_else(|| RunError::LaunchFailure("empty command".to_string()))?;
                let mut command = Command::new(program);
                command.args(args);
                command
            }
            CommandSpec::Shell(line) => {
                let mut command = Command::new("sh");
                command.arg("-c").arg(line);
                command
            }
        };

        command
            .env_clear()
            .envs(self.filter_env(std::env::vars()))
            .stdin(Stdio::null())
            .kill_on_drop(true);

        // Own process group, so a timeout also reaches grandchildren of `sh -c`
        #[cfg(unix)]
        command.process_group(0);

        Ok(command)
    }

    /// Spawn the child and return it with the read side of its output.
    ///
    /// The command (and with it the parent's copies of the write ends) is
    /// dropped before returning, so the reader sees EOF once the child side closes.
    fn spawn(&self, request: &CommandRequest) -> Result<(Child, Output), RunError> {
        if let Some(path) = &request.required_path {
            if !path.exists() {
                return Err(RunError::LaunchFailure(format!(
                    "{} not found",
                    path.display()
                )));
            }
        }

        let mut command = self.build_command(request)?;
        let output = attach_output(&mut command)?;
        let child = command.spawn().map_err(|e| {
            let program = match &request.command {
                CommandSpec::Argv(argv) => argv.first().cloned().unwrap_or_default(),
                CommandSpec::Shell(_) => "sh".to_string(),
            };
            match e.kind() {
                ErrorKind::NotFound => RunError::LaunchFailure(format!("{}: not found", program)),
                ErrorKind::PermissionDenied => {
                    RunError::LaunchFailure(format!("{}: permission denied", program))
                }
                _ => RunError::LaunchFailure(format!("{}: {}", program, e)),
            }
        })?;

        Ok((child, output))
    }
}

/// Read side of the child's output
#[cfg(unix)]
type Output = tokio::net::unix::pipe::Receiver;

#[cfg(not(unix))]
type Output = ();

/// Point stdout and stderr at the same pipe (like `2>&1`)
#[cfg(unix)]
fn attach_output(command: &mut Command) -> Result<Output, RunError> {
    use tokio::net::unix::pipe;

    let (read, write) = output_pipe().map_err(|e| RunError::Io(format!("pipe: {}", e)))?;
    let write_err = write
        .try_clone()
        .map_err(|e| RunError::Io(format!("pipe: {}", e)))?;
    command.stdout(Stdio::from(write)).stderr(Stdio::from(write_err));

    pipe::Receiver::from_file(std::fs::File::from(read))
        .map_err(|e| RunError::Io(format!("pipe: {}", e)))
}

#[cfg(not(unix))]
fn attach_output(command: &mut Command) -> Result<Output, RunError> {
    command.stdout(Stdio::piped()).stderr(Stdio::piped());
    Ok(())
}

/// Close-on-exec pipe, so commands spawned concurrently never inherit our write end
#[cfg(any(target_os = "linux", target_os = "android"))]
fn output_pipe() -> nix::Result<(OwnedFd, OwnedFd)> {
    use nix::fcntl::OFlag;
    nix::unistd::pipe2(OFlag::O_CLOEXEC)
}

#[cfg(all(unix, not(any(target_os = "linux", target_os = "android"))))]
fn output_pipe() -> nix::Result<(OwnedFd, OwnedFd)> {
    use nix::fcntl::{fcntl, FcntlArg, FdFlag};
    use std::os::fd::AsRawFd;

    let (read, write) = nix::unistd::pipe()?;
    for fd in [&read, &write] {
        fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;
    }
    Ok((read, write))
}

/// One reader for the shared pipe (unix), one per stream elsewhere
fn start_readers(child: &mut Child, output: Output, lines: LineSender) -> Vec<JoinHandle<()>> {
    #[cfg(unix)]
    {
        let _ = child;
        vec![tokio::spawn(pump_lines(output, lines))]
    }

    #[cfg(not(unix))]
    {
        let _ = output;
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(pump_lines(stdout, lines.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(pump_lines(stderr, lines)));
        }
        readers
    }
}

#[async_trait]
impl ProcessRunner for SubprocessRunner {
    async fn run(
        &self,
        request: &CommandRequest,
        lines: LineSender,
        mut cancel: CancelToken,
    ) -> Result<ProcessExit, RunError> {
        let (mut child, output) = self.spawn(request)?;
        let pid = child.id();

        debug!(request_id = %request.id, pid = ?pid, "Subprocess spawned");

        // The readers hold the only senders from here on
        let readers = start_readers(&mut child, output, lines);

        let stop = tokio::select! {
            status = child.wait() => Stop::Exited(status),
            _ = sleep(request.timeout) => Stop::TimedOut,
            _ = cancel.cancelled() => Stop::Cancelled,
        };

        let exit = match stop {
            Stop::Exited(Ok(status)) => ProcessExit::exited(status.code()),
            Stop::Exited(Err(e)) => {
                terminate(&mut child, pid).await;
                drain(readers).await;
                return Err(RunError::Io(e.to_string()));
            }
            Stop::TimedOut => {
                warn!(
                    request_id = %request.id,
                    pid = ?pid,
                    timeout_ms = request.timeout.as_millis() as u64,
                    "Subprocess exceeded deadline, terminating"
                );
                terminate(&mut child, pid).await;
                ProcessExit::timed_out()
            }
            Stop::Cancelled => {
                info!(request_id = %request.id, pid = ?pid, "Subprocess cancelled, terminating");
                terminate(&mut child, pid).await;
                ProcessExit::cancelled()
            }
        };

        drain(readers).await;
        Ok(exit)
    }
}

/// Forward one stream line by line. Invalid UTF-8 is replaced, blank lines are dropped.
async fn pump_lines<R: AsyncRead + Unpin>(stream: R, lines: LineSender) {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = decode_line(&buf);
                if line.trim().is_empty() {
                    continue;
                }
                if lines.send(line).is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!(error = %e, "Output stream read failed");
                break;
            }
        }
    }
}

fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches(['\n', '\r'])
        .to_string()
}

/// Wait for readers to hit EOF. A grandchild that inherited the pipes may keep
/// them open forever, so readers still running after the drain window are aborted.
async fn drain(readers: Vec<JoinHandle<()>>) {
    for mut reader in readers {
        if timeout(OUTPUT_DRAIN_TIMEOUT, &mut reader).await.is_err() {
            debug!("Output reader still open after drain window, aborting");
            reader.abort();
        }
    }
}

/// Kill the child's process group with SIGTERM first, then SIGKILL if needed
async fn terminate(child: &mut Child, pid: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = pid {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let group = Pid::from_raw(pid as i32);
        if let Err(e) = killpg(group, Signal::SIGTERM) {
            debug!(pid = %pid, error = %e, "SIGTERM to process group failed");
        }

        if timeout(GRACEFUL_KILL_TIMEOUT, child.wait()).await.is_ok() {
            debug!(pid = %pid, "Process exited after SIGTERM");
            reap_group(Some(pid));
            return;
        }

        warn!(pid = %pid, "Process did not exit after SIGTERM, sending SIGKILL");
        let _ = killpg(group, Signal::SIGKILL);
    }

    #[cfg(not(unix))]
    let _ = pid;

    if let Err(e) = child.start_kill() {
        debug!(error = %e, "start_kill failed (process already gone?)");
    }
    if let Err(e) = child.wait().await {
        warn!(error = %e, "Failed to reap killed process");
    }
}

/// SIGKILL whatever is left of a terminated group once the leader is gone
#[cfg(unix)]
fn reap_group(pid: Option<u32>) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = pid {
        // ESRCH is the normal case: the group died with its leader
        let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
    }
}

/// Check if a process is still running
pub fn is_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        // Signal 0 checks if process exists without actually sending a signal
        kill(Pid::from_raw(pid as i32), None).is_ok()
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}
