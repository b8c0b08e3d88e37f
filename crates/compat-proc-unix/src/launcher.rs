use compat_proc_core::{
    CompatError, CompatResult, DebugStreamBroadcaster, FAILED_EXIT_STATUS, LaunchRequest,
    OutputStream, Pid, TerminationCallback, UNKNOWN_PID, pump_lines, tokenize,
};
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Native OS pid of a freshly spawned child.
///
/// This is the only place that asks the runtime for the pid. Returns
/// [`UNKNOWN_PID`] when the runtime cannot report it, e.g. once the child
/// has already been reaped.
pub fn native_pid(child: &Child) -> Pid {
    child
        .id()
        .and_then(|id| Pid::try_from(id).ok())
        .unwrap_or(UNKNOWN_PID)
}

/// Exit code of a finished process, or `128 + signal` when it was killed
pub fn exit_status_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(FAILED_EXIT_STATUS)
}

/// Background work belonging to one launch.
///
/// Dropping the handle leaves the reader and wait tasks running; call
/// [`cancel`](Self::cancel) or [`shutdown`](Self::shutdown) to stop them.
/// Neither touches the launched process itself; output it writes after
/// cancellation is drained and discarded.
#[derive(Debug)]
pub struct LaunchHandle {
    pid: Pid,
    spawned: bool,
    token: CancellationToken,
    readers: Vec<JoinHandle<()>>,
    waiter: Option<JoinHandle<()>>,
}

impl LaunchHandle {
    fn failed() -> Self {
        Self {
            pid: UNKNOWN_PID,
            spawned: false,
            token: CancellationToken::new(),
            readers: Vec::new(),
            waiter: None,
        }
    }

    /// Native pid, or [`UNKNOWN_PID`] if spawning failed or the pid was unavailable
    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn is_spawned(&self) -> bool {
        self.spawned
    }

    /// Number of output reader tasks started for this launch (0 or 2)
    pub fn reader_count(&self) -> usize {
        self.readers.len()
    }

    pub fn has_waiter(&self) -> bool {
        self.waiter.is_some()
    }

    /// Stop the reader and wait tasks without waiting for them
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Stop the reader and wait tasks and wait until they have finished.
    ///
    /// A pending termination callback is not invoked.
    pub async fn shutdown(self) {
        self.cancel();
        self.join().await;
    }

    /// Wait for the background tasks to finish on their own: readers at
    /// end of stream, the waiter once the process has exited.
    pub async fn join(self) {
        for task in self.readers.into_iter().chain(self.waiter) {
            if let Err(e) = task.await {
                warn!("Launch task for process {} ended abnormally: {e}", self.pid);
            }
        }
    }
}

/// Starts processes from shell-like command lines
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    broadcaster: Arc<DebugStreamBroadcaster>,
}

impl ProcessLauncher {
    pub fn new(broadcaster: Arc<DebugStreamBroadcaster>) -> Self {
        Self { broadcaster }
    }

    pub fn broadcaster(&self) -> &Arc<DebugStreamBroadcaster> {
        &self.broadcaster
    }

    /// Launch `command` with the inherited environment and working directory
    pub async fn launch_command(&self, command: &str) -> LaunchHandle {
        self.launch(&LaunchRequest::new(command), None).await
    }

    /// Spawn the request's command and return immediately.
    ///
    /// Output is captured (two reader tasks) only when the broadcaster has
    /// listeners at this moment. With `on_terminate`, a wait task reports
    /// the exit status once the process exits. If spawning fails the
    /// callback runs right here with [`FAILED_EXIT_STATUS`] and the handle
    /// carries [`UNKNOWN_PID`].
    pub async fn launch(
        &self,
        request: &LaunchRequest,
        on_terminate: Option<TerminationCallback>,
    ) -> LaunchHandle {
        let argv = tokenize(&request.command);
        let capture = self.broadcaster.has_listeners();
        info!(
            "Executing: {:?}, env: {:?}, working dir: {:?}",
            argv, request.env, request.working_directory
        );

        let mut child = match spawn_child(&argv, request, capture) {
            Ok(child) => child,
            Err(e) => {
                error!("Failed to execute command: {e}");
                if let Some(callback) = on_terminate {
                    callback(FAILED_EXIT_STATUS);
                }
                return LaunchHandle::failed();
            }
        };

        let pid = native_pid(&child);
        if pid == UNKNOWN_PID {
            warn!("Spawned {:?} but its pid is not available", argv.first());
        }

        let token = CancellationToken::new();
        let mut readers = Vec::new();
        if capture {
            if let Some(stdout) = child.stdout.take() {
                readers.push(tokio::spawn(pump_lines(
                    stdout,
                    OutputStream::Stdout,
                    pid,
                    self.broadcaster.clone(),
                    token.clone(),
                )));
            }
            if let Some(stderr) = child.stderr.take() {
                readers.push(tokio::spawn(pump_lines(
                    stderr,
                    OutputStream::Stderr,
                    pid,
                    self.broadcaster.clone(),
                    token.clone(),
                )));
            }
        }

        // Without a callback the child is dropped; the runtime still reaps it
        let waiter = on_terminate
            .map(|callback| tokio::spawn(wait_for_exit(child, pid, callback, token.clone())));

        LaunchHandle {
            pid,
            spawned: true,
            token,
            readers,
            waiter,
        }
    }
}

fn spawn_child(argv: &[String], request: &LaunchRequest, capture: bool) -> CompatResult<Child> {
    let (program, args) = argv.split_first().ok_or(CompatError::EmptyCommand)?;

    let mut cmd = Command::new(program);
    cmd.args(args).envs(&request.env).stdin(Stdio::null());

    if let Some(dir) = &request.working_directory {
        cmd.current_dir(dir);
    }

    let output = || if capture { Stdio::piped() } else { Stdio::null() };
    cmd.stdout(output()).stderr(output());

    cmd.spawn()
        .map_err(|e| CompatError::Spawn(format!("{program}: {e}")))
}

async fn wait_for_exit(
    mut child: Child,
    pid: Pid,
    on_terminate: TerminationCallback,
    token: CancellationToken,
) {
    tokio::select! {
        _ = token.cancelled() => {
            warn!("Stopped waiting for process {pid} termination: launch cancelled");
        }
        status = child.wait() => match status {
            Ok(status) => {
                let code = exit_status_code(status);
                info!("Process {pid} exited with status {code}");
                on_terminate(code);
            }
            Err(e) => {
                error!("Error waiting for process {pid} termination: {e}");
            }
        }
    }
}
