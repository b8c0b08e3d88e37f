use compat_proc_core::{
    Pid, ProcessScan, ProcessSignal, SignalDispatch, SignalOutcome, descendants_of,
};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid as NixPid;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Sends signals with `kill(2)`
#[derive(Debug, Clone, Copy, Default)]
pub struct NixSignalDispatch;

impl SignalDispatch for NixSignalDispatch {
    fn dispatch(&self, pid: Pid, signal: ProcessSignal) -> SignalOutcome {
        // 0 and negative pids address process groups or every process we own
        if pid <= 0 {
            warn!("Refusing to send {} to pid {pid}", signal.name());
            return SignalOutcome::Failed(format!("invalid pid {pid}"));
        }

        match signal::kill(NixPid::from_raw(pid), to_nix(signal)) {
            Ok(()) => {
                info!("Sent {} to process {pid}", signal.name());
                SignalOutcome::Delivered
            }
            Err(Errno::ESRCH) => {
                info!("Process {pid} not found (already terminated)");
                SignalOutcome::ProcessNotFound
            }
            Err(Errno::EPERM) => {
                warn!("Permission denied to send {} to process {pid}", signal.name());
                SignalOutcome::PermissionDenied
            }
            Err(e) => {
                warn!("Failed to send {} to process {pid}: {e}", signal.name());
                SignalOutcome::Failed(format!("{} failed: {e}", signal.name()))
            }
        }
    }
}

fn to_nix(signal: ProcessSignal) -> Signal {
    match signal {
        ProcessSignal::Suspend => Signal::SIGSTOP,
        ProcessSignal::Resume => Signal::SIGCONT,
        ProcessSignal::Terminate => Signal::SIGTERM,
        ProcessSignal::Kill => Signal::SIGKILL,
    }
}

/// Suspends, resumes and terminates processes by pid.
///
/// Every call sends exactly one signal per pid and returns immediately;
/// nothing waits for the target to change state. Bulk operations act on the
/// compatibility-layer scan and keep going when a single pid fails.
#[derive(Clone)]
pub struct SignalController {
    scanner: Arc<dyn ProcessScan>,
    dispatch: Arc<dyn SignalDispatch>,
}

impl SignalController {
    pub fn new(scanner: Arc<dyn ProcessScan>) -> Self {
        Self::with_dispatch(scanner, Arc::new(NixSignalDispatch))
    }

    pub fn with_dispatch(scanner: Arc<dyn ProcessScan>, dispatch: Arc<dyn SignalDispatch>) -> Self {
        Self { scanner, dispatch }
    }

    pub fn signal(&self, pid: Pid, signal: ProcessSignal) -> SignalOutcome {
        self.dispatch.dispatch(pid, signal)
    }

    pub fn suspend(&self, pid: Pid) -> SignalOutcome {
        self.signal(pid, ProcessSignal::Suspend)
    }

    pub fn resume(&self, pid: Pid) -> SignalOutcome {
        self.signal(pid, ProcessSignal::Resume)
    }

    pub fn terminate(&self, pid: Pid) -> SignalOutcome {
        self.signal(pid, ProcessSignal::Terminate)
    }

    pub fn kill(&self, pid: Pid) -> SignalOutcome {
        self.signal(pid, ProcessSignal::Kill)
    }

    /// Send `signal` to every pid found by the compatibility-layer scan
    pub async fn signal_all_compat(&self, signal: ProcessSignal) -> Vec<(Pid, SignalOutcome)> {
        let pids = self.scanner.list_compat_layer_pids().await;
        if pids.is_empty() {
            debug!("No compatibility-layer processes to receive {}", signal.name());
        }

        pids.into_iter()
            .map(|pid| (pid, self.signal(pid, signal)))
            .collect()
    }

    pub async fn suspend_all_compat(&self) -> Vec<(Pid, SignalOutcome)> {
        self.signal_all_compat(ProcessSignal::Suspend).await
    }

    pub async fn resume_all_compat(&self) -> Vec<(Pid, SignalOutcome)> {
        self.signal_all_compat(ProcessSignal::Resume).await
    }

    pub async fn terminate_all_compat(&self) -> Vec<(Pid, SignalOutcome)> {
        self.signal_all_compat(ProcessSignal::Terminate).await
    }

    pub async fn kill_all_compat(&self) -> Vec<(Pid, SignalOutcome)> {
        self.signal_all_compat(ProcessSignal::Kill).await
    }

    /// SIGTERM every owned descendant of `root` (deepest first), then `root`
    pub async fn terminate_tree(&self, root: Pid) -> Vec<(Pid, SignalOutcome)> {
        let records = self.scanner.list_owned_processes().await;
        let descendants = descendants_of(&records, root);
        info!(
            "Terminating process tree for root PID {root} ({} descendants)",
            descendants.len()
        );

        descendants
            .into_iter()
            .chain(std::iter::once(root))
            .map(|pid| (pid, self.terminate(pid)))
            .collect()
    }
}
