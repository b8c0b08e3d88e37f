//! compat-proc - launch, discover, and signal the processes of a
//! compatibility layer.
//!
//! [`CompatProcessCore`] wires the platform implementation together around a
//! single [`DebugStreamBroadcaster`]. The individual pieces are re-exported
//! for callers that only need one of them.

mod factory;
pub mod logging;

use std::sync::Arc;
use tracing::info;

pub use compat_proc_core::*;
pub use compat_proc_unix::{
    LaunchHandle, NixSignalDispatch, ProcessEnumerator, ProcessLauncher, SignalController,
    exit_status_code, native_pid, parse_identity_user, parse_process_listing,
};
pub use factory::platform_name;

use factory::PlatformScanner;

/// Entry point bundling launching, enumeration and signalling
#[derive(Clone)]
pub struct CompatProcessCore {
    config: CoreConfig,
    broadcaster: Arc<DebugStreamBroadcaster>,
    scanner: Arc<PlatformScanner>,
    launcher: ProcessLauncher,
    signals: SignalController,
}

impl CompatProcessCore {
    /// Create a core with its own, initially empty, broadcaster
    pub fn new(config: CoreConfig) -> CompatResult<Self> {
        Self::with_broadcaster(config, Arc::new(DebugStreamBroadcaster::new()))
    }

    /// Create a core that feeds captured output into an existing broadcaster
    pub fn with_broadcaster(
        config: CoreConfig,
        broadcaster: Arc<DebugStreamBroadcaster>,
    ) -> CompatResult<Self> {
        config.validate()?;

        let scanner = Arc::new(factory::create_scanner(&config.enumerator));
        let signals = SignalController::with_dispatch(
            scanner.clone(),
            Arc::new(factory::create_signal_dispatch()),
        );
        info!(
            "Created CompatProcessCore with platform: {}",
            factory::platform_name()
        );

        Ok(Self {
            launcher: ProcessLauncher::new(broadcaster.clone()),
            config,
            broadcaster,
            scanner,
            signals,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn broadcaster(&self) -> &Arc<DebugStreamBroadcaster> {
        &self.broadcaster
    }

    pub fn launcher(&self) -> &ProcessLauncher {
        &self.launcher
    }

    pub fn signals(&self) -> &SignalController {
        &self.signals
    }

    pub async fn launch(
        &self,
        request: &LaunchRequest,
        on_terminate: Option<TerminationCallback>,
    ) -> LaunchHandle {
        self.launcher.launch(request, on_terminate).await
    }

    pub async fn launch_command(&self, command: &str) -> LaunchHandle {
        self.launcher.launch_command(command).await
    }

    pub async fn list_owned_processes(&self) -> Vec<ProcessRecord> {
        ProcessScan::list_owned_processes(self.scanner.as_ref()).await
    }

    pub async fn list_compat_layer_pids(&self) -> Vec<Pid> {
        ProcessScan::list_compat_layer_pids(self.scanner.as_ref()).await
    }

    pub fn signal(&self, pid: Pid, signal: ProcessSignal) -> SignalOutcome {
        self.signals.signal(pid, signal)
    }

    pub fn suspend(&self, pid: Pid) -> SignalOutcome {
        self.signals.suspend(pid)
    }

    pub fn resume(&self, pid: Pid) -> SignalOutcome {
        self.signals.resume(pid)
    }

    pub fn terminate(&self, pid: Pid) -> SignalOutcome {
        self.signals.terminate(pid)
    }

    pub fn kill(&self, pid: Pid) -> SignalOutcome {
        self.signals.kill(pid)
    }

    pub async fn suspend_all_compat(&self) -> Vec<(Pid, SignalOutcome)> {
        self.signals.suspend_all_compat().await
    }

    pub async fn resume_all_compat(&self) -> Vec<(Pid, SignalOutcome)> {
        self.signals.resume_all_compat().await
    }

    pub async fn terminate_all_compat(&self) -> Vec<(Pid, SignalOutcome)> {
        self.signals.terminate_all_compat().await
    }

    pub async fn kill_all_compat(&self) -> Vec<(Pid, SignalOutcome)> {
        self.signals.kill_all_compat().await
    }

    pub async fn terminate_tree(&self, root: Pid) -> Vec<(Pid, SignalOutcome)> {
        self.signals.terminate_tree(root).await
    }
}
