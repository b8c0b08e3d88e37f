//! Unix implementation of compatibility-layer process control: `kill(2)`
//! signals, `ps`/`/proc` enumeration, and Tokio-based launching.

#[cfg(unix)]
mod enumerator;
#[cfg(unix)]
mod launcher;
#[cfg(unix)]
mod signals;

#[cfg(unix)]
pub use enumerator::{ProcessEnumerator, parse_identity_user, parse_process_listing};
#[cfg(unix)]
pub use launcher::{LaunchHandle, ProcessLauncher, exit_status_code, native_pid};
#[cfg(unix)]
pub use signals::{NixSignalDispatch, SignalController};

#[cfg(unix)]
pub struct UnixPlatform;

#[cfg(unix)]
impl compat_proc_core::PlatformFactory for UnixPlatform {
    type Scanner = ProcessEnumerator;
    type Dispatch = NixSignalDispatch;

    fn create_scanner(config: &compat_proc_core::EnumeratorConfig) -> Self::Scanner {
        ProcessEnumerator::new(config.clone())
    }

    fn create_signal_dispatch() -> Self::Dispatch {
        NixSignalDispatch
    }

    fn platform_name() -> &'static str {
        "unix"
    }
}
