use compat_proc_core::{EnumeratorConfig, PlatformFactory};

#[cfg(not(unix))]
compile_error!("compat-proc relies on POSIX signals and only supports Unix targets");

/// Platform implementation selected at compile time
#[cfg(unix)]
pub type Platform = compat_proc_unix::UnixPlatform;

pub type PlatformScanner = <Platform as PlatformFactory>::Scanner;
pub type PlatformDispatch = <Platform as PlatformFactory>::Dispatch;

pub fn create_scanner(config: &EnumeratorConfig) -> PlatformScanner {
    Platform::create_scanner(config)
}

pub fn create_signal_dispatch() -> PlatformDispatch {
    Platform::create_signal_dispatch()
}

pub fn platform_name() -> &'static str {
    Platform::platform_name()
}
