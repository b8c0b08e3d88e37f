//! compat-proc core - platform-independent building blocks
//!
//! This crate provides command tokenizing, affinity masks, the output
//! broadcaster, configuration, and the traits that platform crates implement
//! to enumerate and signal compatibility-layer processes.

mod affinity;
mod broadcast;
mod capture;
mod config;
mod error;
mod process;
mod tokenizer;

pub use affinity::*;
pub use broadcast::*;
pub use capture::*;
pub use config::*;
pub use error::*;
pub use process::*;
pub use tokenizer::*;

/// Selects the platform implementations used by the facade crate
pub trait PlatformFactory {
    type Scanner: ProcessScan + 'static;
    type Dispatch: SignalDispatch + 'static;

    fn create_scanner(config: &EnumeratorConfig) -> Self::Scanner;

    fn create_signal_dispatch() -> Self::Dispatch;

    /// Get the platform name for logging and debugging
    fn platform_name() -> &'static str;
}
