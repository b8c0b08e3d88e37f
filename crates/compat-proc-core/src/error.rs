use thiserror::Error;

/// Core error types for compatibility-layer process control
#[derive(Error, Debug)]
pub enum CompatError {
    #[error("Failed to spawn process: {0}")]
    Spawn(String),

    #[error("Command is empty after tokenization")]
    EmptyCommand,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type CompatResult<T> = Result<T, CompatError>;

impl CompatError {
    /// Check if this error indicates a permanent failure
    pub fn is_permanent(&self) -> bool {
        matches!(self, CompatError::Configuration(_) | CompatError::EmptyCommand)
    }
}
