use crate::error::{CompatError, CompatResult};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Where and how the process table is read
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnumeratorConfig {
    /// Command whose first output line contains `uid=<n>(<name>)`
    #[serde(default = "default_identity_command")]
    pub identity_command: String,

    /// Command printing `USER PID PPID VSZ RSS WCHAN ADDR S NAME` rows
    #[serde(default = "default_listing_command")]
    pub listing_command: String,

    /// Process-information directory holding `<pid>/stat` entries
    #[serde(default = "default_proc_root")]
    pub proc_root: PathBuf,

    /// A `stat` line containing any of these marks a compatibility-layer process
    #[serde(default = "default_compat_filters")]
    pub compat_filters: Vec<String>,
}

impl Default for EnumeratorConfig {
    fn default() -> Self {
        Self {
            identity_command: default_identity_command(),
            listing_command: default_listing_command(),
            proc_root: default_proc_root(),
            compat_filters: default_compat_filters(),
        }
    }
}

impl EnumeratorConfig {
    /// Validate the configuration and return errors if invalid
    pub fn validate(&self) -> CompatResult<()> {
        if self.identity_command.trim().is_empty() {
            return Err(CompatError::Configuration(
                "identity_command cannot be empty".to_string(),
            ));
        }

        if self.listing_command.trim().is_empty() {
            return Err(CompatError::Configuration(
                "listing_command cannot be empty".to_string(),
            ));
        }

        if self.compat_filters.is_empty() || self.compat_filters.iter().any(String::is_empty) {
            return Err(CompatError::Configuration(
                "compat_filters must contain at least one non-empty pattern".to_string(),
            ));
        }

        Ok(())
    }
}

/// Top-level configuration of the process core
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CoreConfig {
    #[serde(default)]
    pub enumerator: EnumeratorConfig,
}

impl CoreConfig {
    /// Parse and validate a JSON document; missing fields take their defaults
    pub fn from_json_str(json: &str) -> CompatResult<Self> {
        let config: CoreConfig = serde_json::from_str(json)
            .map_err(|e| CompatError::Configuration(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CompatResult<()> {
        self.enumerator.validate()
    }
}

/// What to start: a shell-like command line plus its environment
#[derive(Default, Debug, Clone, PartialEq, Builder)]
#[builder(setter(into, strip_option))]
pub struct LaunchRequest {
    pub command: String,
    /// Added on top of the inherited environment
    #[builder(default)]
    #[builder(setter(custom))]
    pub env: HashMap<String, String>,
    #[builder(default)]
    pub working_directory: Option<PathBuf>,
}

impl LaunchRequest {
    pub fn builder() -> LaunchRequestBuilder {
        LaunchRequestBuilder::default()
    }

    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }
}

impl LaunchRequestBuilder {
    pub fn env<T: ToString>(&mut self, key: T, value: T) -> &mut Self {
        let map = self.env.get_or_insert_with(HashMap::new);
        map.insert(key.to_string(), value.to_string());

        self
    }

    pub fn env_multi<T: ToString, I: IntoIterator<Item = (T, T)>>(&mut self, iter: I) -> &mut Self {
        let env = self.env.get_or_insert_with(HashMap::new);
        for (key, value) in iter {
            env.insert(key.to_string(), value.to_string());
        }
        self
    }
}

// Default value functions for serde
fn default_identity_command() -> String {
    "id".to_string()
}
fn default_listing_command() -> String {
    "ps -A -o USER,PID,PPID,VSZ,RSS,WCHAN,ADDR,S,NAME".to_string()
}
fn default_proc_root() -> PathBuf {
    PathBuf::from("/proc")
}
fn default_compat_filters() -> Vec<String> {
    vec!["wine".to_string(), "exe".to_string()]
}
