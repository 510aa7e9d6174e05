//! Engine configuration.
//!
//! Every section defaults sensibly and may be omitted from a JSON config
//! file. Call [`GateConfig::validate`] (done by
//! [`GovernanceEngine::new`](crate::engine::GovernanceEngine::new)) before use.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::compiler::CompilerConfig;
use crate::engine::RuntimeConfig;
use crate::error::ConfigError;
use crate::state::StateStoreConfig;
use crate::verifier::VerifierConfig;

/// Top-level configuration.
///
/// # Examples
///
/// ```
/// use rulegate::config::GateConfig;
///
/// let config = GateConfig::from_json_str(r#"{"verifier": {"timeout_ms": 250}}"#).unwrap();
/// assert_eq!(config.verifier.timeout_ms, 250);
/// assert!(config.compiler.verify);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Solver limits.
    pub verifier: VerifierConfig,
    /// Temporal history limits.
    pub state: StateStoreConfig,
    /// Compilation policy.
    pub compiler: CompilerConfig,
    /// Worker pools for [`GateRuntime`](crate::engine::GateRuntime).
    pub runtime: RuntimeConfig,
}

impl GateConfig {
    /// Parses and validates a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for malformed JSON or unusable values.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s).map_err(|e| ConfigError::Invalid {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Unreadable` if the file cannot be read, and
    /// `ConfigError::Invalid` as for [`from_json_str`](Self::from_json_str).
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            message: format!("{}: {e}", path.display()),
        })?;
        Self::from_json_str(&text)
    }

    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns the first section's `ConfigError::Invalid`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.verifier.validate()?;
        self.state.validate()?;
        self.runtime.validate()
    }
}
