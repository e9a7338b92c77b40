//! Service configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DiagResult, ValidationError};
use crate::notify::FanOutPolicy;

/// Configuration for a `DiagnosticService`.
///
/// Missing fields take their defaults when deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticServiceConfig {
    /// Name of the notification worker thread.
    pub worker_thread_name: String,
    /// Catch panics from subscribers and activation hooks instead of
    /// letting them take down the worker.
    pub isolate_subscriber_panics: bool,
    /// Warn when one subscriber call exceeds this many milliseconds. `0` disables.
    pub slow_subscriber_threshold_ms: u64,
}

impl Default for DiagnosticServiceConfig {
    fn default() -> Self {
        Self {
            worker_thread_name: "diaghub-notify".to_string(),
            isolate_subscriber_panics: true,
            slow_subscriber_threshold_ms: 250,
        }
    }
}

impl DiagnosticServiceConfig {
    /// Parses a JSON configuration document.
    pub fn from_json(json: &str) -> DiagResult<Self> {
        let cfg: Self = serde_json::from_str(json).map_err(|e| ValidationError::InvalidConfig {
            reason: format!("malformed configuration: {e}"),
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Checks field constraints.
    pub fn validate(&self) -> DiagResult<()> {
        if self.worker_thread_name.trim().is_empty() {
            return Err(ValidationError::InvalidConfig {
                reason: "worker_thread_name must not be empty".to_string(),
            }
            .into());
        }
        Ok(())
    }

    pub(crate) fn fan_out_policy(&self) -> FanOutPolicy {
        FanOutPolicy {
            isolate_panics: self.isolate_subscriber_panics,
            slow_threshold: (self.slow_subscriber_threshold_ms > 0)
                .then(|| Duration::from_millis(self.slow_subscriber_threshold_ms)),
        }
    }
}
