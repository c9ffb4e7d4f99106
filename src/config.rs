//! Engine configuration

use crate::error::SentinelError;
use serde::{Deserialize, Serialize};

/// Default persistence debounce (milliseconds)
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// Default gap after which an open form span is closed (milliseconds)
pub const DEFAULT_FORM_QUIESCENCE_MS: u64 = 30_000;

/// Upper bound for either timer window (24 hours)
pub const MAX_TIMER_MS: u64 = 86_400_000;

/// Default name of the durable snapshot slot
pub const DEFAULT_STORAGE_KEY: &str = "botDetectionData";

/// Tunables for a telemetry session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentinelConfig {
    /// Quiet period before a mutation burst is written out
    pub debounce_ms: u64,
    /// Maximum gap between form interactions within one fill span
    pub form_quiescence_ms: u64,
    /// Name of the durable slot holding the latest snapshot
    pub storage_key: String,
    /// Element tags that count as form controls (matched case-insensitively)
    pub form_tags: Vec<String>,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            form_quiescence_ms: DEFAULT_FORM_QUIESCENCE_MS,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            form_tags: vec![
                "INPUT".to_string(),
                "TEXTAREA".to_string(),
                "SELECT".to_string(),
            ],
        }
    }
}

impl SentinelConfig {
    /// Parse and validate a JSON config; omitted keys take their defaults
    pub fn from_json(json: &str) -> Result<Self, SentinelError> {
        let config: SentinelConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SentinelError> {
        check_timer("debounce_ms", self.debounce_ms)?;
        check_timer("form_quiescence_ms", self.form_quiescence_ms)?;
        if self.storage_key.trim().is_empty() {
            return Err(SentinelError::InvalidConfig(
                "storage_key must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_form_tag(&self, tag: &str) -> bool {
        self.form_tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

fn check_timer(name: &str, value_ms: u64) -> Result<(), SentinelError> {
    if value_ms == 0 || value_ms > MAX_TIMER_MS {
        return Err(SentinelError::InvalidConfig(format!(
            "{name} must be between 1 and {MAX_TIMER_MS} ms, got {value_ms}"
        )));
    }
    Ok(())
}
