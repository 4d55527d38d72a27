//! Agent configuration
//!
//! Timing constants, the platform endpoint and the user-facing labels.
//! There is no config file: hosts build this in code or from JSON.

use serde::Deserialize;
use std::time::Duration;

/// Prefix for every class name the agent injects into the page
pub const SCRIPT_NAME: &str = "ku-return-helper";

/// Configuration for the agent
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// AJAX endpoint path, resolved against the current page URL
    pub endpoint_path: String,
    /// Delay before the first confirmation check (platform write/read lag)
    pub first_confirm_delay_ms: u64,
    /// Delay between confirmation checks
    pub confirm_interval_ms: u64,
    /// Checks after the first one before giving up
    pub max_confirm_retries: u32,
    /// Loaned items requested per snapshot
    pub batch_size: u32,
    pub bulk_return_label: String,
    pub return_label: String,
    pub failure_alert: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            endpoint_path: "/hz/mycd/ajax".to_string(),
            first_confirm_delay_ms: 5000,
            confirm_interval_ms: 1000,
            max_confirm_retries: 30,
            batch_size: 100,
            bulk_return_label: "すべて返却".to_string(),
            return_label: "返却".to_string(),
            failure_alert: "返却できませんでした".to_string(),
        }
    }
}

impl AgentConfig {
    pub fn first_confirm_delay(&self) -> Duration {
        Duration::from_millis(self.first_confirm_delay_ms)
    }

    pub fn confirm_interval(&self) -> Duration {
        Duration::from_millis(self.confirm_interval_ms)
    }

    /// Upper bound on snapshot fetches made by one confirm loop
    pub fn max_confirm_checks(&self) -> u32 {
        self.max_confirm_retries.saturating_add(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.endpoint_path, "/hz/mycd/ajax");
        assert_eq!(config.first_confirm_delay(), Duration::from_secs(5));
        assert_eq!(config.confirm_interval(), Duration::from_secs(1));
        assert_eq!(config.max_confirm_checks(), 31);
    }

    #[test]
    fn test_deserialize_partial() {
        let json = r#"{"max_confirm_retries": 3, "confirm_interval_ms": 10}"#;
        let config: AgentConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.max_confirm_retries, 3);
        assert_eq!(config.confirm_interval_ms, 10);
        // Unspecified fields keep their defaults
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.return_label, "返却");
    }

    #[test]
    fn test_max_confirm_checks_saturates() {
        let config: AgentConfig = serde_json::from_str(&format!(r#"{{"max_confirm_retries": {}}}"#, u32::MAX)).unwrap();
        assert_eq!(config.max_confirm_checks(), u32::MAX);
    }
}
