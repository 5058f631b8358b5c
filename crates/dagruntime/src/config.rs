use serde::{Deserialize, Serialize};

/// Configuration for the workflow engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Capacity of the event broadcast channel
    pub event_buffer_size: usize,

    /// Export whatever results exist when a node aborts the run
    pub export_on_failure: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: 1000,
            export_on_failure: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"export_on_failure": false}"#).unwrap();
        assert!(!config.export_on_failure);
        assert_eq!(config.event_buffer_size, 1000);
    }
}
