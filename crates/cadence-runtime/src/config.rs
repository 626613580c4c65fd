//! Runtime configuration

use cadence_core::{CadenceError, CadenceResult};
use cadence_idle::IdleQueueConfig;
use cadence_sequencer::SequencerConfig;
use serde::{Deserialize, Serialize};

use crate::LogConfig;

/// Everything a host needs to build a bridge; every field is optional in JSON
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub sequencer: SequencerConfig,
    pub idle: IdleQueueConfig,
    pub log: LogConfig,
}

impl RuntimeConfig {
    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> CadenceResult<Self> {
        let config: RuntimeConfig = serde_json::from_str(json)
            .map_err(|e| CadenceError::InvalidConfig(format!("malformed config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> CadenceResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| CadenceError::InvalidConfig(e.to_string()))
    }

    pub fn validate(&self) -> CadenceResult<()> {
        self.sequencer.queue.validate()?;
        self.idle.validate()?;
        Ok(())
    }
}
