use serde::{Deserialize, Serialize};

/// Protocol timing and retry parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub trials_per_block: u32,
    /// Blank trial screen before the fixation cross.
    pub pre_trial_delay_ms: u64,
    pub fixation_ms: u64,
    /// Gap between a recorded response and the next trial.
    pub post_response_delay_ms: u64,
    pub fetch_retry_delay_ms: u64,
    /// Total attempts per stimulus fetch before the trial is reported unavailable.
    pub max_fetch_attempts: u32,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            trials_per_block: 10,
            pre_trial_delay_ms: 1500,
            fixation_ms: 1000,
            post_response_delay_ms: 500,
            fetch_retry_delay_ms: 1000,
            max_fetch_attempts: 3,
        }
    }
}
