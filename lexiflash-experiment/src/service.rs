use crate::error::ServiceError;
use async_trait::async_trait;
use lexiflash_core::{BlockType, Session, TrialResult, TrialStimulusSpec};

/// Source of sessions and per-trial stimuli.
#[async_trait]
pub trait TrialDataService: Send + Sync {
    async fn start_session(&self) -> Result<Session, ServiceError>;
    async fn get_trial(
        &self,
        block: BlockType,
        trial_number: u32,
    ) -> Result<TrialStimulusSpec, ServiceError>;
}

/// Persistent store for trial results.
#[async_trait]
pub trait ResultsSink: Send + Sync {
    /// Immediate per-trial submission; callers do not wait on it for flow control.
    async fn submit_trial(&self, result: &TrialResult) -> Result<(), ServiceError>;
    /// One entry of the final, user-confirmed bulk submission.
    async fn save_result(&self, result: &TrialResult) -> Result<(), ServiceError>;
}
