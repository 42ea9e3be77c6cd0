use lexiflash_core::BlockType;
use thiserror::Error;

/// Failure talking to the trial service or the results sink.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServiceError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("service answered {status}{}", detail(.message))]
    Status { status: u16, message: Option<String> },
    #[error("service rejected the request: {0}")]
    Rejected(String),
    #[error("malformed response: {0}")]
    InvalidPayload(String),
    #[error("results store unavailable: {0}")]
    Storage(String),
}

fn detail(message: &Option<String>) -> String {
    message.as_deref().map(|m| format!(": {m}")).unwrap_or_default()
}

#[derive(Debug, Error)]
pub enum ExperimentError {
    #[error("could not start the experiment: {0}")]
    SessionStart(#[source] ServiceError),
    #[error("could not load trial {trial_number} of block {block}: {source}")]
    StimulusFetch {
        block: BlockType,
        trial_number: u32,
        #[source]
        source: ServiceError,
    },
    #[error("trial submission failed: {0}")]
    SubmitTrial(#[source] ServiceError),
    #[error("result {index} could not be saved: {source}")]
    SaveResult {
        index: usize,
        #[source]
        source: ServiceError,
    },
}
