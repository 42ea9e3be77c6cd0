pub mod config;
pub mod display;
pub mod error;
pub mod http;
pub mod offline;
pub mod protocol;
pub mod report;
pub mod runner;
pub mod service;
pub mod state;
pub use config::ExperimentConfig;
pub use display::{ChoiceButton, ContainerStyle, DisplayBody, DisplayState, StimulusView};
pub use error::{ExperimentError, ServiceError};
pub use http::HttpExperimentClient;
pub use offline::OfflineExperiment;
pub use report::{BlockSummary, SubmitProgress, SubmitTally, Summary, compute_summary, submit_all};
pub use runner::EffectRunner;
pub use service::{ResultsSink, TrialDataService};
pub use state::{Effect, SequencerEvent, SubmissionState, TrialSequencer};
