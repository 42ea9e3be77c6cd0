use crate::error::ServiceError;
use crate::protocol::{
    ErrorBody, GET_TRIAL_PATH, GetTrialRequest, GetTrialResponse, SAVE_RESULT_PATH,
    START_EXPERIMENT_PATH, SUBMIT_TRIAL_PATH, SaveResultRequest, SaveResultResponse,
    StartExperimentRequest, StartExperimentResponse, SubmitTrialRequest,
};
use crate::service::{ResultsSink, TrialDataService};
use async_trait::async_trait;
use lexiflash_core::{BlockType, Session, TrialResult, TrialStimulusSpec};
use reqwest::{Client, Response};
use serde::{Serialize, de::DeserializeOwned};
use std::time::Duration;
use tracing::debug;

/// JSON-over-HTTP client for the experiment service.
///
/// The service ties trials and results to the session through a cookie set by
/// `/start_experiment`, so the client keeps a cookie store.
#[derive(Debug, Clone)]
pub struct HttpExperimentClient {
    http: Client,
    base_url: String,
}

impl HttpExperimentClient {
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self, ServiceError> {
        let mut builder = Client::builder().cookie_store(true);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Ok(Self { http, base_url })
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Response, ServiceError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "posting to experiment service");
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(|body| body.error);
        Err(ServiceError::Status {
            status: status.as_u16(),
            message,
        })
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, ServiceError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.post(path, body)
            .await?
            .json::<R>()
            .await
            .map_err(|e| ServiceError::InvalidPayload(e.to_string()))
    }
}

#[async_trait]
impl TrialDataService for HttpExperimentClient {
    async fn start_session(&self) -> Result<Session, ServiceError> {
        let response: StartExperimentResponse = self
            .post_json(START_EXPERIMENT_PATH, &StartExperimentRequest {})
            .await?;
        Session::try_from(response)
    }

    async fn get_trial(
        &self,
        block: BlockType,
        trial_number: u32,
    ) -> Result<TrialStimulusSpec, ServiceError> {
        let request = GetTrialRequest {
            block_type: block,
            trial_number,
        };
        let response: GetTrialResponse = self.post_json(GET_TRIAL_PATH, &request).await?;
        TrialStimulusSpec::try_from(response)
    }
}

#[async_trait]
impl ResultsSink for HttpExperimentClient {
    async fn submit_trial(&self, result: &TrialResult) -> Result<(), ServiceError> {
        self.post(SUBMIT_TRIAL_PATH, &SubmitTrialRequest::from(result))
            .await
            .map(drop)
    }

    async fn save_result(&self, result: &TrialResult) -> Result<(), ServiceError> {
        let response: SaveResultResponse = self
            .post_json(SAVE_RESULT_PATH, &SaveResultRequest::from(result))
            .await?;
        if response.success {
            Ok(())
        } else {
            Err(ServiceError::Rejected(
                response
                    .error
                    .unwrap_or_else(|| "result was not saved".to_owned()),
            ))
        }
    }
}
