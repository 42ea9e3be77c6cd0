//! JSON bodies of the experiment service endpoints.

use crate::error::ServiceError;
use lexiflash_core::{BlockType, CHOICE_COUNT, HexColor, Session, TrialResult, TrialStimulusSpec};
use serde::{Deserialize, Serialize};

pub const START_EXPERIMENT_PATH: &str = "/start_experiment";
pub const GET_TRIAL_PATH: &str = "/get_trial";
pub const SUBMIT_TRIAL_PATH: &str = "/submit_trial";
pub const SAVE_RESULT_PATH: &str = "/save_result";

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StartExperimentRequest {}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartExperimentResponse {
    #[serde(default)]
    pub success: bool,
    pub session_id: Option<String>,
    pub participant_id: Option<String>,
}

impl TryFrom<StartExperimentResponse> for Session {
    type Error = ServiceError;

    fn try_from(value: StartExperimentResponse) -> Result<Self, Self::Error> {
        if !value.success {
            return Err(ServiceError::Rejected("experiment start was refused".into()));
        }
        match (value.session_id, value.participant_id) {
            (Some(session_id), Some(participant_id)) => Ok(Session {
                session_id,
                participant_id,
            }),
            _ => Err(ServiceError::InvalidPayload(
                "start response is missing session or participant id".into(),
            )),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetTrialRequest {
    pub block_type: BlockType,
    pub trial_number: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetTrialResponse {
    pub stimulus: String,
    pub choices: Vec<String>,
    pub text_color: HexColor,
    pub background_color: HexColor,
    pub display_time: u64,
    pub is_word: bool,
}

impl TryFrom<GetTrialResponse> for TrialStimulusSpec {
    type Error = ServiceError;

    fn try_from(value: GetTrialResponse) -> Result<Self, Self::Error> {
        if value.choices.len() != CHOICE_COUNT {
            return Err(ServiceError::InvalidPayload(format!(
                "expected {CHOICE_COUNT} choices, got {}",
                value.choices.len()
            )));
        }
        if !value.choices.contains(&value.stimulus) {
            return Err(ServiceError::InvalidPayload(format!(
                "stimulus '{}' is not among the choices",
                value.stimulus
            )));
        }
        Ok(TrialStimulusSpec {
            stimulus: value.stimulus,
            choices: value.choices,
            text_color: value.text_color,
            background_color: value.background_color,
            display_duration_ms: value.display_time,
            is_word: value.is_word,
        })
    }
}

impl From<&TrialStimulusSpec> for GetTrialResponse {
    fn from(spec: &TrialStimulusSpec) -> Self {
        Self {
            stimulus: spec.stimulus.clone(),
            choices: spec.choices.clone(),
            text_color: spec.text_color.clone(),
            background_color: spec.background_color.clone(),
            display_time: spec.display_duration_ms,
            is_word: spec.is_word,
        }
    }
}

/// Per-trial submission sent as soon as the participant answers.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitTrialRequest {
    pub trial_number: u32,
    pub block_type: BlockType,
    pub stimulus: String,
    pub response: String,
    pub correct: bool,
    pub reaction_time: u64,
    pub text_color: HexColor,
    pub background_color: HexColor,
    pub is_word: bool,
    pub choices: Vec<String>,
}

impl From<&TrialResult> for SubmitTrialRequest {
    fn from(result: &TrialResult) -> Self {
        Self {
            trial_number: result.trial_number,
            block_type: result.block,
            stimulus: result.stimulus.clone(),
            response: result.response.clone(),
            correct: result.correct,
            reaction_time: result.reaction_time_ms,
            text_color: result.text_color.clone(),
            background_color: result.background_color.clone(),
            is_word: result.is_word,
            choices: result.choices.clone(),
        }
    }
}

/// Entry of the final bulk submission.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveResultRequest {
    pub trial: u32,
    /// Block index, 0 to 2.
    pub block: usize,
    pub stimulus: String,
    pub response: String,
    pub correct: bool,
    pub reaction_time: u64,
    pub text_color: HexColor,
    pub background_color: HexColor,
    pub choices: Vec<String>,
}

impl From<&TrialResult> for SaveResultRequest {
    fn from(result: &TrialResult) -> Self {
        Self {
            trial: result.trial_number,
            block: result.block_index(),
            stimulus: result.stimulus.clone(),
            response: result.response.clone(),
            correct: result.correct,
            reaction_time: result.reaction_time_ms,
            text_color: result.text_color.clone(),
            background_color: result.background_color.clone(),
            choices: result.choices.clone(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SaveResultResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Error body some endpoints attach to non-2xx answers.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result() -> TrialResult {
        TrialResult {
            block: BlockType::ColoredBg,
            trial_number: 3,
            stimulus: "table".into(),
            response: "arbre".into(),
            correct: false,
            reaction_time_ms: 812,
            text_color: "#0000FF".into(),
            background_color: "#FF4444".into(),
            choices: vec!["chat".into(), "chien".into(), "table".into(), "arbre".into()],
            is_word: true,
        }
    }

    #[test]
    fn save_result_uses_camel_case_keys() {
        let body = serde_json::to_value(SaveResultRequest::from(&result())).unwrap();
        assert_eq!(
            body,
            json!({
                "trial": 3,
                "block": 2,
                "stimulus": "table",
                "response": "arbre",
                "correct": false,
                "reactionTime": 812,
                "textColor": "#0000FF",
                "backgroundColor": "#FF4444",
                "choices": ["chat", "chien", "table", "arbre"]
            })
        );
    }

    #[test]
    fn submit_trial_uses_snake_case_keys() {
        let body = serde_json::to_value(SubmitTrialRequest::from(&result())).unwrap();
        assert_eq!(body["block_type"], "colored_bg");
        assert_eq!(body["reaction_time"], 812);
        assert_eq!(body["is_word"], true);
        assert_eq!(body["trial_number"], 3);
    }

    #[test]
    fn start_request_is_an_empty_object() {
        assert_eq!(serde_json::to_string(&StartExperimentRequest {}).unwrap(), "{}");
    }

    #[test]
    fn refused_start_is_rejected() {
        let response: StartExperimentResponse =
            serde_json::from_value(json!({"success": false})).unwrap();
        assert!(matches!(
            Session::try_from(response),
            Err(ServiceError::Rejected(_))
        ));
    }

    #[test]
    fn trial_payload_needs_four_choices_including_the_stimulus() {
        let short: GetTrialResponse = serde_json::from_value(json!({
            "stimulus": "chat", "choices": ["chat", "chien"],
            "text_color": "#000000", "background_color": "#FFFFFF",
            "display_time": 50, "is_word": true
        }))
        .unwrap();
        assert!(TrialStimulusSpec::try_from(short).is_err());

        let missing: GetTrialResponse = serde_json::from_value(json!({
            "stimulus": "chat", "choices": ["lune", "chien", "table", "arbre"],
            "text_color": "#000000", "background_color": "#FFFFFF",
            "display_time": 50, "is_word": true
        }))
        .unwrap();
        assert!(TrialStimulusSpec::try_from(missing).is_err());
    }
}
