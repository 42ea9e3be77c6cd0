use crate::color::HexColor;
use serde::{Deserialize, Serialize};

/// Number of candidate answers offered per trial.
pub const CHOICE_COUNT: usize = 4;

/// Stimulus description returned by the trial service. Consumed by exactly one trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialStimulusSpec {
    pub stimulus: String,
    pub choices: Vec<String>,
    pub text_color: HexColor,
    pub background_color: HexColor,
    pub display_duration_ms: u64,
    pub is_word: bool,
}

impl TrialStimulusSpec {
    pub fn choice(&self, index: usize) -> Option<&str> {
        self.choices.get(index).map(String::as_str)
    }

    /// Exact, case-sensitive match against the flashed stimulus.
    pub fn is_correct(&self, response: &str) -> bool {
        response == self.stimulus
    }

    pub fn has_colored_background(&self) -> bool {
        !self.background_color.is_no_background()
    }
}
