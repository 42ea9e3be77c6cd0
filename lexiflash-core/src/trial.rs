use crate::{BlockType, HexColor, TrialStimulusSpec};
use serde::{Deserialize, Serialize};

/// Identity handed out by the experiment service when a run starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub participant_id: String,
}

/// Recorded outcome of one completed trial. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub block: BlockType,
    /// Ordinal within the block, starting at 1.
    pub trial_number: u32,
    pub stimulus: String,
    pub response: String,
    pub correct: bool,
    pub reaction_time_ms: u64,
    pub text_color: HexColor,
    pub background_color: HexColor,
    pub choices: Vec<String>,
    pub is_word: bool,
}

impl TrialResult {
    /// Builds the result for choosing `choice_index` of `spec`.
    /// Returns `None` when the index does not name a presented choice.
    pub fn from_choice(
        block: BlockType,
        trial_number: u32,
        spec: &TrialStimulusSpec,
        choice_index: usize,
        reaction_time_ms: u64,
    ) -> Option<Self> {
        let response = spec.choice(choice_index)?.to_owned();
        Some(Self {
            block,
            trial_number,
            correct: spec.is_correct(&response),
            stimulus: spec.stimulus.clone(),
            response,
            reaction_time_ms,
            text_color: spec.text_color.clone(),
            background_color: spec.background_color.clone(),
            choices: spec.choices.clone(),
            is_word: spec.is_word,
        })
    }

    pub fn block_index(&self) -> usize {
        self.block.index()
    }
}
