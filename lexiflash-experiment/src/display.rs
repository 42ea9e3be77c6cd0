use crate::state::{State, SubmissionState, TrialSequencer};
use lexiflash_core::{BlockType, HexColor, Screen, TrialStimulusSpec};
use lexiflash_timing::Timer;

/// Colours painted on the answer buttons of the colour blocks. They have no
/// relation to the colour the stimulus was shown in.
pub const DISTRACTOR_PALETTE: [&str; 6] = [
    "#FF0000", "#00C800", "#0000FF", "#8B00FF", "#FF6600", "#FF00FF",
];

/// Everything the renderer needs to draw one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayState {
    pub screen: Screen,
    pub background: HexColor,
    pub container: ContainerStyle,
    pub body: DisplayBody,
}

/// Decoration of the central panel.
#[derive(Debug, Clone, PartialEq)]
pub enum ContainerStyle {
    /// White panel with an outline.
    Opaque,
    Transparent,
    /// Same colour as the page during a coloured stimulus flash.
    Tinted(HexColor),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StimulusView {
    pub text: String,
    pub color: HexColor,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceButton {
    pub label: String,
    pub text_color: HexColor,
    pub border_color: Option<HexColor>,
    /// Semi-transparent white fill instead of the plain button face.
    pub translucent: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DisplayBody {
    Welcome {
        alert: Option<String>,
    },
    Loading,
    Instructions {
        title: &'static str,
        description: &'static str,
        participant_id: Option<String>,
    },
    Trial {
        counter: Option<String>,
        fixation: bool,
        stimulus: Option<StimulusView>,
    },
    Choices {
        buttons: Vec<ChoiceButton>,
    },
    Unavailable {
        message: String,
    },
    Pause {
        title: &'static str,
        message: &'static str,
    },
    Results {
        lines: Vec<String>,
        submission: SubmissionState,
        status: String,
    },
}

impl DisplayBody {
    fn blank_trial() -> Self {
        DisplayBody::Trial {
            counter: None,
            fixation: false,
            stimulus: None,
        }
    }
}

pub fn choice_buttons(block: BlockType, spec: &TrialStimulusSpec) -> Vec<ChoiceButton> {
    spec.choices
        .iter()
        .enumerate()
        .map(|(i, choice)| {
            let distractor = HexColor::new(DISTRACTOR_PALETTE[i % DISTRACTOR_PALETTE.len()]);
            ChoiceButton {
                label: format!("{}. {choice}", i + 1),
                text_color: if block.colors_choices() {
                    distractor.clone()
                } else {
                    HexColor::black()
                },
                border_color: block.borders_choices().then_some(distractor),
                translucent: block.borders_choices(),
            }
        })
        .collect()
}

pub fn submission_status(submission: SubmissionState, result_count: usize) -> String {
    match submission {
        SubmissionState::Idle => "Press S to save your results, R to start over.".to_owned(),
        SubmissionState::AwaitingConfirmation => {
            format!("Save all {result_count} results now? Y to confirm, N to cancel.")
        }
        SubmissionState::InProgress(progress) => format!("Saving... {}%", progress.percent),
        SubmissionState::Finished(tally) if tally.failed == 0 => {
            format!("{}/{} results saved.", tally.succeeded, tally.total)
        }
        SubmissionState::Finished(tally) => format!(
            "{}/{} results saved, {} failed. Press S to try again.",
            tally.succeeded, tally.total, tally.failed
        ),
    }
}

impl<T> TrialSequencer<T>
where
    T: Timer<Timestamp = u64>,
{
    /// Declarative view of the current state.
    pub fn display(&self) -> DisplayState {
        let screen = self.screen();
        let flash_background = self
            .current_spec()
            .filter(|spec| screen.allows_colored_background() && spec.has_colored_background())
            .map(|spec| spec.background_color.clone());
        let mut container = ContainerStyle::Opaque;

        let body = match &self.state {
            State::Welcome { alert } => DisplayBody::Welcome {
                alert: alert.clone(),
            },
            State::Loading => DisplayBody::Loading,
            State::BlockInstructions => DisplayBody::Instructions {
                title: self.block.title(),
                description: self.block.description(),
                participant_id: self.session.as_ref().map(|s| s.participant_id.clone()),
            },
            State::TrialPending { .. } => {
                container = ContainerStyle::Transparent;
                DisplayBody::Trial {
                    counter: Some(format!(
                        "Trial {}/{}",
                        self.trial_number, self.config.trials_per_block
                    )),
                    fixation: false,
                    stimulus: None,
                }
            }
            State::FixationCross { .. } | State::FetchingStimulus { .. } => {
                container = ContainerStyle::Transparent;
                DisplayBody::Trial {
                    counter: None,
                    fixation: true,
                    stimulus: None,
                }
            }
            State::StimulusShown { spec, .. } => {
                container = match &flash_background {
                    Some(tint) => ContainerStyle::Tinted(tint.clone()),
                    None => ContainerStyle::Transparent,
                };
                DisplayBody::Trial {
                    counter: None,
                    fixation: false,
                    stimulus: Some(StimulusView {
                        text: spec.stimulus.clone(),
                        color: spec.text_color.clone(),
                    }),
                }
            }
            State::ChoicePresented { spec, .. } => DisplayBody::Choices {
                buttons: choice_buttons(self.block, spec),
            },
            State::ResponseRecorded { .. } => {
                container = ContainerStyle::Transparent;
                DisplayBody::blank_trial()
            }
            State::StimulusUnavailable { message } => DisplayBody::Unavailable {
                message: message.clone(),
            },
            State::BlockPause => {
                let (title, message) = self.block.pause_copy().unwrap_or_default();
                DisplayBody::Pause { title, message }
            }
            State::Results {
                summary,
                submission,
            } => DisplayBody::Results {
                lines: summary.report_lines(),
                submission: *submission,
                status: submission_status(*submission, self.results.len()),
            },
        };

        DisplayState {
            screen,
            background: flash_background.unwrap_or_else(HexColor::white),
            container,
            body,
        }
    }

    fn current_spec(&self) -> Option<&TrialStimulusSpec> {
        match &self.state {
            State::StimulusShown { spec, .. } | State::ChoicePresented { spec, .. } => Some(spec),
            _ => None,
        }
    }
}
