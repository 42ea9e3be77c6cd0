/// Screen the participant is currently looking at.
#[derive(Copy, Debug, Clone, PartialEq, Eq)]
pub enum Screen {
    Welcome,
    Loading,
    BlockInstructions,
    TrialPending,
    FixationCross,
    StimulusShown,
    ChoicePresented,
    ResponseRecorded,
    StimulusUnavailable,
    BlockPause,
    Results,
}

impl Screen {
    /// Choice buttons and the 1-4 keys are live only here.
    pub fn allows_choice(&self) -> bool {
        matches!(self, Self::ChoicePresented)
    }

    /// The only screen on which the page background may be anything but white.
    pub fn allows_colored_background(&self) -> bool {
        matches!(self, Self::StimulusShown)
    }
}
