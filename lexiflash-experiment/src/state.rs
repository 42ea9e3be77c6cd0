use crate::config::ExperimentConfig;
use crate::error::{ExperimentError, ServiceError};
use crate::report::{SubmitProgress, SubmitTally, Summary, compute_summary};
use lexiflash_core::{BlockType, Screen, Session, TrialResult, TrialStimulusSpec};
use lexiflash_timing::Timer;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Input to the sequencer: participant actions and completions of earlier effects.
#[derive(Debug, Clone, PartialEq)]
pub enum SequencerEvent {
    StartRequested,
    SessionStarted(Result<Session, ServiceError>),
    BeginBlock,
    StimulusFetched(Result<TrialStimulusSpec, ServiceError>),
    ChoiceSelected(usize),
    KeyPressed(char),
    RetryFetch,
    ContinueRequested,
    SubmitRequested,
    SubmitConfirmed,
    SubmitCancelled,
    SubmitProgress(SubmitProgress),
    SubmitFinished(SubmitTally),
    RestartRequested,
}

/// Work the sequencer asks its host to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    StartSession,
    FetchStimulus { block: BlockType, trial_number: u32 },
    /// Fire-and-forget; the outcome never feeds back into the flow.
    SubmitTrial(TrialResult),
    SubmitAll(Vec<TrialResult>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Idle,
    AwaitingConfirmation,
    InProgress(SubmitProgress),
    Finished(SubmitTally),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum State {
    Welcome {
        alert: Option<String>,
    },
    Loading,
    BlockInstructions,
    TrialPending {
        since: u64,
    },
    FixationCross {
        since: u64,
    },
    /// Fixation stays up while the stimulus is requested. `retry_at` is set
    /// between a failed attempt and the next one.
    FetchingStimulus {
        attempt: u32,
        retry_at: Option<u64>,
    },
    StimulusShown {
        spec: TrialStimulusSpec,
        since: u64,
    },
    ChoicePresented {
        spec: TrialStimulusSpec,
        since: u64,
    },
    ResponseRecorded {
        since: u64,
    },
    StimulusUnavailable {
        message: String,
    },
    BlockPause,
    Results {
        summary: Summary,
        submission: SubmissionState,
    },
}

/// Drives one participant through the three blocks.
///
/// The sequencer performs no I/O. Participant input and service completions
/// arrive through [`handle_event`](Self::handle_event); timed transitions
/// happen in [`update`](Self::update), which the host calls every frame.
/// Both return the effects the host has to run.
pub struct TrialSequencer<T>
where
    T: Timer<Timestamp = u64>,
{
    pub(crate) timer: T,
    pub(crate) config: ExperimentConfig,
    pub(crate) state: State,
    pub(crate) session: Option<Session>,
    pub(crate) block: BlockType,
    /// Ordinal of the current trial within the block, starting at 1.
    pub(crate) trial_number: u32,
    pub(crate) results: Vec<TrialResult>,
}

fn ms_to_ns(ms: u64) -> u64 {
    ms.saturating_mul(1_000_000)
}

impl<T> TrialSequencer<T>
where
    T: Timer<Timestamp = u64>,
{
    pub fn new(config: ExperimentConfig, timer: T) -> Self {
        Self {
            timer,
            config,
            state: State::Welcome { alert: None },
            session: None,
            block: BlockType::Bw,
            trial_number: 1,
            results: Vec::new(),
        }
    }

    pub fn handle_event(&mut self, event: SequencerEvent) -> Vec<Effect> {
        match event {
            SequencerEvent::StartRequested => self.start(),
            SequencerEvent::SessionStarted(outcome) => self.session_started(outcome),
            SequencerEvent::BeginBlock => self.begin_block(),
            SequencerEvent::StimulusFetched(outcome) => self.stimulus_fetched(outcome),
            SequencerEvent::ChoiceSelected(index) => self.select_choice(index),
            SequencerEvent::KeyPressed(key) => match key.to_digit(10) {
                Some(digit @ 1..=4) => self.select_choice(digit as usize - 1),
                _ => Vec::new(),
            },
            SequencerEvent::RetryFetch => self.retry_fetch(),
            SequencerEvent::ContinueRequested => self.continue_to_next_block(),
            SequencerEvent::SubmitRequested => self.request_submission(),
            SequencerEvent::SubmitConfirmed => self.confirm_submission(),
            SequencerEvent::SubmitCancelled => {
                self.set_submission(SubmissionState::AwaitingConfirmation, SubmissionState::Idle);
                Vec::new()
            }
            SequencerEvent::SubmitProgress(progress) => {
                if let Some(submission) = self.in_progress_submission() {
                    *submission = SubmissionState::InProgress(progress);
                }
                Vec::new()
            }
            SequencerEvent::SubmitFinished(tally) => {
                if let Some(submission) = self.in_progress_submission() {
                    info!(
                        succeeded = tally.succeeded,
                        failed = tally.failed,
                        "results submission complete"
                    );
                    *submission = SubmissionState::Finished(tally);
                }
                Vec::new()
            }
            SequencerEvent::RestartRequested => {
                if matches!(self.state, State::Results { .. }) {
                    self.restart();
                }
                Vec::new()
            }
        }
    }

    /// Fires the timed transition whose deadline has passed, if any.
    pub fn update(&mut self) -> Vec<Effect> {
        let now = self.timer.now();
        match self.deadline() {
            Some(deadline) if now >= deadline => self.on_deadline(now),
            _ => Vec::new(),
        }
    }

    /// Time left until the pending timed transition.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.deadline()
            .map(|deadline| Duration::from_nanos(deadline.saturating_sub(self.timer.now())))
    }

    fn deadline(&self) -> Option<u64> {
        match &self.state {
            State::TrialPending { since } => {
                Some(since.saturating_add(ms_to_ns(self.config.pre_trial_delay_ms)))
            }
            State::FixationCross { since } => {
                Some(since.saturating_add(ms_to_ns(self.config.fixation_ms)))
            }
            State::FetchingStimulus { retry_at, .. } => *retry_at,
            State::StimulusShown { spec, since } => {
                Some(since.saturating_add(ms_to_ns(spec.display_duration_ms)))
            }
            State::ResponseRecorded { since } => {
                Some(since.saturating_add(ms_to_ns(self.config.post_response_delay_ms)))
            }
            _ => None,
        }
    }

    fn on_deadline(&mut self, now: u64) -> Vec<Effect> {
        match &self.state {
            State::TrialPending { .. } => {
                debug!(trial = self.trial_number, "fixation");
                self.state = State::FixationCross { since: now };
                Vec::new()
            }
            State::FixationCross { .. } => self.request_stimulus(1),
            State::FetchingStimulus { attempt, .. } => {
                let next = attempt + 1;
                self.request_stimulus(next)
            }
            State::StimulusShown { spec, .. } => {
                let spec = spec.clone();
                debug!(trial = self.trial_number, "stimulus hidden, choices shown");
                self.state = State::ChoicePresented { spec, since: now };
                Vec::new()
            }
            State::ResponseRecorded { .. } => {
                self.trial_number += 1;
                self.enter_trial_pending()
            }
            _ => Vec::new(),
        }
    }

    fn start(&mut self) -> Vec<Effect> {
        if !matches!(self.state, State::Welcome { .. }) {
            return Vec::new();
        }
        self.state = State::Loading;
        vec![Effect::StartSession]
    }

    fn session_started(&mut self, outcome: Result<Session, ServiceError>) -> Vec<Effect> {
        if !matches!(self.state, State::Loading) {
            debug!("ignoring session completion outside of loading");
            return Vec::new();
        }
        match outcome {
            Ok(session) => {
                info!(
                    session_id = %session.session_id,
                    participant_id = %session.participant_id,
                    "session started"
                );
                self.session = Some(session);
                self.block = BlockType::Bw;
                self.trial_number = 1;
                self.results.clear();
                self.state = State::BlockInstructions;
            }
            Err(source) => {
                let err = ExperimentError::SessionStart(source);
                error!(error = %err, "session start failed");
                self.state = State::Welcome {
                    alert: Some(err.to_string()),
                };
            }
        }
        Vec::new()
    }

    fn begin_block(&mut self) -> Vec<Effect> {
        if !matches!(self.state, State::BlockInstructions) {
            return Vec::new();
        }
        info!(block = %self.block, "block started");
        self.trial_number = 1;
        self.enter_trial_pending()
    }

    /// Starts the current trial, or closes the block once it has run all of its trials.
    fn enter_trial_pending(&mut self) -> Vec<Effect> {
        if self.trial_number > self.config.trials_per_block {
            info!(block = %self.block, "block finished");
            self.state = match self.block.next() {
                Some(_) => State::BlockPause,
                None => {
                    let summary = compute_summary(&self.results);
                    info!(
                        trials = summary.total,
                        correct = summary.correct,
                        "experiment finished"
                    );
                    State::Results {
                        summary,
                        submission: SubmissionState::Idle,
                    }
                }
            };
        } else {
            debug!(block = %self.block, trial = self.trial_number, "trial pending");
            self.state = State::TrialPending {
                since: self.timer.now(),
            };
        }
        Vec::new()
    }

    fn request_stimulus(&mut self, attempt: u32) -> Vec<Effect> {
        debug!(
            block = %self.block,
            trial = self.trial_number,
            attempt,
            "requesting stimulus"
        );
        self.state = State::FetchingStimulus {
            attempt,
            retry_at: None,
        };
        vec![Effect::FetchStimulus {
            block: self.block,
            trial_number: self.trial_number,
        }]
    }

    fn stimulus_fetched(&mut self, outcome: Result<TrialStimulusSpec, ServiceError>) -> Vec<Effect> {
        let attempt = match self.state {
            State::FetchingStimulus {
                attempt,
                retry_at: None,
            } => attempt,
            _ => {
                debug!("ignoring stimulus with no request outstanding");
                return Vec::new();
            }
        };
        match outcome {
            Ok(spec) => {
                debug!(
                    trial = self.trial_number,
                    duration_ms = spec.display_duration_ms,
                    background = %spec.background_color,
                    "stimulus shown"
                );
                self.state = State::StimulusShown {
                    spec,
                    since: self.timer.now(),
                };
            }
            Err(source) => {
                let err = ExperimentError::StimulusFetch {
                    block: self.block,
                    trial_number: self.trial_number,
                    source,
                };
                warn!(error = %err, attempt, "stimulus fetch failed");
                self.state = if attempt < self.config.max_fetch_attempts {
                    State::FetchingStimulus {
                        attempt,
                        retry_at: Some(
                            self.timer
                                .now()
                                .saturating_add(ms_to_ns(self.config.fetch_retry_delay_ms)),
                        ),
                    }
                } else {
                    State::StimulusUnavailable {
                        message: err.to_string(),
                    }
                };
            }
        }
        Vec::new()
    }

    fn retry_fetch(&mut self) -> Vec<Effect> {
        if !matches!(self.state, State::StimulusUnavailable { .. }) {
            return Vec::new();
        }
        self.request_stimulus(1)
    }

    fn select_choice(&mut self, index: usize) -> Vec<Effect> {
        let State::ChoicePresented { spec, since } = &self.state else {
            return Vec::new();
        };
        let reaction_time_ms = self.timer.elapsed(*since).as_millis() as u64;
        let Some(result) =
            TrialResult::from_choice(self.block, self.trial_number, spec, index, reaction_time_ms)
        else {
            return Vec::new();
        };
        debug!(
            trial = result.trial_number,
            correct = result.correct,
            reaction_time_ms,
            "response recorded"
        );
        self.results.push(result.clone());
        self.state = State::ResponseRecorded {
            since: self.timer.now(),
        };
        vec![Effect::SubmitTrial(result)]
    }

    fn continue_to_next_block(&mut self) -> Vec<Effect> {
        if !matches!(self.state, State::BlockPause) {
            return Vec::new();
        }
        if let Some(next) = self.block.next() {
            self.block = next;
            self.trial_number = 1;
            self.state = State::BlockInstructions;
        }
        Vec::new()
    }

    fn request_submission(&mut self) -> Vec<Effect> {
        if let Some(submission) = self.submission_mut() {
            if matches!(
                submission,
                SubmissionState::Idle | SubmissionState::Finished(_)
            ) {
                *submission = SubmissionState::AwaitingConfirmation;
            }
        }
        Vec::new()
    }

    fn confirm_submission(&mut self) -> Vec<Effect> {
        let total = self.results.len();
        if self.set_submission(
            SubmissionState::AwaitingConfirmation,
            SubmissionState::InProgress(SubmitProgress::started(total)),
        ) {
            info!(total, "submitting results");
            vec![Effect::SubmitAll(self.results.clone())]
        } else {
            Vec::new()
        }
    }

    fn submission_mut(&mut self) -> Option<&mut SubmissionState> {
        match &mut self.state {
            State::Results { submission, .. } => Some(submission),
            _ => None,
        }
    }

    fn in_progress_submission(&mut self) -> Option<&mut SubmissionState> {
        self.submission_mut()
            .filter(|submission| matches!(submission, SubmissionState::InProgress(_)))
    }

    fn set_submission(&mut self, from: SubmissionState, to: SubmissionState) -> bool {
        match self.submission_mut() {
            Some(submission) if *submission == from => {
                *submission = to;
                true
            }
            _ => false,
        }
    }

    fn restart(&mut self) {
        info!("restarting");
        self.session = None;
        self.block = BlockType::Bw;
        self.trial_number = 1;
        self.results.clear();
        self.state = State::Welcome { alert: None };
    }

    pub fn screen(&self) -> Screen {
        match self.state {
            State::Welcome { .. } => Screen::Welcome,
            State::Loading => Screen::Loading,
            State::BlockInstructions => Screen::BlockInstructions,
            State::TrialPending { .. } => Screen::TrialPending,
            State::FixationCross { .. } | State::FetchingStimulus { .. } => Screen::FixationCross,
            State::StimulusShown { .. } => Screen::StimulusShown,
            State::ChoicePresented { .. } => Screen::ChoicePresented,
            State::ResponseRecorded { .. } => Screen::ResponseRecorded,
            State::StimulusUnavailable { .. } => Screen::StimulusUnavailable,
            State::BlockPause => Screen::BlockPause,
            State::Results { .. } => Screen::Results,
        }
    }

    pub fn block(&self) -> BlockType {
        self.block
    }

    pub fn trial_number(&self) -> u32 {
        self.trial_number
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Results recorded so far, in presentation order.
    pub fn results(&self) -> &[TrialResult] {
        &self.results
    }

    pub fn summary(&self) -> Option<&Summary> {
        match &self.state {
            State::Results { summary, .. } => Some(summary),
            _ => None,
        }
    }

    pub fn submission(&self) -> Option<SubmissionState> {
        match &self.state {
            State::Results { submission, .. } => Some(*submission),
            _ => None,
        }
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut T {
        &mut self.timer
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lexiflash_core::HexColor;
    use lexiflash_timing::ManualTimer;

    pub(crate) fn spec(stimulus: &str, background: &str, display_ms: u64) -> TrialStimulusSpec {
        TrialStimulusSpec {
            stimulus: stimulus.into(),
            choices: vec![
                "chat".into(),
                "chien".into(),
                "table".into(),
                "arbre".into(),
            ],
            text_color: HexColor::new("#0000FF"),
            background_color: HexColor::new(background),
            display_duration_ms: display_ms,
            is_word: true,
        }
    }

    pub(crate) fn session() -> Session {
        Session {
            session_id: "s-1".into(),
            participant_id: "P-1234".into(),
        }
    }

    pub(crate) fn started(config: ExperimentConfig) -> (TrialSequencer<ManualTimer>, ManualTimer) {
        let timer = ManualTimer::new();
        let mut seq = TrialSequencer::new(config, timer.clone());
        assert_eq!(
            seq.handle_event(SequencerEvent::StartRequested),
            vec![Effect::StartSession]
        );
        seq.handle_event(SequencerEvent::SessionStarted(Ok(session())));
        (seq, timer)
    }

    /// Runs from trial pending up to the outstanding stimulus request.
    pub(crate) fn run_to_fetch(seq: &mut TrialSequencer<ManualTimer>, timer: &ManualTimer) {
        assert_eq!(seq.screen(), Screen::TrialPending);
        timer.advance_ms(1500);
        assert!(seq.update().is_empty());
        assert_eq!(seq.screen(), Screen::FixationCross);
        timer.advance_ms(1000);
        assert_eq!(
            seq.update(),
            vec![Effect::FetchStimulus {
                block: seq.block(),
                trial_number: seq.trial_number(),
            }]
        );
    }

    pub(crate) fn complete_trial(
        seq: &mut TrialSequencer<ManualTimer>,
        timer: &ManualTimer,
        choice: usize,
    ) {
        run_to_fetch(seq, timer);
        seq.handle_event(SequencerEvent::StimulusFetched(Ok(spec("table", "#FFFFFF", 50))));
        timer.advance_ms(50);
        seq.update();
        assert_eq!(seq.screen(), Screen::ChoicePresented);
        assert_eq!(seq.handle_event(SequencerEvent::ChoiceSelected(choice)).len(), 1);
        timer.advance_ms(500);
        seq.update();
    }

    fn short_blocks() -> ExperimentConfig {
        ExperimentConfig {
            trials_per_block: 2,
            ..ExperimentConfig::default()
        }
    }

    #[test]
    fn oversized_display_time_keeps_the_stimulus_up() {
        let (mut seq, timer) = started(ExperimentConfig::default());
        seq.handle_event(SequencerEvent::BeginBlock);
        run_to_fetch(&mut seq, &timer);
        seq.handle_event(SequencerEvent::StimulusFetched(Ok(spec(
            "table",
            "#FF0000",
            u64::MAX / 1000,
        ))));
        assert_eq!(seq.screen(), Screen::StimulusShown);
        assert!(seq.next_deadline().is_some_and(|d| !d.is_zero()));

        timer.advance_ms(60_000);
        assert!(seq.update().is_empty());
        assert_eq!(seq.screen(), Screen::StimulusShown);
        assert_eq!(seq.display().background.as_str(), "#FF0000");
    }

    #[test]
    fn start_waits_for_the_session() {
        let timer = ManualTimer::new();
        let mut seq = TrialSequencer::new(ExperimentConfig::default(), timer);
        assert_eq!(seq.screen(), Screen::Welcome);
        assert_eq!(
            seq.handle_event(SequencerEvent::StartRequested),
            vec![Effect::StartSession]
        );
        assert_eq!(seq.screen(), Screen::Loading);
        assert!(seq.handle_event(SequencerEvent::StartRequested).is_empty());

        seq.handle_event(SequencerEvent::SessionStarted(Ok(session())));
        assert_eq!(seq.screen(), Screen::BlockInstructions);
        assert_eq!(seq.block(), BlockType::Bw);
        assert_eq!(seq.session().unwrap().participant_id, "P-1234");
    }

    #[test]
    fn failed_session_start_returns_to_welcome_with_alert() {
        let timer = ManualTimer::new();
        let mut seq = TrialSequencer::new(ExperimentConfig::default(), timer);
        seq.handle_event(SequencerEvent::StartRequested);
        seq.handle_event(SequencerEvent::SessionStarted(Err(ServiceError::Rejected(
            "server busy".into(),
        ))));
        assert_eq!(seq.screen(), Screen::Welcome);
        assert!(seq.session().is_none());
        match &seq.state {
            State::Welcome { alert: Some(alert) } => assert!(alert.contains("server busy")),
            other => panic!("unexpected state {other:?}"),
        }
        // A second attempt is possible.
        assert_eq!(
            seq.handle_event(SequencerEvent::StartRequested),
            vec![Effect::StartSession]
        );
    }

    #[test]
    fn trial_phases_follow_their_delays() {
        let (mut seq, timer) = started(ExperimentConfig::default());
        seq.handle_event(SequencerEvent::BeginBlock);
        assert_eq!(seq.screen(), Screen::TrialPending);
        assert_eq!(seq.next_deadline(), Some(Duration::from_millis(1500)));

        timer.advance_ms(1499);
        assert!(seq.update().is_empty());
        assert_eq!(seq.screen(), Screen::TrialPending);
        timer.advance_ms(1);
        seq.update();
        assert_eq!(seq.screen(), Screen::FixationCross);

        timer.advance_ms(999);
        assert!(seq.update().is_empty());
        timer.advance_ms(1);
        assert_eq!(
            seq.update(),
            vec![Effect::FetchStimulus {
                block: BlockType::Bw,
                trial_number: 1
            }]
        );
        // Fixation stays up while the request is outstanding.
        assert_eq!(seq.screen(), Screen::FixationCross);
        assert_eq!(seq.next_deadline(), None);

        seq.handle_event(SequencerEvent::StimulusFetched(Ok(spec("table", "#FFFFFF", 50))));
        assert_eq!(seq.screen(), Screen::StimulusShown);
        timer.advance_ms(20);
        assert_eq!(seq.next_deadline(), Some(Duration::from_millis(30)));
        timer.advance_ms(30);
        seq.update();
        assert_eq!(seq.screen(), Screen::ChoicePresented);
    }

    #[test]
    fn colored_background_only_inside_stimulus_window() {
        let (mut seq, timer) = started(ExperimentConfig::default());
        let white = HexColor::white();
        assert_eq!(seq.display().background, white);

        seq.handle_event(SequencerEvent::BeginBlock);
        assert_eq!(seq.display().background, white);
        run_to_fetch(&mut seq, &timer);
        assert_eq!(seq.display().background, white);

        seq.handle_event(SequencerEvent::StimulusFetched(Ok(spec("table", "#FF0000", 50))));
        assert_eq!(seq.display().background.as_str(), "#FF0000");
        timer.advance_ms(49);
        seq.update();
        assert_eq!(seq.display().background.as_str(), "#FF0000");

        timer.advance_ms(1);
        seq.update();
        assert_eq!(seq.screen(), Screen::ChoicePresented);
        assert_eq!(seq.display().background, white);

        seq.handle_event(SequencerEvent::ChoiceSelected(0));
        assert_eq!(seq.display().background, white);
    }

    #[test]
    fn sentinel_background_keeps_the_page_white() {
        let (mut seq, timer) = started(ExperimentConfig::default());
        seq.handle_event(SequencerEvent::BeginBlock);
        run_to_fetch(&mut seq, &timer);
        seq.handle_event(SequencerEvent::StimulusFetched(Ok(spec("table", "#FFFFFF", 50))));
        assert_eq!(seq.screen(), Screen::StimulusShown);
        assert_eq!(seq.display().background, HexColor::white());
    }

    #[test]
    fn choice_keys_only_count_while_choices_are_shown() {
        let (mut seq, timer) = started(ExperimentConfig::default());
        assert!(seq.handle_event(SequencerEvent::KeyPressed('1')).is_empty());
        seq.handle_event(SequencerEvent::BeginBlock);
        assert!(seq.handle_event(SequencerEvent::KeyPressed('2')).is_empty());
        run_to_fetch(&mut seq, &timer);
        assert!(seq.handle_event(SequencerEvent::ChoiceSelected(0)).is_empty());
        seq.handle_event(SequencerEvent::StimulusFetched(Ok(spec("table", "#FFFFFF", 50))));
        assert!(seq.handle_event(SequencerEvent::KeyPressed('3')).is_empty());
        assert!(seq.results().is_empty());

        timer.advance_ms(50);
        seq.update();
        assert!(seq.handle_event(SequencerEvent::KeyPressed('5')).is_empty());
        assert!(seq.handle_event(SequencerEvent::KeyPressed('x')).is_empty());
        timer.advance_ms(432);
        let effects = seq.handle_event(SequencerEvent::KeyPressed('3'));

        let result = &seq.results()[0];
        assert_eq!(effects, vec![Effect::SubmitTrial(result.clone())]);
        assert_eq!(result.response, "table");
        assert!(result.correct);
        assert_eq!(result.reaction_time_ms, 432);
        assert_eq!((result.block, result.trial_number), (BlockType::Bw, 1));
    }

    #[test]
    fn response_is_recorded_once() {
        let (mut seq, timer) = started(ExperimentConfig::default());
        seq.handle_event(SequencerEvent::BeginBlock);
        run_to_fetch(&mut seq, &timer);
        seq.handle_event(SequencerEvent::StimulusFetched(Ok(spec("table", "#FFFFFF", 50))));
        timer.advance_ms(50);
        seq.update();

        assert!(seq.handle_event(SequencerEvent::ChoiceSelected(7)).is_empty());
        assert_eq!(seq.handle_event(SequencerEvent::ChoiceSelected(1)).len(), 1);
        assert!(seq.handle_event(SequencerEvent::ChoiceSelected(2)).is_empty());
        assert!(seq.handle_event(SequencerEvent::KeyPressed('3')).is_empty());
        assert_eq!(seq.results().len(), 1);
        assert!(!seq.results()[0].correct);
        assert_eq!(seq.screen(), Screen::ResponseRecorded);

        timer.advance_ms(499);
        seq.update();
        assert_eq!(seq.screen(), Screen::ResponseRecorded);
        timer.advance_ms(1);
        seq.update();
        assert_eq!(seq.screen(), Screen::TrialPending);
        assert_eq!(seq.trial_number(), 2);
    }

    #[test]
    fn blocks_run_their_trial_count_then_pause() {
        let (mut seq, timer) = started(short_blocks());
        seq.handle_event(SequencerEvent::BeginBlock);
        complete_trial(&mut seq, &timer, 2);
        assert_eq!(seq.screen(), Screen::TrialPending);
        complete_trial(&mut seq, &timer, 2);
        assert_eq!(seq.screen(), Screen::BlockPause);
        assert_eq!(seq.results().len(), 2);
        assert_eq!(seq.next_deadline(), None);

        // Begin does nothing until the participant continues.
        assert!(seq.handle_event(SequencerEvent::BeginBlock).is_empty());
        assert_eq!(seq.screen(), Screen::BlockPause);

        seq.handle_event(SequencerEvent::ContinueRequested);
        assert_eq!(seq.screen(), Screen::BlockInstructions);
        assert_eq!(seq.block(), BlockType::Color);
        seq.handle_event(SequencerEvent::BeginBlock);
        assert_eq!(seq.trial_number(), 1);
        run_to_fetch(&mut seq, &timer);
    }

    #[test]
    fn last_block_ends_in_results_and_restart_clears_everything() {
        let (mut seq, timer) = started(short_blocks());
        for block in BlockType::ALL {
            assert_eq!(seq.block(), block);
            seq.handle_event(SequencerEvent::BeginBlock);
            complete_trial(&mut seq, &timer, 2);
            complete_trial(&mut seq, &timer, 0);
            seq.handle_event(SequencerEvent::ContinueRequested);
        }
        assert_eq!(seq.screen(), Screen::Results);
        let summary = seq.summary().unwrap();
        assert_eq!((summary.correct, summary.total), (3, 6));
        assert_eq!(summary.accuracy, Some(50.0));

        let ordinals: Vec<(BlockType, u32)> = seq
            .results()
            .iter()
            .map(|r| (r.block, r.trial_number))
            .collect();
        assert_eq!(
            ordinals,
            vec![
                (BlockType::Bw, 1),
                (BlockType::Bw, 2),
                (BlockType::Color, 1),
                (BlockType::Color, 2),
                (BlockType::ColoredBg, 1),
                (BlockType::ColoredBg, 2),
            ]
        );

        seq.handle_event(SequencerEvent::RestartRequested);
        assert_eq!(seq.screen(), Screen::Welcome);
        assert!(seq.results().is_empty());
        assert!(seq.session().is_none());
        assert_eq!(seq.block(), BlockType::Bw);
    }

    #[test]
    fn failed_fetch_retries_then_waits_for_the_participant() {
        let (mut seq, timer) = started(ExperimentConfig::default());
        seq.handle_event(SequencerEvent::BeginBlock);
        run_to_fetch(&mut seq, &timer);
        let refetch = vec![Effect::FetchStimulus {
            block: BlockType::Bw,
            trial_number: 1,
        }];
        let failure = || {
            SequencerEvent::StimulusFetched(Err(ServiceError::Transport("timed out".into())))
        };

        for _ in 1..3 {
            assert!(seq.handle_event(failure()).is_empty());
            assert_eq!(seq.screen(), Screen::FixationCross);
            assert_eq!(seq.next_deadline(), Some(Duration::from_millis(1000)));
            timer.advance_ms(1000);
            assert_eq!(seq.update(), refetch);
        }
        seq.handle_event(failure());
        assert_eq!(seq.screen(), Screen::StimulusUnavailable);
        assert_eq!(seq.next_deadline(), None);
        timer.advance_ms(10_000);
        assert!(seq.update().is_empty());

        assert_eq!(seq.handle_event(SequencerEvent::RetryFetch), refetch);
        seq.handle_event(SequencerEvent::StimulusFetched(Ok(spec("table", "#FFFFFF", 50))));
        assert_eq!(seq.screen(), Screen::StimulusShown);
        assert_eq!(seq.trial_number(), 1);
        assert!(seq.results().is_empty());
    }

    #[test]
    fn stale_completions_are_ignored() {
        let (mut seq, timer) = started(ExperimentConfig::default());
        seq.handle_event(SequencerEvent::StimulusFetched(Ok(spec("table", "#FF0000", 50))));
        assert_eq!(seq.screen(), Screen::BlockInstructions);
        seq.handle_event(SequencerEvent::SessionStarted(Err(ServiceError::Rejected(
            "late".into(),
        ))));
        assert_eq!(seq.screen(), Screen::BlockInstructions);
        assert!(seq.session().is_some());

        seq.handle_event(SequencerEvent::BeginBlock);
        run_to_fetch(&mut seq, &timer);
        seq.handle_event(SequencerEvent::StimulusFetched(Err(ServiceError::Transport(
            "reset".into(),
        ))));
        // Waiting to retry: a late answer to the failed request does not count.
        seq.handle_event(SequencerEvent::StimulusFetched(Ok(spec("table", "#FF0000", 50))));
        assert_eq!(seq.screen(), Screen::FixationCross);
    }

    #[test]
    fn bulk_submission_needs_confirmation() {
        let (mut seq, timer) = started(ExperimentConfig {
            trials_per_block: 1,
            ..ExperimentConfig::default()
        });
        for _ in BlockType::ALL {
            seq.handle_event(SequencerEvent::BeginBlock);
            complete_trial(&mut seq, &timer, 2);
            seq.handle_event(SequencerEvent::ContinueRequested);
        }
        assert_eq!(seq.submission(), Some(SubmissionState::Idle));
        assert!(seq.handle_event(SequencerEvent::SubmitConfirmed).is_empty());

        seq.handle_event(SequencerEvent::SubmitRequested);
        assert_eq!(seq.submission(), Some(SubmissionState::AwaitingConfirmation));
        seq.handle_event(SequencerEvent::SubmitCancelled);
        assert_eq!(seq.submission(), Some(SubmissionState::Idle));

        seq.handle_event(SequencerEvent::SubmitRequested);
        let effects = seq.handle_event(SequencerEvent::SubmitConfirmed);
        assert_eq!(effects, vec![Effect::SubmitAll(seq.results().to_vec())]);
        assert!(seq.handle_event(SequencerEvent::SubmitRequested).is_empty());

        let progress = SubmitProgress {
            attempted: 2,
            succeeded: 1,
            total: 3,
            percent: 67,
        };
        seq.handle_event(SequencerEvent::SubmitProgress(progress));
        assert_eq!(seq.submission(), Some(SubmissionState::InProgress(progress)));

        let tally = SubmitTally {
            succeeded: 2,
            failed: 1,
            total: 3,
        };
        seq.handle_event(SequencerEvent::SubmitFinished(tally));
        assert_eq!(seq.submission(), Some(SubmissionState::Finished(tally)));

        // Resubmitting is allowed once the previous run finished.
        seq.handle_event(SequencerEvent::SubmitRequested);
        assert_eq!(seq.submission(), Some(SubmissionState::AwaitingConfirmation));
    }
}
