use crate::error::ExperimentError;
use crate::report::submit_all;
use crate::service::{ResultsSink, TrialDataService};
use crate::state::{Effect, SequencerEvent};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{debug, warn};

/// Runs sequencer effects on a tokio runtime. Completions come back as
/// events on the receiver returned by [`EffectRunner::new`].
#[derive(Clone)]
pub struct EffectRunner {
    handle: Handle,
    trials: Arc<dyn TrialDataService>,
    sink: Arc<dyn ResultsSink>,
    events: UnboundedSender<SequencerEvent>,
}

impl EffectRunner {
    pub fn new(
        handle: Handle,
        trials: Arc<dyn TrialDataService>,
        sink: Arc<dyn ResultsSink>,
    ) -> (Self, UnboundedReceiver<SequencerEvent>) {
        let (events, rx) = unbounded_channel();
        (
            Self {
                handle,
                trials,
                sink,
                events,
            },
            rx,
        )
    }

    pub fn dispatch_all(&self, effects: impl IntoIterator<Item = Effect>) {
        for effect in effects {
            self.dispatch(effect);
        }
    }

    pub fn dispatch(&self, effect: Effect) {
        let events = self.events.clone();
        match effect {
            Effect::StartSession => {
                let trials = Arc::clone(&self.trials);
                self.handle.spawn(async move {
                    let outcome = trials.start_session().await;
                    send(&events, SequencerEvent::SessionStarted(outcome));
                });
            }
            Effect::FetchStimulus {
                block,
                trial_number,
            } => {
                let trials = Arc::clone(&self.trials);
                self.handle.spawn(async move {
                    let outcome = trials.get_trial(block, trial_number).await;
                    send(&events, SequencerEvent::StimulusFetched(outcome));
                });
            }
            Effect::SubmitTrial(result) => {
                let sink = Arc::clone(&self.sink);
                self.handle.spawn(async move {
                    if let Err(source) = sink.submit_trial(&result).await {
                        let err = ExperimentError::SubmitTrial(source);
                        warn!(
                            error = %err,
                            block = %result.block,
                            trial = result.trial_number,
                            "trial submission dropped"
                        );
                    }
                });
            }
            Effect::SubmitAll(results) => {
                let sink = Arc::clone(&self.sink);
                self.handle.spawn(async move {
                    let tally = submit_all(sink.as_ref(), &results, |progress| {
                        send(&events, SequencerEvent::SubmitProgress(progress));
                    })
                    .await;
                    send(&events, SequencerEvent::SubmitFinished(tally));
                });
            }
        }
    }
}

fn send(events: &UnboundedSender<SequencerEvent>, event: SequencerEvent) {
    if events.send(event).is_err() {
        debug!("event receiver closed, completion dropped");
    }
}
