//! In-process stand-ins for the experiment service, used when no server is
//! reachable. Stimuli follow the same rules as the hosted service; results are
//! appended to a JSON-lines file.

use crate::error::ServiceError;
use crate::service::{ResultsSink, TrialDataService};
use async_trait::async_trait;
use lexiflash_core::{BlockType, CHOICE_COUNT, HexColor, Session, TrialResult, TrialStimulusSpec};
use rand::rngs::StdRng;
use rand::seq::{IndexedRandom, SliceRandom};
use rand::SeedableRng;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

pub const DISPLAY_TIME_MS: u64 = 50;

pub const REAL_WORDS: [&str; 24] = [
    "chien", "chat", "maison", "voiture", "pomme", "livre", "plage", "arbre", "soleil", "lune",
    "fleur", "oiseau", "poisson", "montagne", "rivière", "forêt", "table", "chaise", "fenêtre",
    "porte", "jardin", "école", "hôpital", "magasin",
];

pub const NON_WORDS: [&str; 24] = [
    "blixor", "frunez", "glopek", "tralux", "vokrim", "zephiq", "quilmex", "braxon", "flumig",
    "krenov", "doltex", "prixel", "vextor", "glumix", "tronez", "blefox", "krimol", "floxen",
    "vraliq", "gextom", "pluvex", "drixel", "blomek", "kraxon",
];

/// Text colours: red, green, blue, violet, orange.
pub const TEXT_COLORS: [&str; 5] = ["#FF0000", "#00C800", "#0000FF", "#8B00FF", "#FF6600"];

pub const BACKGROUND_COLORS: [&str; 7] = [
    "#FF4444", "#44FF44", "#4444FF", "#FF44FF", "#44FFFF", "#FF8800", "#8844FF",
];

/// Words evoking red, green, blue, violet and orange, in that order.
pub const COLOR_ASSOCIATED_WORDS: [&[&str]; 5] = [
    &["sang", "tomate", "rose", "cerise", "feu"],
    &["herbe", "salade", "forêt", "nature", "pomme"],
    &["ciel", "mer", "océan", "bleuet", "saphir"],
    &["lavande", "prune", "aubergine", "lilas", "améthyste"],
    &["carotte", "citrouille", "abricot", "mandarine", "flamme"],
];

/// Text colours closer than this to the background are not used.
const MIN_COLOR_DISTANCE: f64 = 100.0;

/// Local trial generator and results store behind the service traits.
pub struct OfflineExperiment {
    rng: Mutex<StdRng>,
    session: Mutex<Option<Session>>,
    results_path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl OfflineExperiment {
    pub fn new(results_path: impl Into<PathBuf>) -> Self {
        Self::with_rng(StdRng::from_os_rng(), results_path)
    }

    pub fn seeded(seed: u64, results_path: impl Into<PathBuf>) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed), results_path)
    }

    fn with_rng(rng: StdRng, results_path: impl Into<PathBuf>) -> Self {
        Self {
            rng: Mutex::new(rng),
            session: Mutex::new(None),
            results_path: results_path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn generate(&self, block: BlockType) -> TrialStimulusSpec {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        generate_trial(&mut *rng, block)
    }

    fn current_session(&self) -> Option<Session> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn append(&self, kind: &'static str, result: &TrialResult) -> Result<(), ServiceError> {
        let session = self.current_session();
        let record = Record {
            kind,
            recorded_at_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or_default(),
            session_id: session.as_ref().map(|s| s.session_id.as_str()),
            participant_id: session.as_ref().map(|s| s.participant_id.as_str()),
            result,
        };
        let mut line =
            serde_json::to_string(&record).map_err(|e| ServiceError::Storage(e.to_string()))?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.results_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ServiceError::Storage(e.to_string()))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.results_path)
            .await
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        file.flush()
            .await
            .map_err(|e| ServiceError::Storage(e.to_string()))?;
        debug!(kind, path = %self.results_path.display(), "result appended");
        Ok(())
    }
}

#[derive(Serialize)]
struct Record<'a> {
    kind: &'static str,
    recorded_at_ms: u64,
    session_id: Option<&'a str>,
    participant_id: Option<&'a str>,
    #[serde(flatten)]
    result: &'a TrialResult,
}

#[async_trait]
impl TrialDataService for OfflineExperiment {
    async fn start_session(&self) -> Result<Session, ServiceError> {
        let session = Session {
            session_id: uuid::Uuid::new_v4().to_string(),
            participant_id: uuid::Uuid::new_v4().to_string(),
        };
        info!(participant = %session.participant_id, "offline session started");
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = Some(session.clone());
        Ok(session)
    }

    async fn get_trial(
        &self,
        block: BlockType,
        _trial_number: u32,
    ) -> Result<TrialStimulusSpec, ServiceError> {
        if self.current_session().is_none() {
            return Err(ServiceError::Rejected("session not initialised".into()));
        }
        Ok(self.generate(block))
    }
}

#[async_trait]
impl ResultsSink for OfflineExperiment {
    async fn submit_trial(&self, result: &TrialResult) -> Result<(), ServiceError> {
        self.append("trial", result).await
    }

    async fn save_result(&self, result: &TrialResult) -> Result<(), ServiceError> {
        self.append("final", result).await
    }
}

pub fn generate_trial<R: rand::Rng + ?Sized>(rng: &mut R, block: BlockType) -> TrialStimulusSpec {
    let is_word = rng.random_bool(0.5);
    let pool: &[&str] = if is_word { &REAL_WORDS } else { &NON_WORDS };
    let stimulus = pool.choose(rng).copied().unwrap_or(pool[0]);
    let (text_color, background_color) = colors_for(rng, block);

    TrialStimulusSpec {
        stimulus: stimulus.to_owned(),
        choices: choices_for(rng, stimulus, pool, is_word && block != BlockType::Bw),
        text_color,
        background_color,
        display_duration_ms: DISPLAY_TIME_MS,
        is_word,
    }
}

fn pick_color<R: rand::Rng + ?Sized>(rng: &mut R, palette: &[&str]) -> HexColor {
    HexColor::from(palette.choose(rng).copied().unwrap_or(HexColor::BLACK))
}

fn colors_for<R: rand::Rng + ?Sized>(rng: &mut R, block: BlockType) -> (HexColor, HexColor) {
    match block {
        BlockType::Bw => (HexColor::black(), HexColor::from(HexColor::NO_BACKGROUND)),
        BlockType::Color => (
            pick_color(rng, &TEXT_COLORS),
            HexColor::from(HexColor::NO_BACKGROUND),
        ),
        BlockType::ColoredBg => {
            let background = pick_color(rng, &BACKGROUND_COLORS);
            let legible: Vec<&str> = TEXT_COLORS
                .iter()
                .copied()
                .filter(|c| {
                    HexColor::from(*c)
                        .distance(&background)
                        .is_some_and(|d| d >= MIN_COLOR_DISTANCE)
                })
                .collect();
            let text = if legible.is_empty() {
                match background.is_light() {
                    Some(true) => HexColor::black(),
                    _ => HexColor::from("#FFFFFF"),
                }
            } else {
                pick_color(rng, &legible)
            };
            (text, background)
        }
    }
}

/// Four shuffled choices from the stimulus' own category, favouring
/// distractors that look like it. Colour blocks also favour a word evoking a colour.
fn choices_for<R: rand::Rng + ?Sized>(
    rng: &mut R,
    stimulus: &str,
    pool: &[&str],
    with_color_words: bool,
) -> Vec<String> {
    let others: Vec<&str> = pool.iter().copied().filter(|w| *w != stimulus).collect();
    let target: Vec<char> = stimulus.chars().collect();

    let mut similar: Vec<&str> = Vec::new();

    if with_color_words {
        for word in color_associated_distractors(&others) {
            push_unique(&mut similar, word);
        }
    }
    for word in others
        .iter()
        .copied()
        .filter(|w| {
            let chars: Vec<char> = w.chars().collect();
            chars.len() == target.len()
                && chars.iter().zip(&target).filter(|(a, b)| a == b).count() >= 2
        })
        .take(2)
    {
        push_unique(&mut similar, word);
    }
    if target.len() >= 3 {
        let prefix: String = target.iter().take(2).collect();
        let suffix: String = target[target.len() - 2..].iter().collect();
        if let Some(word) = others
            .iter()
            .copied()
            .find(|w| w.chars().count() >= 3 && w.starts_with(&prefix))
        {
            push_unique(&mut similar, word);
        }
        if let Some(word) = others
            .iter()
            .copied()
            .find(|w| w.chars().count() >= 3 && w.ends_with(&suffix))
        {
            push_unique(&mut similar, word);
        }
    }

    let wanted = CHOICE_COUNT - 1;
    let mut distractors: Vec<&str> = if similar.len() >= wanted {
        similar.choose_multiple(rng, wanted).copied().collect()
    } else {
        similar
    };
    let mut remaining: Vec<&str> = others
        .iter()
        .copied()
        .filter(|w| !distractors.contains(w))
        .collect();
    remaining.shuffle(rng);
    distractors.extend(remaining.into_iter().take(wanted - distractors.len()));

    let mut choices: Vec<String> = std::iter::once(stimulus)
        .chain(distractors)
        .map(str::to_owned)
        .collect();
    choices.shuffle(rng);
    choices
}

/// First available word of each colour association list.
fn color_associated_distractors<'a>(others: &[&'a str]) -> Vec<&'a str> {
    COLOR_ASSOCIATED_WORDS
        .iter()
        .filter_map(|list| list.iter().find_map(|w| others.iter().copied().find(|o| o == w)))
        .collect()
}

fn push_unique<'a>(list: &mut Vec<&'a str>, word: &'a str) {
    if !list.contains(&word) {
        list.push(word);
    }
}
