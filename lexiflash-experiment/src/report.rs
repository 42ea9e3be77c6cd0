use crate::error::ExperimentError;
use crate::service::ResultsSink;
use lexiflash_core::{BlockType, TrialResult};
use tracing::{debug, info, warn};

/// Accuracy and speed for one block.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockSummary {
    pub block: BlockType,
    pub correct: usize,
    pub total: usize,
    /// Percentage with one decimal; `None` when the block has no results.
    pub accuracy: Option<f64>,
    pub mean_reaction_time_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub correct: usize,
    pub total: usize,
    pub accuracy: Option<f64>,
    pub mean_reaction_time_ms: Option<u64>,
    pub blocks: Vec<BlockSummary>,
    /// Accuracy change from black to coloured text.
    pub color_effect: Option<f64>,
    /// Accuracy change from coloured text to coloured background.
    pub background_effect: Option<f64>,
    /// Accuracy change from the first to the last block.
    pub total_difficulty: Option<f64>,
}

pub fn compute_summary(log: &[TrialResult]) -> Summary {
    let blocks: Vec<BlockSummary> = BlockType::ALL
        .iter()
        .map(|&block| {
            let subset: Vec<&TrialResult> = log.iter().filter(|r| r.block == block).collect();
            let correct = subset.iter().filter(|r| r.correct).count();
            BlockSummary {
                block,
                correct,
                total: subset.len(),
                accuracy: percent(correct, subset.len()),
                mean_reaction_time_ms: mean_ms(subset.iter().map(|r| r.reaction_time_ms)),
            }
        })
        .collect();

    let correct = log.iter().filter(|r| r.correct).count();
    let accuracy_of = |i: usize| blocks.get(i).and_then(|b| b.accuracy);
    let color_effect = delta(accuracy_of(0), accuracy_of(1));
    let background_effect = delta(accuracy_of(1), accuracy_of(2));
    let total_difficulty = delta(accuracy_of(0), accuracy_of(2));

    Summary {
        correct,
        total: log.len(),
        accuracy: percent(correct, log.len()),
        mean_reaction_time_ms: mean_ms(log.iter().map(|r| r.reaction_time_ms)),
        blocks,
        color_effect,
        background_effect,
        total_difficulty,
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn percent(correct: usize, total: usize) -> Option<f64> {
    (total > 0).then(|| round1(correct as f64 / total as f64 * 100.0))
}

fn mean_ms(times: impl Iterator<Item = u64>) -> Option<u64> {
    let (sum, count) = times.fold((0u128, 0u128), |(s, c), t| (s + t as u128, c + 1));
    (count > 0).then(|| (sum as f64 / count as f64).round() as u64)
}

fn delta(from: Option<f64>, to: Option<f64>) -> Option<f64> {
    Some(round1(to? - from?))
}

pub fn format_percent(value: Option<f64>) -> String {
    value.map_or_else(|| "N/A".to_owned(), |v| format!("{v:.1}%"))
}

fn format_ms(value: Option<u64>) -> String {
    value.map_or_else(|| "N/A".to_owned(), |v| format!("{v}ms"))
}

impl Summary {
    pub fn block(&self, block: BlockType) -> Option<&BlockSummary> {
        self.blocks.iter().find(|b| b.block == block)
    }

    /// Human-readable report shown on the results screen.
    pub fn report_lines(&self) -> Vec<String> {
        let mut lines = vec![
            "Overall".to_owned(),
            format!(
                "Accuracy: {}/{} ({})",
                self.correct,
                self.total,
                format_percent(self.accuracy)
            ),
            format!(
                "Mean reaction time: {}",
                format_ms(self.mean_reaction_time_ms)
            ),
            String::new(),
            "By block".to_owned(),
        ];
        lines.extend(self.blocks.iter().map(|b| {
            format!(
                "{}: {}/{} correct ({}), {}",
                b.block.title(),
                b.correct,
                b.total,
                format_percent(b.accuracy),
                format_ms(b.mean_reaction_time_ms)
            )
        }));
        lines.extend([
            String::new(),
            "Analysis".to_owned(),
            format!("Colour effect: {}", format_percent(self.color_effect)),
            format!(
                "Coloured background effect: {}",
                format_percent(self.background_effect)
            ),
            format!("Total difficulty: {}", format_percent(self.total_difficulty)),
        ]);
        lines
    }
}

/// Progress of a bulk submission after each attempted entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitProgress {
    pub attempted: usize,
    pub succeeded: usize,
    pub total: usize,
    pub percent: u8,
}

impl SubmitProgress {
    pub fn started(total: usize) -> Self {
        Self::after(0, 0, total)
    }

    fn after(attempted: usize, succeeded: usize, total: usize) -> Self {
        let percent = if total == 0 {
            100
        } else {
            (attempted as f64 / total as f64 * 100.0).round() as u8
        };
        Self {
            attempted,
            succeeded,
            total,
            percent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitTally {
    pub succeeded: usize,
    pub failed: usize,
    pub total: usize,
}

/// Saves every result, strictly one request at a time, reporting progress
/// after each attempt. Failures are logged and counted; they never stop the
/// remaining submissions.
pub async fn submit_all<S, F>(sink: &S, results: &[TrialResult], mut on_progress: F) -> SubmitTally
where
    S: ResultsSink + ?Sized,
    F: FnMut(SubmitProgress),
{
    let total = results.len();
    let mut succeeded = 0;
    if total == 0 {
        on_progress(SubmitProgress::started(0));
    }

    for (index, result) in results.iter().enumerate() {
        match sink.save_result(result).await {
            Ok(()) => {
                succeeded += 1;
                debug!(index, trial = result.trial_number, block = %result.block, "result saved");
            }
            Err(source) => {
                let err = ExperimentError::SaveResult { index, source };
                warn!(error = %err, "result not saved");
            }
        }
        on_progress(SubmitProgress::after(index + 1, succeeded, total));
    }

    info!(succeeded, total, "bulk submission finished");
    SubmitTally {
        succeeded,
        failed: total - succeeded,
        total,
    }
}
