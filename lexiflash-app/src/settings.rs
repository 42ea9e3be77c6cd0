use anyhow::{Context, Result};
use lexiflash_experiment::ExperimentConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use std::{fs, io};

pub const SETTINGS_FILE: &str = "lexiflash.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server_url: String,
    /// Generate stimuli locally and write results to `results_path` instead of the server.
    pub offline: bool,
    pub results_path: PathBuf,
    pub font_path: Option<PathBuf>,
    /// Unset means requests may wait indefinitely.
    pub request_timeout_secs: Option<u64>,
    pub experiment: ExperimentConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:5000".into(),
            offline: false,
            results_path: PathBuf::from("data/results.jsonl"),
            font_path: None,
            request_timeout_secs: None,
            experiment: ExperimentConfig::default(),
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

/// Reads `lexiflash.toml` from the working directory if present, then applies
/// `LEXIFLASH_*` environment overrides.
pub fn load_settings() -> Result<Settings> {
    let raw = match fs::read_to_string(SETTINGS_FILE) {
        Ok(raw) => Some(raw),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(e).with_context(|| format!("reading {SETTINGS_FILE}")),
    };
    settings_from(raw.as_deref(), |key| std::env::var(key).ok())
}

pub fn settings_from(
    file: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Settings> {
    let mut settings = match file {
        Some(raw) => toml::from_str(raw).with_context(|| format!("parsing {SETTINGS_FILE}"))?,
        None => Settings::default(),
    };

    if let Some(v) = env("LEXIFLASH_SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = env("LEXIFLASH_OFFLINE") {
        settings.offline = parse_flag(&v).context("LEXIFLASH_OFFLINE")?;
    }
    if let Some(v) = env("LEXIFLASH_RESULTS_PATH") {
        settings.results_path = PathBuf::from(v);
    }
    if let Some(v) = env("LEXIFLASH_FONT_PATH") {
        settings.font_path = Some(PathBuf::from(v));
    }
    if let Some(v) = env("LEXIFLASH_REQUEST_TIMEOUT_SECS") {
        settings.request_timeout_secs = Some(
            v.trim()
                .parse()
                .with_context(|| format!("LEXIFLASH_REQUEST_TIMEOUT_SECS={v:?}"))?,
        );
    }
    if let Some(v) = env("LEXIFLASH_TRIALS_PER_BLOCK") {
        settings.experiment.trials_per_block = v
            .trim()
            .parse()
            .with_context(|| format!("LEXIFLASH_TRIALS_PER_BLOCK={v:?}"))?;
    }

    Ok(settings)
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => anyhow::bail!("expected a boolean, got {other:?}"),
    }
}
