use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub segmenter: SegmenterConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Tuning for the two-pass step segmentation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SegmenterConfig {
    /// Scores below this mark a significant visual change. Must lie in (0, 1).
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    /// Seconds that must pass after a recorded step before the next frame is evaluated.
    #[serde(default = "default_min_time_between_steps")]
    pub min_time_between_steps: f64,
    /// How many of the most recent raw steps a candidate is checked against for duplicates.
    #[serde(default = "default_recent_window")]
    pub recent_window: usize,
    #[serde(default)]
    pub compare_against: CompareTarget,
}

/// What a candidate frame's change score is measured against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareTarget {
    /// The frame seen immediately before, gated or not.
    #[default]
    PreviousFrame,
    /// The frame of the last emitted raw step, so slow drift accumulates.
    LastStep,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub frames_dir: PathBuf,
    #[serde(default = "default_fps")]
    pub fps: f64,
    /// Optional file with one timestamp (seconds) per frame, one per line.
    #[serde(default)]
    pub timestamps_file: Option<PathBuf>,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub s3: Option<S3Config>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Fs,
    S3,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    #[serde(default = "default_s3_bucket")]
    pub bucket: String,
    #[serde(default = "default_s3_prefix")]
    pub prefix: String,
    #[serde(default = "default_region")]
    pub region: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            min_time_between_steps: default_min_time_between_steps(),
            recent_window: default_recent_window(),
            compare_against: CompareTarget::default(),
        }
    }
}

impl SegmenterConfig {
    pub fn new(similarity_threshold: f64, min_time_between_steps: f64) -> Self {
        Self {
            similarity_threshold,
            min_time_between_steps,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = self.similarity_threshold;
        if !(t > 0.0 && t < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "similarity_threshold must be in (0, 1), got {t}"
            )));
        }
        let gap = self.min_time_between_steps;
        if !gap.is_finite() || gap < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "min_time_between_steps must be a finite value >= 0, got {gap}"
            )));
        }
        if self.recent_window == 0 {
            return Err(ConfigError::Invalid("recent_window must be at least 1".into()));
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            output_dir: default_output_dir(),
            s3: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.segmenter.validate()?;
        if !(self.source.fps.is_finite() && self.source.fps > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "source.fps must be positive, got {}",
                self.source.fps
            )));
        }
        if self.source.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "source.channel_capacity must be at least 1".into(),
            ));
        }
        if self.store.backend == StoreBackend::S3 && self.store.s3.is_none() {
            return Err(ConfigError::Invalid(
                "store.backend = \"s3\" requires a [store.s3] section".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_similarity_threshold() -> f64 {
    0.95
}
fn default_min_time_between_steps() -> f64 {
    0.1
}
fn default_recent_window() -> usize {
    3
}
fn default_fps() -> f64 {
    30.0
}
fn default_channel_capacity() -> usize {
    64
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("screenshots")
}
fn default_s3_bucket() -> String {
    "steps".into()
}
fn default_s3_prefix() -> String {
    "steps/".into()
}
fn default_region() -> String {
    "us-east-1".into()
}
fn default_log_level() -> String {
    "info".into()
}
