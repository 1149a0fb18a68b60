use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub classifier: ClassifierConfig,
    pub lists: ListSourceConfig,
    pub capture: CaptureConfig,
    pub pipeline: PipelineConfig,
    pub directories: DirectoryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ListSourceConfig {
    pub deny_path: String,
    pub allow_paths: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// When true, overlapping checks for the same URL are skipped instead
    /// of raced. Off by default to match the extension's observed behavior.
    pub dedupe_checks: bool,
}

#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    pub logs_dir: String,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
}
