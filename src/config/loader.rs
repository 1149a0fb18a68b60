use std::env;
use std::time::Duration;

use super::env::{
    AppConfig, CaptureConfig, ClassifierConfig, ConfigError, DirectoryConfig, ListSourceConfig,
    LoggingConfig, PipelineConfig,
};

pub fn load_config() -> Result<AppConfig, ConfigError> {
    AppConfig::from_env()
}

impl AppConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let endpoint =
            env::var("PHISH_API_URL").map_err(|_| ConfigError::Missing("PHISH_API_URL"))?;

        let classifier = ClassifierConfig {
            endpoint,
            api_key: env::var("PHISH_API_KEY").ok().filter(|v| !v.is_empty()),
        };

        let lists = ListSourceConfig {
            deny_path: env::var("DENY_LIST_PATH")
                .unwrap_or_else(|_| "/blacklist-phishfort.json".to_string()),
            allow_paths: env::var("ALLOW_LIST_PATHS")
                .map(|value| {
                    value
                        .split(',')
                        .map(|part| part.trim().to_string())
                        .filter(|part| !part.is_empty())
                        .collect::<Vec<_>>()
                })
                .unwrap_or_else(|_| {
                    vec![
                        "/top-1m-builtwith.json".to_string(),
                        "/top-1m-cisco.json".to_string(),
                        "/top-1m-tranco.json".to_string(),
                    ]
                }),
        };

        let capture = CaptureConfig {
            max_attempts: env::var("CAPTURE_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(3),
            retry_delay: Duration::from_millis(
                env::var("CAPTURE_RETRY_DELAY_MS")
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(500),
            ),
        };

        let pipeline = PipelineConfig {
            dedupe_checks: env::var("PIPELINE_DEDUPE_CHECKS")
                .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "yes"))
                .unwrap_or(false),
        };

        let directories = DirectoryConfig {
            logs_dir: env::var("LOGS_DIR").unwrap_or_else(|_| "logs".to_string()),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        };

        Ok(Self {
            classifier,
            lists,
            capture,
            pipeline,
            directories,
            logging,
        })
    }
}
