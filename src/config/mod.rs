pub mod env;
mod loader;

pub use env::{AppConfig, CaptureConfig, ClassifierConfig, ListSourceConfig, PipelineConfig};
pub use loader::load_config;
