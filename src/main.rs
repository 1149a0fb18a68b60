mod ai;
mod app;
mod browser;
mod cache;
mod capture;
mod config;
mod domain;
mod infrastructure;
mod lists;
mod messaging;
mod pipeline;

use anyhow::Result;
use infrastructure::{directories, logging, shutdown};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = config::load_config()?;
    let paths = directories::ensure_directories(&config.directories)?;
    logging::init_tracing(&config, &paths)?;

    let shutdown = shutdown::Shutdown::new();
    shutdown::install_signal_handlers(shutdown.clone());

    let app = app::PhishGuardApp::initialize(config, paths, shutdown.clone()).await?;
    app.run().await
}
