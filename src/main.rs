mod app;
mod audio;
mod config;
mod messages;
mod ranking;
mod services;
mod session;
mod submission;
mod view;

use app::App;
use config::Config;

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    tracing::info!("Starting earmark song identification client");

    // Load configuration
    let config = Config::load()?;
    config.validate()?;

    // Create LocalSet for !Send futures (needed for the Recorder which holds
    // the capture stream)
    let local = tokio::task::LocalSet::new();

    local
        .run_until(async move { App::new(config)?.run().await })
        .await
}
