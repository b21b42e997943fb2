use anyhow::Result;
use tracing::{error, info, Level};

use label_bot::action;
use label_bot::config::Config;
use label_bot::github::GitHubClient;

async fn run() -> Result<()> {
    let config = Config::from_env()?;

    info!(
        "Processing {} event for {}",
        config.event_name, config.repository
    );

    let client = GitHubClient::new(&config.github_token, &config.repository)?;
    action::run(&client, &config).await
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("Starting label-bot");

    if let Err(e) = run().await {
        error!("label-bot failed: {:#}", e);
        std::process::exit(1);
    }
}
