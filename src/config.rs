use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

#[derive(Clone)]
pub struct Config {
    pub github_token: String,
    /// `owner/name` of the repository the event fired in.
    pub repository: String,
    pub event_name: String,
    /// Path to the JSON event payload written by the runner.
    pub event_path: PathBuf,
    /// In-repo path of the rules override document.
    /// If not set, the built-in default rules are used unmodified.
    pub config_file: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let github_token =
            env::var("GITHUB_TOKEN").context("GITHUB_TOKEN environment variable is required")?;

        let repository = env::var("GITHUB_REPOSITORY")
            .context("GITHUB_REPOSITORY environment variable is required")?;

        let event_name = env::var("GITHUB_EVENT_NAME")
            .context("GITHUB_EVENT_NAME environment variable is required")?;

        let event_path = env::var("GITHUB_EVENT_PATH")
            .map(PathBuf::from)
            .context("GITHUB_EVENT_PATH environment variable is required")?;

        let config_file = parse_config_file_input(env::var("INPUT_CONFIG_FILE").ok());

        Ok(Config {
            github_token,
            repository,
            event_name,
            event_path,
            config_file,
        })
    }
}

/// Parse the CONFIG_FILE input from an optional string value.
///
/// Returns None if the value is missing, empty, or contains only whitespace,
/// so an empty input falls back to the built-in defaults instead of a
/// guaranteed-404 fetch of "".
pub fn parse_config_file_input(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
