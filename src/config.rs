use clap::Parser;
use std::path::PathBuf;
use thiserror::Error;

use crate::chat::DEFAULT_SLACK_API_URL;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[arg(short, long, env = "PORT", default_value = "6666")]
    pub port: u16,

    /// SQLite database file.
    #[arg(short, long, env = "SQLITE_DATABASE", default_value = "hookstats.sqlite")]
    pub database: PathBuf,

    #[arg(long, env = "GITHUB_WEBHOOK_SECRET")]
    pub github_secret: Option<String>,

    #[arg(long, env = "GITHUB_WEBHOOK_PATH", default_value = "/github/webhook")]
    pub github_path: String,

    /// Verification token Slack sends in every event envelope.
    #[arg(long, env = "SLACK_VERIFICATION_TOKEN")]
    pub slack_token: Option<String>,

    /// Bot token used to post messages.
    #[arg(long, env = "SLACK_BOT_TOKEN")]
    pub slack_bot_token: Option<String>,

    #[arg(long, env = "SLACK_EVENTS_PATH", default_value = "/slack/events")]
    pub slack_path: String,

    #[arg(long, env = "SLACK_API_URL", default_value = DEFAULT_SLACK_API_URL)]
    pub slack_api_url: String,
}

/// Plain configuration values consumed by the service.
#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub database: PathBuf,
    pub github_secret: String,
    pub github_path: String,
    pub slack_token: String,
    pub slack_bot_token: String,
    pub slack_path: String,
    pub slack_api_url: String,
}

/// Routes the service mounts itself; webhook paths may not shadow them.
pub const RESERVED_PATHS: [&str; 2] = ["/", "/health"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{setting} path {path:?} is reserved for the service's own routes")]
    ReservedPath { setting: &'static str, path: String },
    #[error("GitHub and Slack cannot share the path {0:?}")]
    PathConflict(String),
}

impl TryFrom<Args> for Config {
    type Error = ConfigError;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        let github_path = route_path("github_path", args.github_path)?;
        let slack_path = route_path("slack_path", args.slack_path)?;
        if github_path == slack_path {
            return Err(ConfigError::PathConflict(github_path));
        }

        Ok(Self {
            port: args.port,
            database: args.database,
            github_secret: args.github_secret.unwrap_or_default(),
            github_path,
            slack_token: args.slack_token.unwrap_or_default(),
            slack_bot_token: args.slack_bot_token.unwrap_or_default(),
            slack_path,
            slack_api_url: args.slack_api_url,
        })
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("database", &self.database)
            .field("github_path", &self.github_path)
            .field("slack_path", &self.slack_path)
            .field("slack_api_url", &self.slack_api_url)
            .finish_non_exhaustive()
    }
}

fn route_path(setting: &'static str, path: String) -> Result<String, ConfigError> {
    let path = if path.starts_with('/') {
        path
    } else {
        format!("/{path}")
    };
    if RESERVED_PATHS.contains(&path.as_str()) {
        return Err(ConfigError::ReservedPath { setting, path });
    }
    Ok(path)
}
