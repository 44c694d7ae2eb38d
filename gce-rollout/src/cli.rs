use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// gce-rollout - rolling deployments of Compute Engine instance templates
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Deployment config file (.yml and .yaml are tried in turn)
    #[arg(short, long, env = "INPUT_CONFIG", default_value = "deploy.yml")]
    pub config: PathBuf,

    /// Fallback credentials for deploys without `creds`: a file path or inline JSON
    #[arg(long, env = "INPUT_CREDS", hide_env_values = true)]
    pub creds: Option<String>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Auto)]
    pub log_format: LogFormat,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    /// GitHub workflow commands inside GitHub Actions, plain text elsewhere
    Auto,
    Text,
    Github,
}

impl LogFormat {
    /// Resolve `Auto` against the `GITHUB_ACTIONS` environment variable
    pub fn resolve(self, github_actions: Option<&str>) -> LogFormat {
        match self {
            LogFormat::Auto if github_actions == Some("true") => LogFormat::Github,
            LogFormat::Auto => LogFormat::Text,
            other => other,
        }
    }
}
