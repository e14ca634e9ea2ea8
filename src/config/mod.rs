//! Runtime configuration.
//!
//! Every setting is a command-line flag with an environment fallback, and a
//! `.env` file in the working directory is loaded first. API keys are never
//! echoed in `--help`.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::llm::{ProviderKind, ProviderSettings};
use crate::server::DEFAULT_MAX_REQUEST_DURATION;

#[derive(Debug, Parser)]
#[command(name = "cloudspark")]
#[command(about = "Streaming chat gateway for hosted LLM providers", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub config: Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Install the default model catalog and exit
    Seed,
}

#[derive(Debug, Clone, Args)]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "CLOUDSPARK_BIND", default_value = "127.0.0.1:3000", global = true)]
    pub bind: String,

    /// SQLite database file
    #[arg(long, env = "CLOUDSPARK_DATABASE", default_value = "cloudspark.db", global = true)]
    pub database: PathBuf,

    /// Ceiling on one request, streamed body included
    #[arg(
        long,
        env = "CLOUDSPARK_MAX_DURATION_SECS",
        default_value_t = DEFAULT_MAX_REQUEST_DURATION.as_secs(),
        global = true
    )]
    pub max_duration_secs: u64,

    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true, global = true)]
    pub groq_api_key: Option<String>,

    #[arg(long, env = "GROQ_BASE_URL", global = true)]
    pub groq_base_url: Option<String>,

    #[arg(long, env = "HUGGINGFACE_API_KEY", hide_env_values = true, global = true)]
    pub huggingface_api_key: Option<String>,

    #[arg(long, env = "HUGGINGFACE_BASE_URL", global = true)]
    pub huggingface_base_url: Option<String>,

    /// Origin allowed by CORS; `*` allows any
    #[arg(long, env = "CLOUDSPARK_ALLOW_ORIGIN", default_value = "*", global = true)]
    pub allow_origin: String,
}

impl Cli {
    /// Loads `.env` if present, then parses arguments and environment.
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();
        Self::parse()
    }

    pub fn command(&self) -> Command {
        self.command.unwrap_or(Command::Serve)
    }
}

impl Config {
    pub fn max_request_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration_secs.max(1))
    }

    pub fn provider_settings(&self, kind: ProviderKind) -> ProviderSettings {
        let (base_url, api_key) = match kind {
            ProviderKind::Groq => (&self.groq_base_url, &self.groq_api_key),
            ProviderKind::HuggingFace => (&self.huggingface_base_url, &self.huggingface_api_key),
        };
        ProviderSettings::new(
            base_url.as_deref().unwrap_or(kind.default_base_url()),
            api_key.clone(),
        )
    }
}
