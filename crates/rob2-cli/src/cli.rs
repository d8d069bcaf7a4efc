use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use rob2_ai::{Provider, Rob2Config};
use rob2_core::DomainKey;

#[derive(Parser, Debug)]
#[command(
    name = "rob2",
    version,
    about = "ROB2 risk-of-bias evaluation for randomized controlled trials"
)]
pub struct Cli {
    /// Debug-level logging (RUST_LOG takes precedence).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Project config file used in place of ./rob2.toml.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Evaluate documents and write a JSON report.
    Evaluate(EvaluateArgs),
    /// Aggregate the domain rows of a saved result list.
    Aggregate(AggregateArgs),
    /// Print signal questions for a domain, or all domains.
    Schema(DomainArgs),
    /// Print decision paths for a domain, or all domains.
    Paths(DomainArgs),
    /// Print the effective configuration.
    Config,
}

#[derive(Args, Debug, Clone)]
pub struct EvaluateArgs {
    /// Content-list `.json`, `.txt` or `.md` files.
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    #[arg(short, long, default_value = "rob2_report.json")]
    pub output: PathBuf,

    #[arg(long)]
    pub provider: Option<Provider>,

    #[arg(long)]
    pub model: Option<String>,

    #[arg(long)]
    pub base_url: Option<String>,

    /// Model for relevance filtering.
    #[arg(long)]
    pub filter_model: Option<String>,

    #[arg(long)]
    pub standards: Option<PathBuf>,

    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Evaluate every text block without relevance filtering.
    #[arg(long)]
    pub no_filter: bool,

    #[arg(long)]
    pub no_review: bool,

    #[arg(long)]
    pub no_cache: bool,
}

impl EvaluateArgs {
    /// Flags win over file and environment configuration.
    pub fn apply(&self, config: &mut Rob2Config) {
        if let Some(provider) = self.provider {
            config.model.provider = provider;
        }
        if let Some(model) = &self.model {
            config.model.name = model.clone();
        }
        if let Some(base_url) = &self.base_url {
            config.model.base_url = Some(base_url.clone());
        }
        if let Some(filter_model) = &self.filter_model {
            config.filter.model = Some(filter_model.clone());
        }
        if let Some(standards) = &self.standards {
            config.review.standards_path = Some(standards.clone());
        }
        if let Some(dir) = &self.cache_dir {
            config.cache.dir = dir.clone();
        }
        if self.no_filter {
            config.filter.enabled = false;
        }
        if self.no_review {
            config.review.enabled = false;
        }
        if self.no_cache {
            config.cache.enabled = false;
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct AggregateArgs {
    /// JSON array of result rows.
    pub input: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct DomainArgs {
    /// Domain key, e.g. `randomization` or `deviation_adherence`.
    pub domain: Option<DomainKey>,
}
