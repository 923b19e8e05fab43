use crate::config::{ConfigError, Environment};
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "penny")]
#[command(author = "Penny Stack Contributors")]
#[command(version)]
#[command(about = "Idempotent builder for roles, managed policies and functions", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Validate the environment and a stack manifest
    Check(ManifestArgs),

    /// Reconcile a manifest against an offline cloud snapshot
    Plan(PlanArgs),

    /// Inspect persisted stack documents
    #[command(subcommand)]
    Stack(StackCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Target region, account and environment
#[derive(Args, Debug, Clone)]
pub struct EnvArgs {
    /// Target region
    #[arg(long, env = "REGION")]
    pub region: Option<String>,

    /// Target account number
    #[arg(long = "account-number", env = "ACCOUNT_NUMBER")]
    pub account_number: Option<String>,

    /// Deployment environment (e.g. dev, production)
    #[arg(long, env = "ENVIRONMENT")]
    pub environment: Option<String>,
}

impl EnvArgs {
    pub fn resolve(&self) -> Result<Environment, ConfigError> {
        Environment::new(
            self.region.as_deref(),
            self.account_number.as_deref(),
            self.environment.as_deref(),
        )
    }
}

#[derive(Args, Debug, Clone)]
pub struct ManifestArgs {
    /// Stack manifest
    #[arg(short, long, default_value = "penny.toml")]
    pub manifest: PathBuf,

    #[command(flatten)]
    pub env: EnvArgs,
}

#[derive(Args, Debug, Clone)]
pub struct PlanArgs {
    #[command(flatten)]
    pub target: ManifestArgs,

    /// JSON snapshot of the current cloud state (empty cloud if omitted)
    #[arg(short, long)]
    pub snapshot: Option<PathBuf>,

    /// Write the resulting cloud snapshot here
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Load the stack document before planning and save it afterwards
    #[arg(long)]
    pub persist: bool,

    /// Directory of locally stored stacks (default: ~/.local/state/penny/stacks)
    #[arg(long)]
    pub state_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum StackCommand {
    /// Print the persisted stack document
    Show {
        #[command(flatten)]
        target: ManifestArgs,

        /// Directory of locally stored stacks (default: ~/.local/state/penny/stacks)
        #[arg(long)]
        state_dir: Option<PathBuf>,
    },
}
