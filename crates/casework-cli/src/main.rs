mod cmd;
mod input;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, rules::RulesSubcommand, stage::StageSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "casework",
    about = "Investigation workflow engine: stages, rules, recovery, review and decisions",
    version,
    propagate_version = true
)]
struct Cli {
    /// Workspace root (default: auto-detect from .casework/)
    #[arg(long, global = true, env = "CASEWORK_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a casework workspace in the current directory
    Init {
        /// Investigation variant: rapid, standard or comprehensive
        #[arg(long, default_value = "standard")]
        variant: String,
    },

    /// Ingest a finding: decide, evaluate rules, execute actions, persist status
    Run {
        /// Finding file (JSON or YAML)
        #[arg(long)]
        finding: PathBuf,
    },

    /// Show the prioritized commands for a finding without executing anything
    Decide {
        #[arg(long)]
        finding: PathBuf,
    },

    /// Summarize urgency, confidence and complexity of a finding
    Assess {
        #[arg(long)]
        finding: PathBuf,
    },

    /// Stage engine: advance, skip checks, sequences
    Stage {
        #[command(subcommand)]
        subcommand: StageSubcommand,
    },

    /// Decide how to recover from a reported failure
    Retry {
        /// Retry input file (JSON or YAML)
        #[arg(long)]
        input: PathBuf,
        /// Apply the decision to a scratch context and wait out the cooldown
        #[arg(long)]
        apply: bool,
    },

    /// Review one specialist's analysis from another's point of view
    Review {
        /// Review input file (JSON or YAML)
        #[arg(long)]
        input: PathBuf,
    },

    /// Inspect and test trigger rules
    Rules {
        #[command(subcommand)]
        subcommand: RulesSubcommand,
    },

    /// Validate the workspace configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Show the persisted status of a case
    Status { case_id: String },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());
    tracing::debug!(root = %root.display(), "resolved workspace root");

    let result = match cli.command {
        Commands::Init { variant } => cmd::init::run(&root, &variant),
        Commands::Run { finding } => cmd::run::run(&root, &finding, cli.json),
        Commands::Decide { finding } => cmd::decide::run(&root, &finding, cli.json),
        Commands::Assess { finding } => cmd::decide::assess(&root, &finding, cli.json),
        Commands::Stage { subcommand } => cmd::stage::run(&root, subcommand, cli.json),
        Commands::Retry { input, apply } => cmd::retry::run(&root, &input, apply, cli.json),
        Commands::Review { input } => cmd::review::run(&root, &input, cli.json),
        Commands::Rules { subcommand } => cmd::rules::run(&root, subcommand, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
        Commands::Status { case_id } => cmd::status::run(&root, &case_id, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
