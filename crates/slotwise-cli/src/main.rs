mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{cache::CacheSubcommand, config::ConfigSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "slotwise",
    about = "Epoch-synchronized action scheduler: act once per epoch, batch submissions, survive restarts",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file (default: nearest slotwise.yaml walking up from the cwd)
    #[arg(long, global = true, env = "SLOTWISE_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the configured agent against the configured chain
    Run {
        /// Process a single poll and exit
        #[arg(long, conflicts_with = "max_steps")]
        once: bool,

        /// Stop after this many polls
        #[arg(long)]
        max_steps: Option<u64>,
    },

    /// Show epoch, slot and seconds left for a timestamp
    Epoch {
        #[arg(long)]
        seconds_per_epoch: u64,

        /// Unix timestamp (default: now)
        #[arg(long)]
        at: Option<u64>,
    },

    /// Show the expected weekly quota for a timestamp
    Quota {
        /// Weekly budget shared by all targets
        #[arg(long)]
        budget: f64,

        /// Number of targets sharing the budget
        #[arg(long, default_value = "1")]
        targets: usize,

        /// Unix timestamp (default: now)
        #[arg(long)]
        at: Option<u64>,

        /// Consumption interval in seconds
        #[arg(long, default_value = "86400")]
        interval: u64,
    },

    /// Preview how quantities would be packed into batches
    Pack {
        #[arg(long)]
        max_batch_size: u64,

        #[arg(long)]
        max_targets: usize,

        /// Pending quantities as target=units, in submission order
        #[arg(required = true)]
        actions: Vec<String>,
    },

    /// Inspect and edit the acted-epoch cache
    Cache {
        #[command(subcommand)]
        subcommand: CacheSubcommand,
    },

    /// Validate the config
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = root::resolve_config(cli.config.as_deref());

    let result = match cli.command {
        Commands::Run { once, max_steps } => {
            let steps = if once { Some(1) } else { max_steps };
            cmd::run::run(&config_path, steps, cli.json)
        }
        Commands::Epoch {
            seconds_per_epoch,
            at,
        } => cmd::epoch::run(seconds_per_epoch, at, cli.json),
        Commands::Quota {
            budget,
            targets,
            at,
            interval,
        } => cmd::quota::run(budget, targets, at, interval, cli.json),
        Commands::Pack {
            max_batch_size,
            max_targets,
            actions,
        } => cmd::pack::run(max_batch_size, max_targets, &actions, cli.json),
        Commands::Cache { subcommand } => cmd::cache::run(&config_path, subcommand, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&config_path, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
