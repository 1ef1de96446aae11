use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "worldmodel-cli", version, about = "World model CLI")]
struct Cli {
    /// World file (a serialized world state)
    #[arg(long, global = true, default_value = "world.json")]
    world: PathBuf,

    /// Config file (defaults to ~/.config/worldmodel/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new world from config defaults
    Init {
        /// User the world belongs to
        #[arg(long)]
        user: String,
        /// Overwrite an existing world file
        #[arg(long)]
        force: bool,
    },
    /// Find ranked free slots
    Slots(commands::slots::SlotsArgs),
    /// Find the earliest free slot
    Next(commands::slots::NextArgs),
    /// Add a task
    Add(commands::task::AddArgs),
    /// Remove a task by id
    Remove {
        /// Task id
        id: String,
    },
    /// Apply a plan (JSON array of tasks) all at once
    Plan {
        /// Path to the plan file
        file: PathBuf,
    },
    /// Audit the world for conflicts
    Check {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let ctx = commands::Context::new(cli.world, cli.config);
    let result = match cli.command {
        Commands::Init { user, force } => commands::world::init(&ctx, &user, force),
        Commands::Slots(args) => commands::slots::slots(&ctx, args),
        Commands::Next(args) => commands::slots::next(&ctx, args),
        Commands::Add(args) => commands::task::add(&ctx, args),
        Commands::Remove { id } => commands::task::remove(&ctx, &id),
        Commands::Plan { file } => commands::task::plan(&ctx, &file),
        Commands::Check { json } => commands::world::check(&ctx, json),
        Commands::Config { action } => commands::config::run(&ctx, action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
