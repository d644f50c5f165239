//! Gazereel CLI: command-line interface for rendering eye-tracker recordings.
//!
//! Usage:
//!   gazereel render --frames <DIR> --eyedata <CSV>   Render one recording
//!   gazereel batch --folders <GLOB>                   Render every matching recording
//!   gazereel inspect --frames <DIR> --eyedata <CSV>  Show join statistics without encoding
//!   gazereel check                                    Check ffmpeg and font availability

use clap::{Parser, Subcommand};

use gazereel_common::config::{config_file_path, AppConfig};

mod commands;

#[derive(Parser)]
#[command(
    name = "gazereel",
    about = "Burn gaze overlays into eye-tracker scene recordings",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render one recording to an MP4
    Render(commands::render::RenderArgs),

    /// Render every recording folder matching a glob pattern
    Batch(commands::batch::BatchArgs),

    /// Show how frames and eye data line up, without encoding
    Inspect(commands::inspect::InspectArgs),

    /// Check system capabilities
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load();

    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    gazereel_common::logging::init_logging(&logging);
    tracing::debug!(path = %config_file_path().display(), "Configuration loaded");

    match cli.command {
        Commands::Render(args) => commands::render::run(args, &config).await,
        Commands::Batch(args) => commands::batch::run(args, &config).await,
        Commands::Inspect(args) => commands::inspect::run(args),
        Commands::Check => commands::check::run(&config),
    }
}
