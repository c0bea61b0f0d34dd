use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use chronicle_core::DEFAULT_CONFIG_FILE;

mod commands;

#[derive(Parser)]
#[command(name = "chronicle")]
#[command(about = "Archive Discord channels into browsable HTML and zip shards.")]
#[command(version)]
struct Cli {
    /// Config file (TOML). Defaults apply when it does not exist.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export one or more channels, one at a time
    Export {
        /// Channel IDs to archive
        #[arg(value_name = "CHANNEL", required = true)]
        channels: Vec<u64>,

        /// Channel to post the finished archive to
        #[arg(long, value_name = "ID")]
        destination: Option<u64>,

        /// Output root (overrides `export.output_dir`)
        #[arg(long, value_name = "DIR")]
        output: Option<PathBuf>,
    },

    /// Render a single message into `<output>/debug/index.html`
    Debug {
        #[arg(value_name = "CHANNEL")]
        channel: u64,

        #[arg(value_name = "MESSAGE")]
        message: u64,

        /// Output root (overrides `export.output_dir`)
        #[arg(long, value_name = "DIR")]
        output: Option<PathBuf>,
    },

    /// Print the token stream for a piece of message text
    Tokens {
        #[arg(value_name = "TEXT")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so `tokens` output stays clean on stdout.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Export {
            channels,
            destination,
            output,
        } => commands::export::run(&cli.config, channels, destination, output).await,
        Commands::Debug {
            channel,
            message,
            output,
        } => commands::debug::run(&cli.config, channel, message, output).await,
        Commands::Tokens { text } => commands::tokens::run(&text),
    }
}
