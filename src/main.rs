use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::error;

use screeps_map_downloader_lib::{clean, download, init_logging, Config};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Download terrain and objects for every room of a Screeps shard"
)]
struct Cli {
    /// Path to the YAML config
    #[arg(short, long, env = "SCREEPS_MAP_CONFIG", default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch every configured room and write the map (default)
    Download,
    /// Sanitize an existing map file
    Clean { input: PathBuf, output: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Download) {
        Command::Download => {
            let config = match Config::load(&cli.config) {
                Ok(config) => config,
                Err(err) => {
                    error!("Config fatal error: {}", err);
                    return Ok(());
                }
            };
            config.log_redacted();
            download(config).await?;
        }
        Command::Clean { input, output } => {
            clean(&input, &output)?;
        }
    }
    Ok(())
}
