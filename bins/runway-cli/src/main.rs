mod commands;
mod generator;
mod watch;

use anyhow::Result;
use clap::{Parser, Subcommand};
use runway_common::reconnect::ReconnectPolicy;
use runway_common::Language;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "runway-cli")]
#[command(about = "Runway CLI - Inspect languages, build sandbox images, submit and watch jobs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List supported languages with their image, file and command
    Languages,

    /// Render the sandbox Dockerfile for a language
    Dockerfile {
        /// Language name (e.g., python, cpp, java)
        #[arg(short, long)]
        language: Language,

        /// Output directory; the file lands in <output>/<language>/Dockerfile
        #[arg(short, long, default_value = "dockerfiles")]
        output: PathBuf,
    },

    /// Render and build the sandbox image for a language
    BuildImage {
        /// Language name
        #[arg(short, long)]
        language: Language,

        #[arg(short, long, default_value = "dockerfiles")]
        output: PathBuf,

        /// Skip build cache
        #[arg(long, default_value = "false")]
        no_cache: bool,
    },

    /// Submit a source file for execution
    Submit {
        /// Submitting user id
        #[arg(short, long)]
        user: String,

        #[arg(short, long)]
        language: Language,

        /// Path to the source file
        #[arg(short, long)]
        file: PathBuf,

        /// Acceptance API base URL
        #[arg(long, env = "RUNWAY_API", default_value = "http://127.0.0.1:3000")]
        api: String,
    },

    /// Follow results for a user over the realtime gateway
    Watch {
        /// User session token
        #[arg(short, long)]
        token: String,

        #[arg(long, env = "WS_URL", default_value = "ws://127.0.0.1:8080")]
        gateway: String,

        /// Heartbeat interval in milliseconds
        #[arg(long, default_value = "10000")]
        interval_ms: u64,

        /// Delay before reconnecting, in milliseconds
        #[arg(long, default_value = "5000")]
        reconnect_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    runway_common::config::load_dotenv();
    let cli = Cli::parse();

    match cli.command {
        Commands::Languages => commands::list_languages(),
        Commands::Dockerfile { language, output } => {
            let path = commands::write_dockerfile(language, &output)?;
            println!("✅ Wrote {}", path.display());
        }
        Commands::BuildImage {
            language,
            output,
            no_cache,
        } => {
            commands::build_docker_image(language, &output, no_cache)?;
        }
        Commands::Submit {
            user,
            language,
            file,
            api,
        } => {
            let body = commands::submit(&api, &user, language, &file).await?;
            println!("✅ {}", serde_json::to_string_pretty(&body)?);
        }
        Commands::Watch {
            token,
            gateway,
            interval_ms,
            reconnect_ms,
        } => {
            println!("👀 Watching results on {}", gateway);
            watch::watch(
                &gateway,
                &token,
                Duration::from_millis(interval_ms),
                ReconnectPolicy::fixed(Duration::from_millis(reconnect_ms)),
            )
            .await?;
        }
    }

    Ok(())
}
