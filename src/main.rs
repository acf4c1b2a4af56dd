//! fetch-jail: download a remote URL without letting it reach internal hosts.

mod logging;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use fetch_jail::config::{self, FetchConfig};
use fetch_jail::{download, validate, FetchPolicy};

/// SSRF-safe downloader
#[derive(Parser)]
#[command(name = "fetch-jail")]
#[command(about = "Fetch remote resources with per-hop SSRF checks and atomic writes")]
#[command(version)]
struct Cli {
    /// Configuration file path (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download URL to a file
    Get {
        url: String,

        /// Destination file
        #[arg(short, long)]
        output: PathBuf,

        /// Body size cap in bytes
        #[arg(long)]
        max_bytes: Option<u64>,

        /// Redirect hops to follow
        #[arg(long)]
        max_redirects: Option<u32>,

        /// Per-request timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Check whether a URL would be allowed, without fetching it
    Check { url: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("fetch-jail error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let policy = load_policy(cli.config.as_deref())?;

    match cli.command {
        Command::Get {
            url,
            output,
            max_bytes,
            max_redirects,
            timeout_secs,
        } => {
            let mut policy = policy;
            if let Some(max) = max_bytes {
                anyhow::ensure!(max > 0, "--max-bytes must be greater than zero");
                policy = policy.with_max_bytes(max);
            }
            if let Some(max) = max_redirects {
                policy = policy.with_max_redirects(max);
            }
            if let Some(secs) = timeout_secs {
                anyhow::ensure!(secs > 0, "--timeout-secs must be greater than zero");
                policy = policy.with_request_timeout(Duration::from_secs(secs));
            }

            let saved = download(&url, &output, &policy)
                .await
                .with_context(|| format!("download of {} failed", url))?;
            println!("{} ({} bytes)", saved.path.display(), saved.bytes);
        }
        Command::Check { url } => {
            validate(&url, &policy)?;
            println!("ok");
        }
    }
    Ok(())
}

fn load_policy(path: Option<&std::path::Path>) -> Result<FetchPolicy> {
    let cfg = match path {
        Some(path) => config::load(path)?,
        None => FetchConfig::default(),
    };
    cfg.into_policy()
}
