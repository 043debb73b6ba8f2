// Copyright 2026 Colorloop Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colorloop::cli::{crawl_cmd, doctor};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "colorloop",
    about = "Colorloop — harvest every item/layer/color variant image from a character-maker page",
    version,
    after_help = "Run 'colorloop <command> --help' for details on each command."
)]
struct Cli {
    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl a maker page and capture every variant render
    Crawl {
        /// URL of the maker page (e.g. "https://.../image_maker/644129")
        url: String,
        /// Auto-advance across items until the whole page is exhausted
        #[arg(long)]
        all: bool,
        /// Capture root directory
        #[arg(long, default_value = "captures")]
        out: PathBuf,
        /// Fallback folder name used when no maker hierarchy is detected
        #[arg(long, default_value = "AutoCaptured")]
        folder: String,
        /// Override the post-color settle delay in milliseconds
        #[arg(long)]
        settle_ms: Option<u64>,
        /// Show the browser window instead of running headless
        #[arg(long)]
        headful: bool,
    },
    /// Check environment and diagnose issues
    Doctor {
        /// Capture root directory to probe
        #[arg(long, default_value = "captures")]
        out: PathBuf,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate for
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Crawl {
            url,
            all,
            out,
            folder,
            settle_ms,
            headful,
        } => {
            crawl_cmd::run(crawl_cmd::CrawlArgs {
                url,
                all,
                out,
                folder,
                settle_ms,
                headful,
            })
            .await
        }
        Commands::Doctor { out } => doctor::run(&out).await,
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "colorloop",
                &mut std::io::stdout(),
            );
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let level = if verbose {
        "colorloop=debug"
    } else if quiet {
        "colorloop=error"
    } else {
        "colorloop=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(level.parse().unwrap()),
        )
        .init();
}
