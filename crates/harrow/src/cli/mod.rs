//! Command-line interface.

mod crawl;
mod rules;

use crate::config::Config;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "harrow", version, about = "Crawl filesystems for leaked credentials")]
pub struct Cli {
    /// Verbose console output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// YAML configuration file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl a directory and deliver findings to the configured sink.
    Crawl(crawl::CrawlArgs),
    /// List the built-in detection rules after running their self-validation.
    Rules(rules::RulesArgs),
    /// Write a sample configuration file.
    Init(InitArgs),
}

#[derive(Args)]
struct InitArgs {
    /// Destination path; stdout when omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config = Config::load(self.config.as_deref())?;
        match self.command {
            Commands::Crawl(args) => crawl::run(config, args).await,
            Commands::Rules(args) => rules::run(config, args),
            Commands::Init(args) => init(args),
        }
    }
}

fn init(args: InitArgs) -> Result<()> {
    let sample = Config::sample_yaml();
    match args.output {
        Some(path) => {
            std::fs::write(&path, sample)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("sample configuration written to {}", path.display());
        }
        None => print!("{sample}"),
    }
    Ok(())
}
