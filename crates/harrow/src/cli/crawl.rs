use crate::config::Config;
use crate::crawler::Crawler;
use crate::sinks::{ElasticSink, LocalStoreSink, Sink};
use anyhow::{ensure, Context, Result};
use clap::{Args, ValueEnum};
use harrow_pool::CancelToken;
use harrow_rules::{builtin_rules, RuleSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Args)]
pub struct CrawlArgs {
    /// Directory to crawl.
    pub path: PathBuf,

    /// Crawl (and index) name; defaults to the configured value.
    #[arg(long)]
    pub crawl_name: Option<String>,

    /// Ledger file location.
    #[arg(long)]
    pub db_file: Option<PathBuf>,

    /// Where findings go.
    #[arg(long, value_enum, default_value = "elastic")]
    pub sink: SinkKind,

    /// Output directory for the local sink.
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Total worker budget, split between processing and delivery
    /// (0 = one per CPU).
    #[arg(long)]
    pub tasks: Option<usize>,

    /// Abort the run on the first non-transient error.
    #[arg(long)]
    pub fail_fast: bool,

    /// Skip git history mining.
    #[arg(long)]
    pub no_git: bool,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum SinkKind {
    Elastic,
    Local,
}

pub async fn run(mut config: Config, args: CrawlArgs) -> Result<()> {
    if let Some(name) = args.crawl_name {
        config.general.crawl_name = name.to_lowercase();
    }
    if let Some(db_file) = args.db_file {
        config.general.db_file = Some(db_file);
    }
    if let Some(tasks) = args.tasks {
        config.general.tasks = tasks;
    }
    if args.fail_fast {
        config.general.continue_on_error = false;
    }
    if args.no_git {
        config.general.git_support = false;
    }

    let path = args
        .path
        .canonicalize()
        .with_context(|| format!("cannot resolve crawl path {}", args.path.display()))?;
    ensure!(path.is_dir(), "crawl path {} is not a directory", path.display());

    let sink: Arc<dyn Sink> = match args.sink {
        SinkKind::Elastic => {
            let node = config
                .elasticsearch
                .nodes
                .first()
                .context("no elasticsearch nodes configured")?;
            Arc::new(ElasticSink::new(node, &config.general.crawl_name)?)
        }
        SinkKind::Local => {
            let out = args
                .out
                .clone()
                .context("--out is required for the local sink")?;
            Arc::new(LocalStoreSink::new(out))
        }
    };

    // A rule that cannot prove itself must never run; this aborts the
    // command before anything touches the ledger.
    let rules = RuleSet::register(builtin_rules(&config.general.leak_context()))
        .context("detection rules failed self-validation")?;
    info!(rules = rules.len(), "detection rules validated");

    let cancel = CancelToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, shutting down");
            interrupt.cancel();
        }
    });

    let report = Crawler::new(config, rules, sink).run(&path, cancel).await?;
    println!(
        "crawl complete: {} read, {} skipped, {} delivered, {} pending",
        report.read, report.skipped, report.delivered, report.ledger.pending
    );
    Ok(())
}
