use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use rss_scraper::config::Config;
use rss_scraper::feed::HttpFeedClient;
use rss_scraper::pipeline::{run_pipeline, PipelineSettings};
use rss_scraper::shutdown::{shutdown_channel, ShutdownTrigger};
use rss_scraper::storage::{SqliteStore, StoreError};

#[derive(Parser, Debug)]
#[command(
    name = "rss-scraper",
    about = "Poll RSS feeds and record regex matches in SQLite"
)]
struct Args {
    /// Path to the TOML config file
    #[arg(short = 'c', long, value_name = "FILE", default_value = "rss-scraper.toml")]
    config_file: PathBuf,

    /// Validate the config file and patterns, then exit
    #[arg(long)]
    check_config: bool,
}

/// Trigger shutdown on SIGINT or SIGTERM (Ctrl-C on non-Unix platforms).
async fn wait_for_signal(trigger: ShutdownTrigger) -> Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        tokio::select! {
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down gracefully"),
            _ = sigint.recv() => tracing::info!("Received SIGINT, shutting down gracefully"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        tracing::info!("Received Ctrl-C, shutting down gracefully");
    }

    trigger.trigger();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config = match Config::load(&args.config_file) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Could not load config file at {}: {}",
                args.config_file.display(),
                e
            );
            std::process::exit(1);
        }
    };
    let patterns = config
        .pattern_set()
        .context("Failed to compile patterns")?;

    if args.check_config {
        println!("Config OK: {}", args.config_file.display());
        println!("  database:  {}", config.db_path);
        println!("  interval:  {}s", config.poll_interval().as_secs());
        println!("  feeds:     {}", config.urls.len());
        for url in &config.urls {
            println!("    {}", url);
        }
        println!("  patterns:  {}", patterns.len());
        for pattern in patterns.iter() {
            println!("    {}", pattern.text());
        }
        return Ok(());
    }

    let store = match SqliteStore::open(&config.db_path).await {
        Ok(store) => store,
        Err(StoreError::Locked) => {
            eprintln!(
                "Error: Database {} is locked by another process. Please close it and try again.",
                config.db_path
            );
            std::process::exit(1);
        }
        Err(e) => {
            return Err(anyhow::anyhow!("Failed to open database: {}", e));
        }
    };

    let counts = store
        .counts()
        .await
        .context("Failed to read database counts")?;
    tracing::info!(
        items = counts.items,
        patterns = counts.patterns,
        matches = counts.matches,
        evidence = counts.evidence,
        "Database ready"
    );

    let (trigger, shutdown) = shutdown_channel();
    let signals = tokio::spawn(async move {
        if let Err(e) = wait_for_signal(trigger).await {
            tracing::error!(error = %e, "Failed to install signal handlers");
        }
    });

    let settings = PipelineSettings {
        poller: config.poller_settings(),
        channel_capacity: config.channel_capacity,
    };
    let timeout = config.request_timeout();
    let report = run_pipeline(
        config.urls.clone(),
        Arc::new(patterns),
        store,
        settings,
        |_| HttpFeedClient::new(timeout),
        shutdown,
    )
    .await;
    signals.abort();

    for failed in report.failed_feeds() {
        eprintln!("Feed {} {}", failed.url, failed.exit);
    }
    match &report.consumer {
        Ok(stats) => tracing::info!(
            entries = stats.entries,
            items = stats.items_inserted,
            evidence = stats.evidence_inserted,
            "Shutdown complete"
        ),
        Err(e) => eprintln!("Persistence stopped: {}", e),
    }

    if report.has_failures() {
        std::process::exit(1);
    }
    Ok(())
}
