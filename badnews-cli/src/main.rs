//! The badnews daemon: sets up the base directory, starts the
//! subsystems the flags ask for, and runs until a signal arrives.
//!
//! Exit codes: 0 on signal-initiated shutdown, 1 when the base
//! directory cannot be initialized, 2 when a subsystem cannot be
//! created, 3 when the busybee cannot be created.

use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use badnews_cache::ResultCache;
use badnews_classify::{Advisor, BusyBee, Judge};
use badnews_core::Paths;
use badnews_core::blacklist::Blacklist;
use badnews_ingest::{HttpFeedSource, Reader};
use badnews_sleuth::Sleuth;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::prelude::*;

mod config;

use config::Config;

const EXIT_BASEDIR: u8 = 1;
const EXIT_SUBSYSTEM: u8 = 2;
const EXIT_BUSYBEE: u8 = 3;

#[derive(Parser)]
#[command(name = "badnews")]
#[command(about = "A personal news aggregator", version)]
struct Cli {
    /// Path for application-specific files
    #[arg(long)]
    basedir: Option<PathBuf>,

    /// Address for the web front end to listen on
    #[arg(long, default_value = config::DEFAULT_ADDR)]
    addr: String,

    /// Minimum level for log messages (TRACE, DEBUG, INFO, WARN, ERROR, CRITICAL)
    #[arg(long, default_value = "INFO")]
    loglevel: String,

    /// Flush cached ratings and tag suggestions at startup
    #[arg(long)]
    flush: bool,

    /// Number of ingestion workers
    #[arg(long, default_value_t = 4)]
    readercount: usize,

    /// Precompute suggested tags and ratings for news items
    #[arg(long)]
    bee: bool,

    /// Run the search executor
    #[arg(long)]
    sleuth: bool,
}

fn init_logging(cfg: &Config) -> anyhow::Result<()> {
    let log_path = cfg.paths.logs().join("badnews.log");
    let log_file = File::options()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("cannot open log file {}", log_path.display()))?;

    let filter = || {
        tracing_subscriber::EnvFilter::builder()
            .with_default_directive(cfg.log_level.into())
            .from_env_lossy()
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_filter(filter()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(log_file))
                .with_filter(filter()),
        )
        .init();

    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = signal(SignalKind::hangup())?;
    let mut quit = signal(SignalKind::quit())?;
    let mut terminate = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = hangup.recv() => {}
        _ = quit.recv() => {}
        _ = terminate.recv() => {}
    }

    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let Some(log_level) = config::parse_level(&cli.loglevel) else {
        eprintln!("Invalid log level: {}", cli.loglevel);
        return ExitCode::from(EXIT_BASEDIR);
    };

    let cfg = Config {
        paths: Paths::new(cli.basedir.unwrap_or_else(config::default_base_dir)),
        addr: cli.addr,
        log_level,
        flush_caches: cli.flush,
        reader_count: cli.readercount,
        run_bee: cli.bee,
        run_sleuth: cli.sleuth,
    };

    if let Err(e) = cfg.paths.ensure() {
        eprintln!(
            "Error initializing base directory {}: {e}",
            cfg.paths.base().display()
        );
        return ExitCode::from(EXIT_BASEDIR);
    }

    if let Err(e) = init_logging(&cfg) {
        eprintln!("Error initializing logging: {e}");
        return ExitCode::from(EXIT_BASEDIR);
    }

    info!(
        basedir = %cfg.paths.base().display(),
        addr = cfg.addr,
        "badnews starting up"
    );

    if cfg.flush_caches {
        for dir in [cfg.paths.judge_cache(), cfg.paths.advice_cache()] {
            if let Err(e) = ResultCache::flush(&dir) {
                eprintln!("Failed to flush cache at {}: {e}", dir.display());
                return ExitCode::from(EXIT_SUBSYSTEM);
            }
        }
    }

    let blacklist = match Blacklist::new_from_file(cfg.paths.blacklist()) {
        Ok(bl) => bl,
        Err(e) => {
            eprintln!("Error loading blacklist: {e}");
            return ExitCode::from(EXIT_SUBSYSTEM);
        }
    };

    let source = match HttpFeedSource::new() {
        Ok(source) => Arc::new(source),
        Err(e) => {
            eprintln!("Error creating feed source: {e}");
            return ExitCode::from(EXIT_SUBSYSTEM);
        }
    };

    let reader = match Reader::new(&cfg.paths, source, cfg.reader_count).await {
        Ok(reader) => Arc::new(reader),
        Err(e) => {
            eprintln!("Error creating reader: {e}");
            return ExitCode::from(EXIT_SUBSYSTEM);
        }
    };

    let bee = if cfg.run_bee {
        match create_busybee(&cfg.paths).await {
            Ok(bee) => Some(bee),
            Err(e) => {
                eprintln!("Failed to create BusyBee: {e}");
                return ExitCode::from(EXIT_BUSYBEE);
            }
        }
    } else {
        None
    };

    let sleuth = if cfg.run_sleuth {
        match Sleuth::create(&cfg.paths).await {
            Ok(sleuth) => Some(Arc::new(sleuth)),
            Err(e) => {
                eprintln!("Failed to create Sleuth: {e}");
                return ExitCode::from(EXIT_SUBSYSTEM);
            }
        }
    } else {
        None
    };

    reader.start();

    if let Some(bee) = &bee {
        let bee = Arc::clone(bee);
        tokio::spawn(async move { bee.run().await });
    }

    if let Some(sleuth) = &sleuth {
        let sleuth = Arc::clone(sleuth);
        tokio::spawn(async move { sleuth.run().await });
    }

    match wait_for_signal().await {
        Ok(()) => info!("Received signal, quitting"),
        Err(e) => error!(error = %e, "Signal handler failed, quitting"),
    }

    reader.stop();
    if let Some(bee) = &bee {
        bee.stop();
    }
    if let Some(sleuth) = &sleuth {
        sleuth.stop();
    }

    if blacklist.changed() {
        if let Err(e) = blacklist.dump(cfg.paths.blacklist()) {
            error!(error = %e, "Failed to dump blacklist");
        }
    }

    ExitCode::SUCCESS
}

async fn create_busybee(paths: &Paths) -> badnews_core::Result<Arc<BusyBee>> {
    let judge_cache = Arc::new(ResultCache::open(paths.judge_cache()).await?);
    let advice_cache = Arc::new(ResultCache::open(paths.advice_cache()).await?);

    let judge = Arc::new(Judge::create(paths, judge_cache).await?);
    let advisor = Arc::new(Advisor::create(paths, advice_cache).await?);

    Ok(Arc::new(BusyBee::create(paths, judge, advisor).await?))
}
