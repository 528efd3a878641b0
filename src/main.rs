//! sftp-image-server - Random images from a remote SFTP tree
//!
//! Entry point for the CLI application.

use anyhow::{bail, Context, Result};
use clap::Parser;
use sftp_image_server::config::{default_env_file, load_env_file, CliArgs, ServerConfig};
use sftp_image_server::progress::{print_header, print_summary, ProgressReporter};
use sftp_image_server::remote::{RemoteTree, SftpPool};
use sftp_image_server::server::{self, AppState, WalkSummary};
use sftp_image_server::walker::DirectoryIndexer;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    // .env must be loaded before clap reads the environment
    let env_file = default_env_file();
    let env_loaded = load_env_file(&env_file);

    let args = CliArgs::parse();
    setup_logging(args.verbose)?;

    match env_loaded {
        Ok(true) => info!("Loaded environment from {}", env_file.display()),
        Ok(false) => info!("No {} file found, using process environment", env_file.display()),
        Err(e) => warn!("Ignoring unreadable {}: {}", env_file.display(), e),
    }

    let config = ServerConfig::from_args(args).context("Invalid configuration")?;

    if config.show_progress {
        print_header(
            &config.target.to_display_string(),
            &config.walk.root,
            config.walk.workers,
            &config.bind_display(),
        );
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create async runtime")?;

    runtime.block_on(run_server(config))
}

async fn run_server(config: ServerConfig) -> Result<()> {
    info!(
        "Connecting to {} with {} SFTP session(s)",
        config.target.to_display_string(),
        config.connections
    );
    let pool = {
        let target = config.target.clone();
        let (count, timeout, retries) = (config.connections, config.timeout, config.retry_count);
        tokio::task::spawn_blocking(move || SftpPool::connect(&target, count, timeout, retries))
            .await
            .context("Connection task failed")?
            .context("Failed to connect to SFTP server")?
    };
    let pool = Arc::new(pool);
    info!("Connected {} SFTP session(s)", pool.size());

    // The walk blocks; Ctrl-C during it stops the workers
    let indexer = DirectoryIndexer::new(config.walk.clone());
    let shutdown = indexer.shutdown_flag();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupt received, stopping index walk...");
            shutdown.store(true, Ordering::SeqCst);
        }
    });

    info!("Building image index from {}", config.walk.root);
    let walk_pool = Arc::clone(&pool);
    let show_progress = config.show_progress;
    let walked = tokio::task::spawn_blocking(move || {
        if show_progress {
            let reporter = ProgressReporter::new();
            let result = indexer.run_with_progress(&*walk_pool, |p| reporter.update(&p));
            reporter.finish_and_clear();
            result
        } else {
            indexer.run(&*walk_pool)
        }
    })
    .await;
    interrupt.abort();

    let (index, stats) = walked
        .context("Index task failed")?
        .context("Index walk failed")?;

    if show_progress {
        print_summary(&stats);
    }
    if !stats.completed {
        bail!("Index walk interrupted before completion");
    }

    info!("Found {} directories with images", index.len());
    if index.is_empty() {
        warn!(
            "No images under {}; every request will return 404",
            config.walk.root
        );
    }
    if stats.errors > 0 {
        info!(errors = stats.errors, "Index built with skipped subtrees");
    }
    if stats.session_errors > 0 {
        warn!(
            session_errors = stats.session_errors,
            "SFTP session failures during the walk; the index may be incomplete"
        );
    }

    let tree: Arc<dyn RemoteTree> = pool;
    let state = Arc::new(AppState::new(
        index,
        tree,
        WalkSummary::from_stats(&config.walk.root, &stats),
    ));

    server::serve(&config, state)
        .await
        .context("HTTP server failed")
}

fn setup_logging(verbose: bool) -> Result<()> {
    let default = if verbose {
        "sftp_image_server=debug,tower_http=debug,warn"
    } else {
        "sftp_image_server=info,tower_http=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}
