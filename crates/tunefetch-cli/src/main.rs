//! Tunefetch - download playlists as MP3 files.
//!
//! This is the entry point of the `tunefetch` command.

mod cli;
mod console;
mod logging;
mod publish;

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tunefetch_core::batch::BatchReport;
use tunefetch_core::error::{ConfigError, Error};
use tunefetch_core::{AppConfig, BatchDriver, DownloadOrchestrator, default_registry};

use cli::Cli;
use console::{ConsoleReporter, final_report_lines};
use logging::LoggingConfig;
use publish::{PublishOptions, Published, finished_playlists, publish_to_azure};

/// How long shutdown waits for workers still stuck in a download.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// How a run ended, mapped onto the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunStatus {
    Completed,
    Failed,
    Interrupted,
}

impl RunStatus {
    fn for_run(report: &BatchReport, publish_failed: bool) -> Self {
        if report.interrupted {
            Self::Interrupted
        } else if report.aborted || publish_failed {
            Self::Failed
        } else {
            Self::Completed
        }
    }

    const fn exit_code(self) -> u8 {
        match self {
            Self::Completed => 0,
            Self::Failed => 1,
            Self::Interrupted => 130,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _logging = init_logging(&cli);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let outcome = runtime.block_on(run(cli));
    // Workers blocked in a download must not hold the process open.
    runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);

    match outcome {
        Ok(status) => ExitCode::from(status.exit_code()),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {e:#}");
            ExitCode::from(exit_code_for(&e))
        }
    }
}

/// Start logging, falling back to console only if the log file is unusable.
fn init_logging(cli: &Cli) -> Option<logging::LoggingGuard> {
    let mut config = LoggingConfig::for_verbosity(cli.verbose);
    if let Some(dir) = &cli.log_dir {
        config = config.with_log_directory(dir.clone());
    }
    if cli.no_log_file {
        config = config.without_file();
    }
    match logging::init(&config) {
        Ok(guard) => Some(guard),
        Err(e @ logging::LoggingError::DirectoryCreationFailed { .. }) => {
            eprintln!("Warning: {e}; logging to the console only");
            logging::init(&config.without_file()).ok()
        }
        Err(e) => {
            eprintln!("Warning: {e}");
            None
        }
    }
}

/// Configuration errors exit with 2, everything else with 1.
fn exit_code_for(error: &anyhow::Error) -> u8 {
    let is_config = error.downcast_ref::<ConfigError>().is_some()
        || matches!(error.downcast_ref::<Error>(), Some(Error::Config(_)));
    if is_config { 2 } else { 1 }
}

async fn run(cli: Cli) -> anyhow::Result<RunStatus> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.apply_env();
    cli.apply_to(&mut config);
    config.validate()?;

    let source = cli.source()?;
    let options = PublishOptions {
        archive: cli.wants_archive(),
        upload: cli.upload,
        cleanup: cli.cleanup,
    };
    let upload = if options.upload {
        Some(config.upload_config()?.clone())
    } else {
        None
    };

    let provider = default_registry(&config.ytdlp).create(&cli.provider)?;
    println!("Using provider: {}", provider.name());
    info!(
        "Starting run: provider={}, output={}, workers={}",
        provider.name(),
        config.output_folder.display(),
        config.download.max_workers
    );

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let orchestrator = DownloadOrchestrator::new(config.orchestrator_config(), cancel.clone());
    let driver = BatchDriver::new(provider, orchestrator, config.batch_policy, cancel);
    let reporter = ConsoleReporter::new();

    let report = driver.run(&source, &config.output_folder, &reporter).await?;

    let mut publish_failed = false;
    if options.any() && !report.interrupted {
        let playlists = finished_playlists(&report);
        let publish = move || publish_to_azure(playlists, options, upload);
        let published = tokio::task::spawn_blocking(publish)
            .await
            .context("archive task did not complete")??;
        publish_failed = print_published(&published);
    }

    for line in final_report_lines(&report, &config.output_folder) {
        println!("{line}");
    }

    let status = RunStatus::for_run(&report, publish_failed);
    info!("Run finished: {:?}", status);
    Ok(status)
}

/// Print what was archived and uploaded. Returns whether anything failed.
fn print_published(published: &[Published]) -> bool {
    let mut failed = false;
    for entry in published {
        if let Some(url) = &entry.url {
            println!("Uploaded '{}': {}", entry.title, url);
        } else if let Some(archive) = &entry.archive {
            println!("Archived '{}': {}", entry.title, archive.display());
        }
        if let Some(reason) = &entry.error {
            eprintln!("Could not publish '{}': {}", entry.title, reason);
            failed = true;
        }
    }
    failed
}

/// Cancel `cancel` on the first Ctrl-C, exit on the second.
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            return;
        }
        warn!("Interrupt received, stopping downloads");
        eprintln!("\nStopping after the running downloads (Ctrl-C again to quit)...");
        cancel.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(i32::from(RunStatus::Interrupted.exit_code()));
        }
    });
}
