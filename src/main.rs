use clap::Parser;
use mail_harvest::settings::{self, Args};
use mail_harvest::{logging, HttpDownloader, ImapConnector, Orchestrator, RunOutcome};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const CONFIG_ERROR: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let _log_guard = match logging::init(args.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    info!(version = env!("CARGO_PKG_VERSION"), "Starting mail-harvest");

    let config = match settings::load(&args) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return ExitCode::from(CONFIG_ERROR);
        }
    };

    let downloader = match HttpDownloader::new(config.timeouts.download_connect) {
        Ok(downloader) => downloader,
        Err(e) => {
            error!(error = %e, "Cannot create HTTP client");
            return ExitCode::from(CONFIG_ERROR);
        }
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping");
            on_interrupt.cancel();
        }
    });

    let orchestrator = Orchestrator::new(&config, ImapConnector::new(config.clone()), downloader);

    match orchestrator.run(&cancel).await {
        RunOutcome::Succeeded(_) | RunOutcome::Cancelled { .. } => ExitCode::SUCCESS,
        RunOutcome::ExhaustedRetries { attempts, last_error } => {
            if config.strict {
                error!(attempts, error = %last_error, "All attempts failed");
                ExitCode::FAILURE
            } else {
                warn!(attempts, error = %last_error, "All attempts failed");
                ExitCode::SUCCESS
            }
        }
    }
}
