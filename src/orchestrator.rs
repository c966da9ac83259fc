//! Drives harvest passes with bounded retries and cancellation.
//!
//! One pass connects, walks every unseen message, extracts links and
//! downloads each of them. Any error aborts the pass; the next attempt
//! starts from scratch. Messages handled before the failure were already
//! flagged as seen and are not revisited.

use crate::config::HarvestConfig;
use crate::download::Download;
use crate::error::{Error, Result};
use crate::extractor::{LinkExtractor, LinkInfo};
use crate::harvester::{Harvest, MailHarvester};
use crate::mail::{MailConnector, MailSession};
use crate::matcher::RegexMatcher;
use crate::naming::{destination_dir, FileNamer};
use crate::reveal::{RevealDestination, SystemFileBrowser};
use chrono::{Local, NaiveDate};
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

type Clock = Box<dyn Fn() -> NaiveDate + Send + Sync>;

/// Lifecycle of an [`Orchestrator`].
///
/// `Idle -> Running -> {Succeeded, Cancelled, ExhaustedRetries}`; a failed
/// attempt re-enters `Running` with the next attempt number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Not started.
    Idle,
    /// A pass is in progress.
    Running {
        /// 1-based attempt number.
        attempt: u32,
    },
    /// A pass completed.
    Succeeded,
    /// Cancelled from outside.
    Cancelled,
    /// Every attempt failed.
    ExhaustedRetries,
}

/// What a finished run amounted to.
#[derive(Debug)]
pub enum RunOutcome {
    /// A pass completed.
    Succeeded(RunReport),
    /// The run was cancelled before a pass completed.
    Cancelled {
        /// Attempts started, including the interrupted one.
        attempts: u32,
    },
    /// Every attempt failed.
    ExhaustedRetries {
        /// Attempts made.
        attempts: u32,
        /// Error of the final attempt.
        last_error: Error,
    },
}

impl RunOutcome {
    /// Number of attempts started.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Succeeded(report) => report.attempts,
            Self::Cancelled { attempts } | Self::ExhaustedRetries { attempts, .. } => *attempts,
        }
    }

    /// Terminal state this outcome corresponds to.
    #[must_use]
    pub fn state(&self) -> RunState {
        match self {
            Self::Succeeded(_) => RunState::Succeeded,
            Self::Cancelled { .. } => RunState::Cancelled,
            Self::ExhaustedRetries { .. } => RunState::ExhaustedRetries,
        }
    }
}

/// Summary of a successful run, accumulated over all its attempts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Attempts it took.
    pub attempts: u32,
    /// Messages handed out by the harvester.
    pub messages: usize,
    /// Files written, in download order.
    pub downloads: Vec<PathBuf>,
    /// Last directory files were written to.
    pub last_folder: Option<PathBuf>,
}

/// Runs the harvest, extract and download pipeline.
pub struct Orchestrator<C, D> {
    harvester: MailHarvester<C>,
    extractor: LinkExtractor<RegexMatcher>,
    downloader: D,
    revealer: Box<dyn RevealDestination>,
    clock: Clock,
    state: watch::Sender<RunState>,
    destination: PathBuf,
    group_by_date: bool,
    reveal_on_finish: bool,
    max_attempts: u32,
}

impl<C: MailConnector, D: Download> Orchestrator<C, D> {
    /// Creates an orchestrator for `config` using the given mail connector and downloader.
    #[must_use]
    pub fn new(config: &HarvestConfig, connector: C, downloader: D) -> Self {
        Self {
            harvester: MailHarvester::new(connector, config.folder.clone(), config.mark_seen),
            extractor: LinkExtractor::new(config.target.clone(), config.title_matcher().clone()),
            downloader,
            revealer: Box::new(SystemFileBrowser),
            clock: Box::new(|| Local::now().date_naive()),
            state: watch::channel(RunState::Idle).0,
            destination: config.destination.clone(),
            group_by_date: config.group_by_date,
            reveal_on_finish: config.reveal_on_finish,
            max_attempts: config.retries.max(1),
        }
    }

    /// Replaces the way the destination folder is shown.
    #[must_use]
    pub fn with_revealer(mut self, revealer: impl RevealDestination + 'static) -> Self {
        self.revealer = Box::new(revealer);
        self
    }

    /// Replaces the source of "today" used for fallback titles and date folders.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDate + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    /// Receives every state transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    /// Runs passes until one succeeds, the attempts are used up or `cancel` fires.
    #[instrument(name = "Orchestrator::run", skip_all, fields(max_attempts = self.max_attempts))]
    pub async fn run(&self, cancel: &CancellationToken) -> RunOutcome {
        let outcome = self.attempt_passes(cancel).await;
        self.state.send_replace(outcome.state());
        outcome
    }

    async fn attempt_passes(&self, cancel: &CancellationToken) -> RunOutcome {
        let mut namer = FileNamer::new();
        let mut report = RunReport::default();
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.state.send_replace(RunState::Running { attempt });
            info!(attempt, "Starting pass");

            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!(attempt, "Run cancelled");
                    return RunOutcome::Cancelled { attempts: attempt };
                }
                result = self.pass(&mut namer, &mut report) => result,
            };

            match result {
                Ok(()) => break,
                Err(e) => {
                    error!(
                        attempt,
                        error = %e,
                        category = %e.category(),
                        retryable = e.is_retryable(),
                        "Pass failed"
                    );
                    if attempt >= self.max_attempts {
                        error!(attempts = attempt, "Giving up");
                        return RunOutcome::ExhaustedRetries {
                            attempts: attempt,
                            last_error: e,
                        };
                    }
                    info!("Restarting processing");
                }
            }
        }

        report.attempts = attempt;
        info!(
            attempts = attempt,
            messages = report.messages,
            downloads = report.downloads.len(),
            "Run finished"
        );

        if self.reveal_on_finish && !report.downloads.is_empty() {
            if let Some(folder) = &report.last_folder {
                if let Err(e) = self.revealer.reveal(folder) {
                    warn!(folder = %folder.display(), error = %e, "Could not open destination folder");
                }
            }
        }

        RunOutcome::Succeeded(report)
    }

    async fn pass(&self, namer: &mut FileNamer, report: &mut RunReport) -> Result<()> {
        let mut harvest = self.harvester.start().await?;
        let result = self.drain(&mut harvest, namer, report).await;
        let closed = harvest.close().await;

        result?;
        if let Err(e) = closed {
            warn!(error = %e, "Logout failed");
        }
        Ok(())
    }

    async fn drain<S: MailSession>(
        &self,
        harvest: &mut Harvest<S>,
        namer: &mut FileNamer,
        report: &mut RunReport,
    ) -> Result<()> {
        while let Some(message) = harvest.next().await? {
            report.messages += 1;

            let today = (self.clock)();
            let extraction = self.extractor.extract(&message.html, today);
            if extraction.links.is_empty() {
                continue;
            }

            let folder = self.prepare_folder(today).await?;
            for link in &extraction.links {
                let path = self.download_link(link, &folder, namer).await?;
                report.downloads.push(path);
            }
            report.last_folder = Some(folder);
        }

        Ok(())
    }

    async fn prepare_folder(&self, today: NaiveDate) -> Result<PathBuf> {
        let folder = destination_dir(&self.destination, self.group_by_date, today);
        tokio::fs::create_dir_all(&folder)
            .await
            .map_err(|source| Error::CreateDirectory {
                path: folder.clone(),
                source,
            })?;

        Ok(tokio::fs::canonicalize(&folder).await.unwrap_or(folder))
    }

    async fn download_link(
        &self,
        link: &LinkInfo,
        folder: &Path,
        namer: &mut FileNamer,
    ) -> Result<PathBuf> {
        info!(title = %link.title, url = %link.uri, "Downloading file");

        loop {
            let path = namer.next_path(folder, &link.title);
            info!(path = %path.display(), "Saving to disk");

            match self.downloader.download(&link.uri, &path).await {
                Ok(bytes) => {
                    info!(path = %path.display(), bytes, "File saved");
                    return Ok(path);
                }
                Err(Error::DestinationExists { path }) => {
                    warn!(path = %path.display(), "File appeared meanwhile, picking another name");
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl<C, D> std::fmt::Debug for Orchestrator<C, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("destination", &self.destination)
            .field("group_by_date", &self.group_by_date)
            .field("reveal_on_finish", &self.reveal_on_finish)
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}
