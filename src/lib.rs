//! # mail-harvest
//!
//! Unattended agent that downloads files linked from unread notification emails.
//!
//! A run connects to an IMAP mailbox, walks the unseen messages of one folder,
//! picks the links pointing at a configured host and path out of each HTML
//! body, and saves every linked file as `{destination}[/yyyy.MM.dd]/{title}.zip`.
//! The whole pass is retried a bounded number of times.
//!
//! ## Quick Start
//!
//! ```no_run
//! use mail_harvest::{HarvestConfig, HttpDownloader, ImapConnector, Orchestrator, RunOutcome};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> mail_harvest::Result<()> {
//! let config = HarvestConfig::builder()
//!     .imap_host("imap.example.com")
//!     .user("robot@example.com")
//!     .password("app-password")
//!     .folder("Notifications/Registry")
//!     .download_source("https://target.example/files")
//!     .destination("downloads")
//!     .build()?;
//!
//! let downloader = HttpDownloader::new(config.timeouts.download_connect)?;
//! let orchestrator = Orchestrator::new(&config, ImapConnector::new(config.clone()), downloader);
//!
//! if let RunOutcome::Succeeded(report) = orchestrator.run(&CancellationToken::new()).await {
//!     println!("{} files saved", report.downloads.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Pieces
//!
//! - [`MailHarvester`] yields the HTML bodies of unseen messages and flags
//!   each one as seen once the consumer moves past it.
//! - [`LinkExtractor`] finds the title and the target links in a body.
//! - [`FileNamer`] hands out collision-free file names.
//! - [`HttpDownloader`] streams a link into a newly created file.
//! - [`Orchestrator`] ties them together with retries and cancellation.
//!
//! ## Error Handling
//!
//! Every error carries its context. [`Error::category`] and
//! [`Error::is_retryable`] classify it:
//!
//! ```
//! use mail_harvest::Error;
//!
//! fn describe(error: &Error) -> String {
//!     format!("{} error (retryable: {}): {}", error.category(), error.is_retryable(), error)
//! }
//! ```
//!
//! ## Observability
//!
//! The crate uses `tracing`. Spans are named after the operation, e.g.
//! `ImapConnector::connect`, `MailHarvester::start`, `HttpDownloader::download`
//! and `Orchestrator::run`.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Public modules
pub mod config;
pub mod download;
pub mod error;
pub mod extractor;
pub mod harvester;
pub mod logging;
pub mod mail;
pub mod matcher;
pub mod naming;
pub mod orchestrator;
pub mod reveal;
pub mod settings;

// Internal modules
mod connection;
mod parser;
mod session;

#[cfg(test)]
mod fakes;

// Re-exports for ergonomic API
pub use config::{DownloadTarget, HarvestConfig, HarvestConfigBuilder, TimeoutConfig};
pub use download::{Download, HttpDownloader};
pub use error::{Error, ErrorCategory, Result};
pub use extractor::{Extraction, ExtractionStatus, LinkExtractor, LinkInfo};
pub use harvester::{Harvest, HarvestedMessage, MailHarvester};
pub use mail::{ImapConnector, MailConnector, MailSession};
pub use naming::FileNamer;
pub use orchestrator::{Orchestrator, RunOutcome, RunReport, RunState};
pub use reveal::{RevealDestination, SystemFileBrowser};
