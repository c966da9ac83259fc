//! Command-line, environment and JSON file settings.
//!
//! Values are layered: a command-line flag wins over its `MAIL_HARVEST_*`
//! environment variable, which wins over the JSON file, which wins over the
//! builder defaults.

use crate::config::{HarvestConfig, TimeoutConfig};
use crate::error::{Error, Result};
use clap::builder::BoolishValueParser;
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings file read when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Command-line arguments.
#[derive(Debug, Default, Parser)]
#[command(name = "mail-harvest", version, about)]
pub struct Args {
    /// JSON settings file [default: config.json, optional]
    #[arg(long, env = "MAIL_HARVEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, env = "MAIL_HARVEST_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// IMAP server hostname
    #[arg(long, env = "MAIL_HARVEST_IMAP_HOST")]
    pub imap_host: Option<String>,

    /// IMAP server port [default: 993]
    #[arg(long, env = "MAIL_HARVEST_IMAP_PORT")]
    pub imap_port: Option<u16>,

    /// Connect with TLS [default: true]
    #[arg(long, env = "MAIL_HARVEST_USE_TLS", value_parser = BoolishValueParser::new())]
    pub use_tls: Option<bool>,

    /// Login user name
    #[arg(long, env = "MAIL_HARVEST_USER")]
    pub user: Option<String>,

    /// Login password
    #[arg(long, env = "MAIL_HARVEST_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Folder to harvest, `/` separated; empty for the inbox
    #[arg(long, env = "MAIL_HARVEST_FOLDER")]
    pub folder: Option<String>,

    /// Host and path download links must point at
    #[arg(long, env = "MAIL_HARVEST_DOWNLOAD_SOURCE")]
    pub download_source: Option<String>,

    /// Directory to save files into [default: working directory]
    #[arg(long, env = "MAIL_HARVEST_DESTINATION")]
    pub destination: Option<PathBuf>,

    /// Save into a yyyy.MM.dd subfolder
    #[arg(long, env = "MAIL_HARVEST_GROUP_BY_DATE", value_parser = BoolishValueParser::new())]
    pub group_by_date: Option<bool>,

    /// Open the destination folder when done
    #[arg(long, env = "MAIL_HARVEST_REVEAL_ON_FINISH", value_parser = BoolishValueParser::new())]
    pub reveal_on_finish: Option<bool>,

    /// Flag processed messages as seen [default: true]
    #[arg(long, env = "MAIL_HARVEST_MARK_SEEN", value_parser = BoolishValueParser::new())]
    pub mark_seen: Option<bool>,

    /// Exit with an error when all attempts fail
    #[arg(long, env = "MAIL_HARVEST_STRICT", value_parser = BoolishValueParser::new())]
    pub strict: Option<bool>,

    /// Attempts of a whole pass [default: 3]
    #[arg(long, env = "MAIL_HARVEST_RETRIES")]
    pub retries: Option<u32>,

    /// Network timeout in seconds [default: 30]
    #[arg(long, env = "MAIL_HARVEST_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Regex deriving the file title from the message; group `title` or 1 is used
    #[arg(long, env = "MAIL_HARVEST_TITLE_PATTERN")]
    pub title_pattern: Option<String>,
}

/// Contents of the JSON settings file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileSettings {
    pub(crate) imap_host: Option<String>,
    pub(crate) imap_port: Option<u16>,
    pub(crate) use_tls: Option<bool>,
    pub(crate) user: Option<String>,
    pub(crate) password: Option<String>,
    pub(crate) folder: Option<String>,
    pub(crate) download_source: Option<String>,
    pub(crate) destination: Option<PathBuf>,
    pub(crate) group_by_date: Option<bool>,
    pub(crate) reveal_on_finish: Option<bool>,
    pub(crate) mark_seen: Option<bool>,
    pub(crate) strict: Option<bool>,
    pub(crate) retries: Option<u32>,
    pub(crate) timeout_secs: Option<u64>,
    pub(crate) title_pattern: Option<String>,
}

impl FileSettings {
    /// Reads `path`. A missing file yields empty settings unless `required`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigFile`] if the file cannot be read and
    /// [`Error::ConfigFormat`] if it is not valid JSON.
    pub fn read(path: &Path, required: bool) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(Error::ConfigFile {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        serde_json::from_str(&text).map_err(|source| Error::ConfigFormat {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Merges `args` over the settings file and builds a validated config.
///
/// # Errors
///
/// Returns a configuration error if the file is unreadable or malformed, or
/// the merged values do not validate.
pub fn load(args: &Args) -> Result<HarvestConfig> {
    let (path, required) = match &args.config {
        Some(path) => (path.clone(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
    };
    let file = FileSettings::read(&path, required)?;
    merge(args, file)
}

fn merge(args: &Args, file: FileSettings) -> Result<HarvestConfig> {
    let mut builder = HarvestConfig::builder();

    if let Some(host) = args.imap_host.clone().or(file.imap_host) {
        builder = builder.imap_host(host);
    }
    if let Some(port) = args.imap_port.or(file.imap_port) {
        builder = builder.imap_port(port);
    }
    if let Some(use_tls) = args.use_tls.or(file.use_tls) {
        builder = builder.use_tls(use_tls);
    }
    if let Some(user) = args.user.clone().or(file.user) {
        builder = builder.user(user);
    }
    if let Some(password) = args.password.clone().or(file.password) {
        builder = builder.password(password);
    }
    if let Some(folder) = args.folder.clone().or(file.folder) {
        builder = builder.folder(folder);
    }
    if let Some(source) = args.download_source.clone().or(file.download_source) {
        builder = builder.download_source(source);
    }
    if let Some(destination) = args.destination.clone().or(file.destination) {
        builder = builder.destination(destination);
    }
    if let Some(retries) = args.retries.or(file.retries) {
        builder = builder.retries(retries);
    }
    if let Some(secs) = args.timeout_secs.or(file.timeout_secs) {
        let mut timeouts = TimeoutConfig::uniform(Duration::from_secs(secs));
        timeouts.logout = timeouts.logout.min(TimeoutConfig::default().logout);
        builder = builder.timeouts(timeouts);
    }
    if let Some(pattern) = args.title_pattern.clone().or(file.title_pattern) {
        builder = builder.title_pattern(pattern);
    }

    builder
        .group_by_date(args.group_by_date.or(file.group_by_date).unwrap_or(false))
        .reveal_on_finish(args.reveal_on_finish.or(file.reveal_on_finish).unwrap_or(false))
        .mark_seen(args.mark_seen.or(file.mark_seen).unwrap_or(true))
        .strict(args.strict.or(file.strict).unwrap_or(false))
        .build()
}
