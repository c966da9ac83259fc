//! Configuration for a harvest run.
//!
//! Use [`HarvestConfigBuilder`] to create a validated configuration with sensible defaults:
//!
//! ```
//! use mail_harvest::HarvestConfig;
//!
//! let config = HarvestConfig::builder()
//!     .imap_host("imap.example.com")
//!     .user("robot@example.com")
//!     .password("app-password")
//!     .download_source("https://target.example/files")
//!     .destination("downloads")
//!     .build()
//!     .expect("valid config");
//!
//! assert_eq!(config.imap_port, 993);
//! ```

use crate::error::{Error, Result};
use crate::matcher::RegexMatcher;
use secrecy::{ExposeSecret, SecretString};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Default pattern used to derive a file title from the message text.
pub const DEFAULT_TITLE_PATTERN: &str = r"№\s*(?P<title>[\w.\-]+)";

/// Default number of attempts for a whole harvest pass.
pub const DEFAULT_RETRIES: u32 = 3;

/// Default IMAPS port.
pub const DEFAULT_IMAP_PORT: u16 = 993;

/// Validated, immutable configuration of one run.
///
/// Create using [`HarvestConfig::builder()`].
///
/// The `password` field is stored as a [`SecretString`] to prevent
/// accidental logging of credentials.
#[derive(Clone)]
pub struct HarvestConfig {
    user: String,
    password: SecretString,
    /// IMAP server hostname.
    pub imap_host: String,
    /// IMAP server port (default: 993).
    pub imap_port: u16,
    /// Whether to wrap the connection in TLS (default: true).
    pub use_tls: bool,
    /// Folder path using `/` as separator. Empty means the inbox.
    pub folder: String,
    /// Host and path a link must match to be downloaded.
    pub target: DownloadTarget,
    /// Base directory for downloaded files.
    pub destination: PathBuf,
    /// Place downloads in a `yyyy.MM.dd` subfolder of [`destination`](Self::destination).
    pub group_by_date: bool,
    /// Open the destination folder in the file browser after a successful run.
    pub reveal_on_finish: bool,
    /// Flag harvested messages as seen once they have been processed.
    pub mark_seen: bool,
    /// Treat exhausted retries as a fatal failure.
    pub strict: bool,
    /// Maximum number of attempts of a whole pass (at least 1).
    pub retries: u32,
    /// Timeout configuration.
    pub timeouts: TimeoutConfig,
    title_matcher: RegexMatcher,
}

impl std::fmt::Debug for HarvestConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HarvestConfig")
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("imap_host", &self.imap_host)
            .field("imap_port", &self.imap_port)
            .field("use_tls", &self.use_tls)
            .field("folder", &self.folder)
            .field("target", &self.target)
            .field("destination", &self.destination)
            .field("group_by_date", &self.group_by_date)
            .field("reveal_on_finish", &self.reveal_on_finish)
            .field("mark_seen", &self.mark_seen)
            .field("strict", &self.strict)
            .field("retries", &self.retries)
            .field("timeouts", &self.timeouts)
            .field("title_pattern", &self.title_matcher.pattern())
            .finish()
    }
}

impl HarvestConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> HarvestConfigBuilder {
        HarvestConfigBuilder::default()
    }

    /// Returns the login user name.
    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Returns the password as a string slice.
    ///
    /// The password is intentionally not directly accessible to prevent accidental logging.
    #[must_use]
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }

    /// Returns the matcher used to derive titles from message text.
    #[must_use]
    pub fn title_matcher(&self) -> &RegexMatcher {
        &self.title_matcher
    }

    /// Returns the full IMAP server address as "host:port".
    #[must_use]
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.imap_host, self.imap_port)
    }
}

/// The site a download link must point at.
///
/// Only host and path take part in matching; scheme, query and fragment are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTarget {
    url: Url,
}

impl DownloadTarget {
    /// Parses a target such as `https://target.example/files` or `target.example/files`.
    ///
    /// A missing scheme is treated as `https`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDownloadSource`] if the value is not a URL with a host.
    pub fn parse(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        let candidate = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("https://{trimmed}")
        };

        let url = Url::parse(&candidate).map_err(|source| Error::InvalidDownloadSource {
            value: value.to_string(),
            source,
        })?;

        if url.host_str().is_none() {
            return Err(Error::InvalidDownloadSource {
                value: value.to_string(),
                source: url::ParseError::EmptyHost,
            });
        }

        Ok(Self { url })
    }

    /// Host the link must point at.
    #[must_use]
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    /// Absolute path the link must point at.
    #[must_use]
    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Returns `true` if `candidate` has the same host and path, ignoring ASCII case.
    #[must_use]
    pub fn matches(&self, candidate: &Url) -> bool {
        candidate
            .host_str()
            .is_some_and(|host| host.eq_ignore_ascii_case(self.host()))
            && candidate.path().eq_ignore_ascii_case(self.path())
    }
}

impl std::fmt::Display for DownloadTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.host(), self.path())
    }
}

/// Timeout configuration for network operations.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Timeout for establishing the TCP/TLS connection.
    pub connect: Duration,
    /// Timeout for IMAP authentication.
    pub auth: Duration,
    /// Timeout for a single IMAP command (LIST, SELECT, SEARCH, FETCH, STORE).
    pub command: Duration,
    /// Timeout for logout.
    pub logout: Duration,
    /// Timeout for connecting to the download server.
    pub download_connect: Duration,
}

impl TimeoutConfig {
    /// Uses the same timeout for every network operation.
    #[must_use]
    pub fn uniform(timeout: Duration) -> Self {
        Self {
            connect: timeout,
            auth: timeout,
            command: timeout,
            logout: timeout,
            download_connect: timeout,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            auth: Duration::from_secs(30),
            command: Duration::from_secs(30),
            logout: Duration::from_secs(5),
            download_connect: Duration::from_secs(30),
        }
    }
}

/// Builder for [`HarvestConfig`].
#[derive(Debug, Default)]
pub struct HarvestConfigBuilder {
    user: Option<String>,
    password: Option<String>,
    imap_host: Option<String>,
    imap_port: Option<u16>,
    use_tls: Option<bool>,
    folder: Option<String>,
    download_source: Option<String>,
    destination: Option<PathBuf>,
    group_by_date: bool,
    reveal_on_finish: bool,
    mark_seen: Option<bool>,
    strict: bool,
    retries: Option<u32>,
    timeouts: Option<TimeoutConfig>,
    title_pattern: Option<String>,
}

impl HarvestConfigBuilder {
    /// Sets the login user name (required).
    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Sets the password (required).
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the IMAP server hostname (required).
    #[must_use]
    pub fn imap_host(mut self, host: impl Into<String>) -> Self {
        self.imap_host = Some(host.into());
        self
    }

    /// Sets the IMAP server port.
    ///
    /// Default is 993.
    #[must_use]
    pub fn imap_port(mut self, port: u16) -> Self {
        self.imap_port = Some(port);
        self
    }

    /// Enables or disables TLS. Default is enabled.
    #[must_use]
    pub fn use_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = Some(use_tls);
        self
    }

    /// Sets the folder to harvest, `/` separated. Empty means the inbox.
    #[must_use]
    pub fn folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = Some(folder.into());
        self
    }

    /// Sets the download source URL links must match (required).
    #[must_use]
    pub fn download_source(mut self, source: impl Into<String>) -> Self {
        self.download_source = Some(source.into());
        self
    }

    /// Sets the destination directory. Default is the working directory.
    #[must_use]
    pub fn destination(mut self, destination: impl Into<PathBuf>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    /// Groups downloads under a date subfolder.
    #[must_use]
    pub fn group_by_date(mut self, enabled: bool) -> Self {
        self.group_by_date = enabled;
        self
    }

    /// Opens the destination folder after a successful run with downloads.
    #[must_use]
    pub fn reveal_on_finish(mut self, enabled: bool) -> Self {
        self.reveal_on_finish = enabled;
        self
    }

    /// Controls whether processed messages are flagged as seen. Default is true.
    #[must_use]
    pub fn mark_seen(mut self, enabled: bool) -> Self {
        self.mark_seen = Some(enabled);
        self
    }

    /// Makes exhausted retries fatal.
    #[must_use]
    pub fn strict(mut self, enabled: bool) -> Self {
        self.strict = enabled;
        self
    }

    /// Sets the maximum number of attempts of a whole pass. Default is 3.
    #[must_use]
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Sets timeout configuration.
    #[must_use]
    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    /// Uses one timeout for every network operation.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeouts = Some(TimeoutConfig::uniform(timeout));
        self
    }

    /// Sets the title pattern.
    ///
    /// The named group `title` is used when present, otherwise the first capture group.
    #[must_use]
    pub fn title_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.title_pattern = Some(pattern.into());
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if required fields are missing or invalid.
    pub fn build(self) -> Result<HarvestConfig> {
        let imap_host = required(self.imap_host, "imap host")?;
        let user = required(self.user, "user name")?;

        let password = self.password.ok_or_else(|| Error::InvalidConfig {
            message: "password is required".into(),
        })?;

        let source = required(self.download_source, "download source")?;
        let target = DownloadTarget::parse(&source)?;

        let retries = self.retries.unwrap_or(DEFAULT_RETRIES);
        if retries == 0 {
            return Err(Error::InvalidConfig {
                message: "retries must be at least 1".into(),
            });
        }

        let timeouts = self.timeouts.unwrap_or_default();
        let limits = [
            ("connect", timeouts.connect),
            ("auth", timeouts.auth),
            ("command", timeouts.command),
            ("logout", timeouts.logout),
            ("download connect", timeouts.download_connect),
        ];
        if let Some((name, _)) = limits.iter().find(|(_, limit)| limit.is_zero()) {
            return Err(Error::InvalidConfig {
                message: format!("{name} timeout must be greater than zero"),
            });
        }

        let pattern = self
            .title_pattern
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TITLE_PATTERN.to_string());
        let title_matcher =
            RegexMatcher::case_insensitive(&pattern).map_err(|source| Error::InvalidTitlePattern {
                pattern: pattern.clone(),
                source,
            })?;

        Ok(HarvestConfig {
            user,
            password: SecretString::from(password),
            imap_host,
            imap_port: self.imap_port.unwrap_or(DEFAULT_IMAP_PORT),
            use_tls: self.use_tls.unwrap_or(true),
            folder: self.folder.unwrap_or_default(),
            target,
            destination: self.destination.unwrap_or_default(),
            group_by_date: self.group_by_date,
            reveal_on_finish: self.reveal_on_finish,
            mark_seen: self.mark_seen.unwrap_or(true),
            strict: self.strict,
            retries,
            timeouts,
            title_matcher,
        })
    }
}

fn required(value: Option<String>, name: &str) -> Result<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| Error::InvalidConfig {
            message: format!("{name} is required"),
        })
}
