//! Error types for the mail-harvest crate.
//!
//! All errors implement [`std::error::Error`] and provide context about what went wrong.
//! Errors are categorized by their retryability - see [`Error::is_retryable`].

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while harvesting mail and downloading files.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    // ─────────────────────────────────────────────────────────────────────────
    // Configuration / validation errors (NOT retryable)
    // ─────────────────────────────────────────────────────────────────────────
    /// Invalid configuration provided.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration error.
        message: String,
    },

    /// The title pattern is not a valid regular expression.
    #[error("invalid title pattern '{pattern}'")]
    InvalidTitlePattern {
        /// The rejected pattern.
        pattern: String,
        /// The underlying regex error.
        #[source]
        source: regex::Error,
    },

    /// The download source is not a valid URL.
    #[error("invalid download source '{value}'")]
    InvalidDownloadSource {
        /// The rejected value.
        value: String,
        /// The underlying URL parse error.
        #[source]
        source: url::ParseError,
    },

    /// The configuration file could not be read.
    #[error("failed to read configuration file {}", path.display())]
    ConfigFile {
        /// Path of the configuration file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for the expected shape.
    #[error("malformed configuration file {}", path.display())]
    ConfigFormat {
        /// Path of the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Invalid DNS name for TLS.
    #[error("invalid DNS name for host '{host}'")]
    InvalidDnsName {
        /// The invalid hostname.
        host: String,
        /// The underlying DNS name error.
        #[source]
        source: rustls::client::InvalidDnsNameError,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client")]
    HttpClient {
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Network / connection errors (RETRYABLE)
    // ─────────────────────────────────────────────────────────────────────────
    /// Failed to establish TCP connection.
    #[error("failed to connect to {target}")]
    TcpConnect {
        /// The target address that failed.
        target: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to establish TLS connection.
    #[error("failed to establish TLS connection to {target}")]
    TlsConnect {
        /// The target address that failed.
        target: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Timeout errors (RETRYABLE)
    // ─────────────────────────────────────────────────────────────────────────
    /// Connection timeout.
    #[error("connection timeout to {target} after {timeout:?}")]
    ConnectTimeout {
        /// The target address.
        target: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Authentication timeout.
    #[error("authentication timeout for {user} after {timeout:?}")]
    AuthTimeout {
        /// The user name used for authentication.
        user: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// An IMAP command did not complete in time.
    #[error("IMAP {command} timeout after {timeout:?}")]
    CommandTimeout {
        /// The IMAP command that timed out.
        command: &'static str,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // IMAP protocol errors (RETRYABLE - could be transient server issues)
    // ─────────────────────────────────────────────────────────────────────────
    /// IMAP login failed.
    #[error("IMAP login failed for {user}")]
    ImapLogin {
        /// The user name used for login.
        user: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// Listing folders failed.
    #[error("failed to list folders matching '{pattern}'")]
    ListFolders {
        /// The LIST pattern sent to the server.
        pattern: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// Failed to select mailbox.
    #[error("failed to select mailbox '{mailbox}'")]
    SelectMailbox {
        /// The mailbox name.
        mailbox: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// IMAP search failed.
    #[error("IMAP search failed")]
    ImapSearch {
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// IMAP fetch failed.
    #[error("IMAP fetch failed for UID range {uid_range}")]
    ImapFetch {
        /// The UID range that failed.
        uid_range: String,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// Failed to fetch message from stream.
    #[error("failed to fetch message from stream")]
    FetchMessage {
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// Setting the seen flag failed.
    #[error("failed to mark message {uid} as seen")]
    ImapStore {
        /// UID of the message.
        uid: u32,
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    /// IMAP logout failed.
    #[error("IMAP logout failed")]
    ImapLogout {
        /// The underlying IMAP error.
        #[source]
        source: async_imap::error::Error,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Download errors (RETRYABLE at the pass level)
    // ─────────────────────────────────────────────────────────────────────────
    /// The HTTP request could not be sent or the connection failed.
    #[error("request to {url} failed")]
    HttpRequest {
        /// The requested URL.
        url: String,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("request to {url} returned status {status}")]
    HttpStatus {
        /// The requested URL.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// Reading the response body failed midway.
    #[error("failed while streaming {url}")]
    DownloadStream {
        /// The requested URL.
        url: String,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Filesystem errors
    // ─────────────────────────────────────────────────────────────────────────
    /// The destination file appeared between naming and creation.
    #[error("destination already exists: {}", path.display())]
    DestinationExists {
        /// The path that was taken.
        path: PathBuf,
    },

    /// The destination directory could not be created.
    #[error("failed to create directory {}", path.display())]
    CreateDirectory {
        /// The directory path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The destination file could not be created.
    #[error("failed to create file {}", path.display())]
    CreateFile {
        /// The file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Writing the destination file failed.
    #[error("failed to write file {}", path.display())]
    WriteFile {
        /// The file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Returns `true` if this error represents a transient failure that might succeed on retry.
    ///
    /// The orchestrator retries every failed pass; this classification is
    /// reported alongside the failure so operators can tell transient
    /// problems from permanent ones.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::TcpConnect { .. }
            | Error::TlsConnect { .. }
            | Error::ConnectTimeout { .. }
            | Error::AuthTimeout { .. }
            | Error::CommandTimeout { .. }
            | Error::ImapLogin { .. }
            | Error::ListFolders { .. }
            | Error::SelectMailbox { .. }
            | Error::ImapSearch { .. }
            | Error::ImapFetch { .. }
            | Error::FetchMessage { .. }
            | Error::ImapStore { .. }
            | Error::HttpRequest { .. }
            | Error::HttpStatus { .. }
            | Error::DownloadStream { .. }
            | Error::DestinationExists { .. }
            | Error::WriteFile { .. } => true,

            Error::InvalidConfig { .. }
            | Error::InvalidTitlePattern { .. }
            | Error::InvalidDownloadSource { .. }
            | Error::ConfigFile { .. }
            | Error::ConfigFormat { .. }
            | Error::InvalidDnsName { .. }
            | Error::HttpClient { .. }
            | Error::ImapLogout { .. }
            | Error::CreateDirectory { .. }
            | Error::CreateFile { .. } => false,
        }
    }

    /// Returns the error category for logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidConfig { .. }
            | Error::InvalidTitlePattern { .. }
            | Error::InvalidDownloadSource { .. }
            | Error::ConfigFile { .. }
            | Error::ConfigFormat { .. }
            | Error::InvalidDnsName { .. }
            | Error::HttpClient { .. } => ErrorCategory::Configuration,

            Error::TcpConnect { .. } | Error::TlsConnect { .. } => ErrorCategory::Network,

            Error::ConnectTimeout { .. }
            | Error::AuthTimeout { .. }
            | Error::CommandTimeout { .. } => ErrorCategory::Timeout,

            Error::ImapLogin { .. }
            | Error::ListFolders { .. }
            | Error::SelectMailbox { .. }
            | Error::ImapSearch { .. }
            | Error::ImapFetch { .. }
            | Error::FetchMessage { .. }
            | Error::ImapStore { .. }
            | Error::ImapLogout { .. } => ErrorCategory::Protocol,

            Error::HttpRequest { .. } | Error::HttpStatus { .. } | Error::DownloadStream { .. } => {
                ErrorCategory::Download
            }

            Error::DestinationExists { .. }
            | Error::CreateDirectory { .. }
            | Error::CreateFile { .. }
            | Error::WriteFile { .. } => ErrorCategory::Filesystem,
        }
    }
}

/// Error categories for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Configuration or validation errors.
    Configuration,
    /// Network connectivity errors.
    Network,
    /// Timeout errors.
    Timeout,
    /// IMAP protocol errors.
    Protocol,
    /// HTTP download errors.
    Download,
    /// Local filesystem errors.
    Filesystem,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Network => write!(f, "network"),
            ErrorCategory::Timeout => write!(f, "timeout"),
            ErrorCategory::Protocol => write!(f, "protocol"),
            ErrorCategory::Download => write!(f, "download"),
            ErrorCategory::Filesystem => write!(f, "filesystem"),
        }
    }
}
