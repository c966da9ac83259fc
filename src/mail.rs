//! Mail store capability consumed by the harvester.
//!
//! [`MailConnector`] and [`MailSession`] are the narrow interface the
//! pipeline needs from a mailbox. [`ImapConnector`] implements them on top of
//! async-imap; tests substitute in-memory fakes.

use crate::config::{HarvestConfig, TimeoutConfig};
use crate::connection;
use crate::error::{Error, Result};
use crate::parser::{self, HtmlBody};
use crate::session::{self, AuthConfig, Folder, ImapSession};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use std::borrow::Cow;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, instrument};

/// Name of the inbox as defined by RFC 3501.
pub const INBOX: &str = "INBOX";

/// Summary of one message in the selected folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSummary {
    /// Server-assigned UID, stable across sessions.
    pub uid: u32,
    /// Receipt timestamp, when the server reports one.
    pub date: Option<DateTime<FixedOffset>>,
}

/// Opens authenticated sessions to a mail store.
#[async_trait]
pub trait MailConnector: Send + Sync {
    /// Session type produced by this connector.
    type Session: MailSession;

    /// Connects and authenticates.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or authentication fails.
    async fn connect(&self) -> Result<Self::Session>;
}

/// An authenticated mail store session.
#[async_trait]
pub trait MailSession: Send {
    /// Name of the inbox, used as the parent for relative folder paths.
    fn inbox_name(&self) -> &str {
        INBOX
    }

    /// Looks up a `/` separated folder path.
    ///
    /// Returns the server's name for the folder, or `None` if it does not exist.
    async fn resolve_folder(&mut self, path: &str) -> Result<Option<String>>;

    /// Opens a folder returned by [`resolve_folder`](Self::resolve_folder) for reading and writing.
    async fn open_folder(&mut self, folder: &str) -> Result<()>;

    /// Returns the UIDs of unseen messages in the open folder.
    async fn search_unseen(&mut self) -> Result<Vec<u32>>;

    /// Returns summaries for `uids`, in the same order.
    async fn fetch_summaries(&mut self, uids: &[u32]) -> Result<Vec<MessageSummary>>;

    /// Returns the decoded HTML body of a message, or `None` if it has none.
    ///
    /// Must not change the message's seen state.
    async fn fetch_html_body(&mut self, uid: u32) -> Result<Option<String>>;

    /// Flags a message as seen.
    async fn mark_seen(&mut self, uid: u32) -> Result<()>;

    /// Closes the session.
    async fn logout(&mut self) -> Result<()>;
}

/// [`MailConnector`] for IMAP servers.
#[derive(Debug, Clone)]
pub struct ImapConnector {
    config: HarvestConfig,
}

impl ImapConnector {
    /// Creates a connector using the mail settings of `config`.
    #[must_use]
    pub fn new(config: HarvestConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl MailConnector for ImapConnector {
    type Session = ImapMailSession;

    #[instrument(
        name = "ImapConnector::connect",
        skip_all,
        fields(
            user = %self.config.user(),
            imap_host = %self.config.imap_host,
            use_tls = self.config.use_tls
        )
    )]
    async fn connect(&self) -> Result<ImapMailSession> {
        let config = &self.config;
        let target_addr = config.server_address();
        let timeouts = &config.timeouts;

        let stream = tokio::time::timeout(
            timeouts.connect,
            connection::establish_connection(&config.imap_host, &target_addr, config.use_tls),
        )
        .await
        .map_err(|_| Error::ConnectTimeout {
            target: target_addr.clone(),
            timeout: timeouts.connect,
        })??;

        debug!("Connection established");

        let auth_config = AuthConfig {
            user: config.user(),
            password: config.password(),
        };

        let session = tokio::time::timeout(timeouts.auth, session::authenticate(stream, &auth_config))
            .await
            .map_err(|_| Error::AuthTimeout {
                user: config.user().to_string(),
                timeout: timeouts.auth,
            })??;

        debug!("Authenticated");

        Ok(ImapMailSession {
            session: Box::new(session),
            timeouts: timeouts.clone(),
            folders: None,
        })
    }
}

/// [`MailSession`] backed by an async-imap session.
pub struct ImapMailSession {
    session: Box<ImapSession>,
    timeouts: TimeoutConfig,
    folders: Option<Vec<Folder>>,
}

impl ImapMailSession {
    /// Folder list, fetched once per session.
    async fn folders(&mut self) -> Result<&[Folder]> {
        if self.folders.is_none() {
            let folders = timed(
                self.timeouts.command,
                "LIST",
                session::list_all_folders(&mut self.session),
            )
            .await?;
            debug!(count = folders.len(), "Folder list cached");
            self.folders = Some(folders);
        }

        Ok(self.folders.as_deref().unwrap_or_default())
    }
}

/// Returns the server name of the folder at `/` separated `path`, if listed.
///
/// Each candidate is compared using its own delimiter. The `INBOX` prefix is
/// case-insensitive.
fn find_folder<'a>(folders: &'a [Folder], path: &str) -> Option<&'a Folder> {
    folders.iter().find(|folder| {
        let delimiter = folder.delimiter.as_deref();
        let server_path = match delimiter {
            Some(d) if d != "/" => path.replace('/', d),
            _ => path.to_string(),
        };
        let encoded = utf7_imap::encode_utf7_imap(server_path);
        canonical_inbox(&folder.name, delimiter) == canonical_inbox(&encoded, delimiter)
    })
}

fn canonical_inbox<'a>(name: &'a str, delimiter: Option<&str>) -> Cow<'a, str> {
    let is_inbox = name
        .get(..INBOX.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(INBOX));
    if !is_inbox {
        return Cow::Borrowed(name);
    }

    let rest = &name[INBOX.len()..];
    if rest.is_empty() || delimiter.is_some_and(|d| rest.starts_with(d)) {
        Cow::Owned(format!("{INBOX}{rest}"))
    } else {
        Cow::Borrowed(name)
    }
}

#[async_trait]
impl MailSession for ImapMailSession {
    async fn resolve_folder(&mut self, path: &str) -> Result<Option<String>> {
        let folders = self.folders().await?;
        Ok(find_folder(folders, path).map(|folder| folder.name.clone()))
    }

    async fn open_folder(&mut self, folder: &str) -> Result<()> {
        timed(
            self.timeouts.command,
            "SELECT",
            session::select_mailbox(&mut self.session, folder),
        )
        .await
    }

    async fn search_unseen(&mut self) -> Result<Vec<u32>> {
        timed(
            self.timeouts.command,
            "SEARCH",
            session::search_unseen(&mut self.session),
        )
        .await
    }

    async fn fetch_summaries(&mut self, uids: &[u32]) -> Result<Vec<MessageSummary>> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }

        let uid_set = uids
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",");

        let dates: HashMap<u32, Option<DateTime<FixedOffset>>> = timed(
            self.timeouts.command,
            "FETCH",
            session::fetch_internal_dates(&mut self.session, &uid_set),
        )
        .await?
        .into_iter()
        .collect();

        // Messages expunged since the search simply drop out.
        Ok(uids
            .iter()
            .filter_map(|uid| {
                dates.get(uid).map(|date| MessageSummary {
                    uid: *uid,
                    date: *date,
                })
            })
            .collect())
    }

    async fn fetch_html_body(&mut self, uid: u32) -> Result<Option<String>> {
        let raw = timed(
            self.timeouts.command,
            "FETCH",
            session::fetch_message(&mut self.session, uid),
        )
        .await?;

        let Some(raw) = raw else {
            debug!(uid, "Message disappeared before fetch");
            return Ok(None);
        };

        match parser::extract_html_body(uid, &raw) {
            HtmlBody::Found(body) => Ok(Some(body)),
            HtmlBody::Missing | HtmlBody::ParseError => Ok(None),
        }
    }

    async fn mark_seen(&mut self, uid: u32) -> Result<()> {
        timed(
            self.timeouts.command,
            "STORE",
            session::add_seen_flag(&mut self.session, uid),
        )
        .await
    }

    async fn logout(&mut self) -> Result<()> {
        let timeout = self.timeouts.logout;
        timed(timeout, "LOGOUT", session::logout(&mut self.session)).await
    }
}

impl std::fmt::Debug for ImapMailSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapMailSession")
            .field("timeouts", &self.timeouts)
            .field("folders", &self.folders.as_ref().map(Vec::len))
            .finish_non_exhaustive()
    }
}

/// Bounds an IMAP command by `timeout`.
async fn timed<T>(
    timeout: Duration,
    command: &'static str,
    operation: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(timeout, operation)
        .await
        .map_err(|_| Error::CommandTimeout { command, timeout })?
}
