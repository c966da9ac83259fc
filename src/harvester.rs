//! Harvesting unseen messages from a mail folder.
//!
//! [`MailHarvester::start`] connects, resolves the folder and searches for
//! unseen messages. The returned [`Harvest`] hands out HTML bodies one at a
//! time. A message is flagged as seen only when the consumer asks for the
//! next one (or the harvest runs dry), so a consumer that stops early leaves
//! the current message unseen for the next run.
//!
//! # Example
//!
//! ```no_run
//! use mail_harvest::{HarvestConfig, ImapConnector, MailHarvester};
//!
//! # async fn example(config: HarvestConfig) -> mail_harvest::Result<()> {
//! let harvester = MailHarvester::new(ImapConnector::new(config.clone()), &config.folder, true);
//! let mut harvest = harvester.start().await?;
//!
//! while let Some(message) = harvest.next().await? {
//!     println!("{} bytes of HTML", message.html.len());
//! }
//!
//! harvest.close().await?;
//! # Ok(())
//! # }
//! ```

use crate::error::Result;
use crate::mail::{MailConnector, MailSession, MessageSummary};
use chrono::{DateTime, FixedOffset};
use std::collections::VecDeque;
use tracing::{debug, error, info, instrument, warn};

/// One harvested message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestedMessage {
    /// Server UID of the message.
    pub uid: u32,
    /// Receipt timestamp, if known.
    pub date: Option<DateTime<FixedOffset>>,
    /// Decoded HTML body.
    pub html: String,
}

/// Produces [`Harvest`]s for a configured folder.
#[derive(Debug)]
pub struct MailHarvester<C> {
    connector: C,
    folder: String,
    mark_seen: bool,
}

impl<C: MailConnector> MailHarvester<C> {
    /// Creates a harvester for `folder` (`/` separated, empty for the inbox).
    ///
    /// With `mark_seen` disabled, messages are never flagged and will be
    /// harvested again on the next run.
    #[must_use]
    pub fn new(connector: C, folder: impl Into<String>, mark_seen: bool) -> Self {
        Self {
            connector,
            folder: folder.into(),
            mark_seen,
        }
    }

    /// Connects, opens the folder and collects the unseen messages.
    ///
    /// A folder that cannot be found is logged and yields an empty harvest.
    ///
    /// # Errors
    ///
    /// Returns an error if connecting, authenticating or any IMAP command fails.
    #[instrument(name = "MailHarvester::start", skip(self), fields(folder = %self.folder))]
    pub async fn start(&self) -> Result<Harvest<C::Session>> {
        info!("Connecting to mail server");
        let mut session = self.connector.connect().await?;

        match self.prepare(&mut session).await {
            Ok(pending) => Ok(Harvest {
                session: Some(session),
                pending,
                uncommitted: None,
                mark_seen: self.mark_seen,
            }),
            Err(e) => {
                if let Err(logout_err) = session.logout().await {
                    debug!(error = %logout_err, "Logout after failed start also failed");
                }
                Err(e)
            }
        }
    }

    async fn prepare(&self, session: &mut C::Session) -> Result<VecDeque<MessageSummary>> {
        let Some(folder) = self.resolve_folder(session).await? else {
            error!(folder = %self.folder, "Folder not found");
            return Ok(VecDeque::new());
        };

        session.open_folder(&folder).await?;
        info!(folder = %folder, "Fetching message list");

        let uids = session.search_unseen().await?;
        info!(unseen = uids.len(), "Unseen messages found");

        let summaries = session.fetch_summaries(&uids).await?;
        Ok(summaries.into())
    }

    /// Tries the path as given, then relative to the inbox.
    async fn resolve_folder(&self, session: &mut C::Session) -> Result<Option<String>> {
        let inbox = session.inbox_name().to_string();
        let normalized = normalize_folder_path(&self.folder);

        if normalized.is_empty() {
            return session.resolve_folder(&inbox).await;
        }

        debug!(path = %normalized, "Looking up folder");
        if let Some(folder) = session.resolve_folder(&normalized).await? {
            return Ok(Some(folder));
        }

        let under_inbox = format!("{inbox}/{normalized}");
        debug!(path = %under_inbox, "Looking up folder under inbox");
        session.resolve_folder(&under_inbox).await
    }
}

/// Splits on `/`, trims each segment and drops empty ones.
#[must_use]
pub fn normalize_folder_path(path: &str) -> String {
    path.split('/')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// A single pass over the unseen messages of one folder.
///
/// Not restartable; create a new one with [`MailHarvester::start`].
pub struct Harvest<S: MailSession> {
    session: Option<S>,
    pending: VecDeque<MessageSummary>,
    uncommitted: Option<u32>,
    mark_seen: bool,
}

impl<S: MailSession> Harvest<S> {
    /// Returns the next message with an HTML body.
    ///
    /// Calling this first commits the message returned by the previous call,
    /// flagging it as seen. Messages without an HTML body are skipped and left
    /// untouched. Returns `None` once the folder is exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if fetching a message or flagging the previous one fails.
    /// The harvest should not be resumed after an error.
    pub async fn next(&mut self) -> Result<Option<HarvestedMessage>> {
        self.commit().await?;

        let Some(session) = self.session.as_mut() else {
            return Ok(None);
        };

        while let Some(summary) = self.pending.pop_front() {
            match summary.date {
                Some(date) => info!(
                    uid = summary.uid,
                    date = %date.format("%d.%m.%Y, %H:%M:%S"),
                    "Loading message"
                ),
                None => info!(uid = summary.uid, "Loading message"),
            }

            if let Some(html) = session.fetch_html_body(summary.uid).await? {
                self.uncommitted = Some(summary.uid);
                return Ok(Some(HarvestedMessage {
                    uid: summary.uid,
                    date: summary.date,
                    html,
                }));
            }

            debug!(uid = summary.uid, "No HTML body, skipping message");
        }

        Ok(None)
    }

    /// Number of messages not yet handed out.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    /// Logs out. The last handed-out message is committed only if [`next`](Self::next)
    /// was called after it.
    ///
    /// # Errors
    ///
    /// Returns an error if the logout command fails.
    pub async fn close(mut self) -> Result<()> {
        if self.uncommitted.is_some() {
            warn!("Closing harvest with an uncommitted message; it stays unseen");
        }

        match self.session.take() {
            Some(mut session) => {
                info!("Disconnecting from mail server");
                session.logout().await
            }
            None => Ok(()),
        }
    }

    async fn commit(&mut self) -> Result<()> {
        let Some(uid) = self.uncommitted.take() else {
            return Ok(());
        };

        if !self.mark_seen {
            return Ok(());
        }

        if let Some(session) = self.session.as_mut() {
            session.mark_seen(uid).await?;
            info!(uid, "Message marked as seen");
        }

        Ok(())
    }
}

impl<S: MailSession> std::fmt::Debug for Harvest<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Harvest")
            .field("pending", &self.pending.len())
            .field("uncommitted", &self.uncommitted)
            .field("mark_seen", &self.mark_seen)
            .finish_non_exhaustive()
    }
}
