//! Internal IMAP session management.
//!
//! This module wraps async-imap operations with proper error handling.

use crate::connection::MailStream;
use crate::error::{Error, Result};
use async_imap::types::Name;
use async_imap::Session;
use chrono::{DateTime, FixedOffset};
use futures::{StreamExt, TryStreamExt};
use tracing::{debug, instrument};

/// Type alias for an IMAP session over the mail transport.
pub(crate) type ImapSession = Session<MailStream>;

/// Authentication configuration for IMAP.
pub(crate) struct AuthConfig<'a> {
    pub user: &'a str,
    pub password: &'a str,
}

/// Authenticates to IMAP server and returns a session.
#[instrument(
    name = "session::authenticate",
    skip_all,
    fields(user = %config.user)
)]
pub(crate) async fn authenticate(stream: MailStream, config: &AuthConfig<'_>) -> Result<ImapSession> {
    let client = async_imap::Client::new(stream);

    debug!("Authenticating to IMAP server");

    client
        .login(config.user, config.password)
        .await
        .map_err(|e| Error::ImapLogin {
            user: config.user.to_string(),
            source: e.0,
        })
}

/// A folder as reported by LIST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Folder {
    /// Server name, modified UTF-7 encoded.
    pub name: String,
    /// Hierarchy delimiter of this folder; `None` for a flat namespace.
    pub delimiter: Option<String>,
}

/// Lists every folder on the server with `LIST "" *`.
///
/// Matching happens client side, so folder names never have to be sent as
/// LIST patterns.
#[instrument(name = "session::list", skip(session))]
pub(crate) async fn list_all_folders(session: &mut ImapSession) -> Result<Vec<Folder>> {
    let map_err = |source| Error::ListFolders {
        pattern: "*".to_string(),
        source,
    };

    let names: Vec<Name> = session
        .list(Some(""), Some("*"))
        .await
        .map_err(map_err)?
        .try_collect()
        .await
        .map_err(map_err)?;

    debug!(count = names.len(), "Listed folders");

    Ok(names
        .iter()
        .map(|name| Folder {
            name: name.name().to_string(),
            delimiter: name.delimiter().map(str::to_string),
        })
        .collect())
}

/// Selects a mailbox in read-write mode.
#[instrument(name = "session::select", skip(session), fields(mailbox = %mailbox))]
pub(crate) async fn select_mailbox(session: &mut ImapSession, mailbox: &str) -> Result<()> {
    debug!("Selecting mailbox");

    let selected = session
        .select(mailbox)
        .await
        .map_err(|source| Error::SelectMailbox {
            mailbox: mailbox.to_string(),
            source,
        })?;

    debug!(exists = selected.exists, "Mailbox selected");

    Ok(())
}

/// Searches for UIDs of messages without the `\Seen` flag.
///
/// async-imap hands the result back as a set, so the UIDs are sorted
/// ascending here to give a stable processing order.
#[instrument(name = "session::search_unseen", skip(session))]
pub(crate) async fn search_unseen(session: &mut ImapSession) -> Result<Vec<u32>> {
    let uids = session
        .uid_search("UNSEEN")
        .await
        .map_err(|source| Error::ImapSearch { source })?;

    let mut uids_vec: Vec<u32> = uids.into_iter().collect();
    uids_vec.sort_unstable();

    debug!(uid_count = uids_vec.len(), "Found unseen messages");

    Ok(uids_vec)
}

/// Fetches the internal (receipt) date of each message in `uid_set`.
#[instrument(name = "session::fetch_dates", skip(session), fields(uid_set = %uid_set))]
pub(crate) async fn fetch_internal_dates(
    session: &mut ImapSession,
    uid_set: &str,
) -> Result<Vec<(u32, Option<DateTime<FixedOffset>>)>> {
    let mut stream = session
        .uid_fetch(uid_set, "(UID INTERNALDATE)")
        .await
        .map_err(|source| Error::ImapFetch {
            uid_range: uid_set.to_string(),
            source,
        })?
        .boxed();

    let mut dates = Vec::new();
    while let Some(fetch) = stream.next().await {
        let fetch = fetch.map_err(|source| Error::FetchMessage { source })?;
        if let Some(uid) = fetch.uid {
            dates.push((uid, fetch.internal_date()));
        }
    }

    Ok(dates)
}

/// Fetches the full RFC 822 source of one message without setting `\Seen`.
#[instrument(name = "session::fetch_message", skip(session))]
pub(crate) async fn fetch_message(session: &mut ImapSession, uid: u32) -> Result<Option<Vec<u8>>> {
    let uid_str = uid.to_string();

    let mut stream = session
        .uid_fetch(&uid_str, "(UID BODY.PEEK[])")
        .await
        .map_err(|source| Error::ImapFetch {
            uid_range: uid_str.clone(),
            source,
        })?
        .boxed();

    let mut raw = None;
    while let Some(fetch) = stream.next().await {
        let fetch = fetch.map_err(|source| Error::FetchMessage { source })?;
        if fetch.uid == Some(uid) {
            raw = fetch.body().map(<[u8]>::to_vec);
        }
    }

    Ok(raw)
}

/// Adds the `\Seen` flag to one message.
#[instrument(name = "session::mark_seen", skip(session))]
pub(crate) async fn add_seen_flag(session: &mut ImapSession, uid: u32) -> Result<()> {
    let map_err = |source| Error::ImapStore { uid, source };

    let _updates: Vec<_> = session
        .uid_store(uid.to_string(), "+FLAGS (\\Seen)")
        .await
        .map_err(map_err)?
        .try_collect()
        .await
        .map_err(map_err)?;

    Ok(())
}

/// Logs out from IMAP session.
#[instrument(name = "session::logout", skip(session))]
pub(crate) async fn logout(session: &mut ImapSession) -> Result<()> {
    debug!("Logging out");

    session
        .logout()
        .await
        .map_err(|source| Error::ImapLogout { source })?;

    Ok(())
}
