//! In-memory mail store and scripted IMAP server used by unit tests.

use crate::error::{Error, Result};
use crate::mail::{MailConnector, MailSession, MessageSummary, INBOX};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug)]
struct FakeMessage {
    uid: u32,
    folder: String,
    html: Option<String>,
    seen: bool,
}

#[derive(Debug, Default)]
struct State {
    folders: Vec<String>,
    messages: Vec<FakeMessage>,
    connect_failures: u32,
    connects: u32,
    logouts: u32,
    failing_fetch: Option<u32>,
    events: Vec<String>,
}

/// Shared mailbox; clones observe the same state.
#[derive(Debug, Clone)]
pub(crate) struct FakeMailbox {
    state: Arc<Mutex<State>>,
}

impl FakeMailbox {
    pub(crate) fn new() -> Self {
        let state = State {
            folders: vec![INBOX.to_string()],
            ..State::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub(crate) fn add_folder(&self, name: &str) {
        self.lock().folders.push(name.to_string());
    }

    pub(crate) fn add_message(&self, folder: &str, uid: u32, html: Option<&str>) {
        self.push(folder, uid, html, false);
    }

    pub(crate) fn add_seen_message(&self, folder: &str, uid: u32, html: Option<&str>) {
        self.push(folder, uid, html, true);
    }

    fn push(&self, folder: &str, uid: u32, html: Option<&str>, seen: bool) {
        self.lock().messages.push(FakeMessage {
            uid,
            folder: folder.to_string(),
            html: html.map(str::to_string),
            seen,
        });
    }

    pub(crate) fn is_seen(&self, uid: u32) -> bool {
        self.lock()
            .messages
            .iter()
            .any(|m| m.uid == uid && m.seen)
    }

    pub(crate) fn fail_next_connects(&self, count: u32) {
        self.lock().connect_failures = count;
    }

    pub(crate) fn fail_fetch_of(&self, uid: u32) {
        self.lock().failing_fetch = Some(uid);
    }

    pub(crate) fn connects(&self) -> u32 {
        self.lock().connects
    }

    pub(crate) fn logouts(&self) -> u32 {
        self.lock().logouts
    }

    /// `fetch:<uid>` and `seen:<uid>` entries in call order.
    pub(crate) fn events(&self) -> Vec<String> {
        self.lock().events.clone()
    }
}

#[async_trait]
impl MailConnector for FakeMailbox {
    type Session = FakeSession;

    async fn connect(&self) -> Result<FakeSession> {
        let mut state = self.lock();
        state.connects += 1;
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(Error::TcpConnect {
                target: "fake:993".into(),
                source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
            });
        }

        Ok(FakeSession {
            mailbox: self.clone(),
            selected: None,
        })
    }
}

#[derive(Debug)]
pub(crate) struct FakeSession {
    mailbox: FakeMailbox,
    selected: Option<String>,
}

#[async_trait]
impl MailSession for FakeSession {
    async fn resolve_folder(&mut self, path: &str) -> Result<Option<String>> {
        Ok(self
            .mailbox
            .lock()
            .folders
            .iter()
            .find(|f| f.as_str() == path)
            .cloned())
    }

    async fn open_folder(&mut self, folder: &str) -> Result<()> {
        self.selected = Some(folder.to_string());
        Ok(())
    }

    async fn search_unseen(&mut self) -> Result<Vec<u32>> {
        let selected = self.selected.clone().unwrap_or_default();
        Ok(self
            .mailbox
            .lock()
            .messages
            .iter()
            .filter(|m| m.folder == selected && !m.seen)
            .map(|m| m.uid)
            .collect())
    }

    async fn fetch_summaries(&mut self, uids: &[u32]) -> Result<Vec<MessageSummary>> {
        Ok(uids
            .iter()
            .map(|&uid| MessageSummary { uid, date: None })
            .collect())
    }

    async fn fetch_html_body(&mut self, uid: u32) -> Result<Option<String>> {
        let mut state = self.mailbox.lock();
        if state.failing_fetch == Some(uid) {
            return Err(Error::CommandTimeout {
                command: "FETCH",
                timeout: std::time::Duration::from_secs(1),
            });
        }
        state.events.push(format!("fetch:{uid}"));
        Ok(state
            .messages
            .iter()
            .find(|m| m.uid == uid)
            .and_then(|m| m.html.clone()))
    }

    async fn mark_seen(&mut self, uid: u32) -> Result<()> {
        let mut state = self.mailbox.lock();
        state.events.push(format!("seen:{uid}"));
        if let Some(message) = state.messages.iter_mut().find(|m| m.uid == uid) {
            message.seen = true;
        }
        Ok(())
    }

    async fn logout(&mut self) -> Result<()> {
        self.mailbox.lock().logouts += 1;
        Ok(())
    }
}

/// Plain-TCP IMAP server answering from a fixed script.
///
/// Records every command it receives with the tag stripped. A LIST with any
/// pattern other than `*` gets BAD.
#[derive(Debug)]
pub(crate) struct ScriptedImapServer {
    port: u16,
    script: Arc<Script>,
}

#[derive(Debug)]
struct Script {
    folders: Vec<(String, String)>,
    messages: Vec<(u32, String)>,
    seen: Mutex<Vec<u32>>,
    commands: Mutex<Vec<String>>,
}

impl ScriptedImapServer {
    /// `folders` are `(delimiter, name)` pairs; `messages` are `(uid, raw)` pairs
    /// shared by every folder.
    pub(crate) async fn start(folders: &[(&str, &str)], messages: &[(u32, &str)]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let script = Arc::new(Script {
            folders: folders
                .iter()
                .map(|(d, n)| ((*d).to_string(), (*n).to_string()))
                .collect(),
            messages: messages
                .iter()
                .map(|(uid, raw)| (*uid, (*raw).to_string()))
                .collect(),
            seen: Mutex::default(),
            commands: Mutex::default(),
        });

        let shared = Arc::clone(&script);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(serve(socket, Arc::clone(&shared)));
            }
        });

        Self { port, script }
    }

    pub(crate) fn port(&self) -> u16 {
        self.port
    }

    pub(crate) fn commands(&self) -> Vec<String> {
        self.script.commands.lock().unwrap().clone()
    }

    pub(crate) fn is_seen(&self, uid: u32) -> bool {
        self.script.seen.lock().unwrap().contains(&uid)
    }
}

async fn serve(socket: TcpStream, script: Arc<Script>) {
    let (read, mut write) = socket.into_split();
    let mut lines = BufReader::new(read).lines();
    write.write_all(b"* OK IMAP4rev1 ready\r\n").await.unwrap();

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim_end_matches('\r');
        let (tag, command) = line.split_once(' ').unwrap_or((line, ""));
        script.commands.lock().unwrap().push(command.to_string());

        let (untagged, status) = script.reply(command);
        let mut out = untagged.into_bytes();
        out.extend_from_slice(format!("{tag} {status}\r\n").as_bytes());
        if write.write_all(&out).await.is_err() || command == "LOGOUT" {
            break;
        }
    }
}

impl Script {
    fn reply(&self, command: &str) -> (String, &'static str) {
        if command.starts_with("LOGIN ") {
            return (String::new(), "OK LOGIN completed");
        }
        if command == "LIST \"\" *" {
            let listing = self
                .folders
                .iter()
                .map(|(d, n)| format!("* LIST () \"{d}\" \"{n}\"\r\n"))
                .collect();
            return (listing, "OK LIST completed");
        }
        if command.starts_with("LIST ") {
            return (String::new(), "BAD malformed LIST");
        }
        if let Some(mailbox) = command.strip_prefix("SELECT ") {
            let mailbox = mailbox.trim_matches('"');
            if self.folders.iter().any(|(_, n)| n == mailbox) {
                let untagged = format!("* {} EXISTS\r\n* FLAGS (\\Seen)\r\n", self.messages.len());
                return (untagged, "OK [READ-WRITE] SELECT completed");
            }
            return (String::new(), "NO no such mailbox");
        }
        if command == "UID SEARCH UNSEEN" {
            let seen = self.seen.lock().unwrap();
            let untagged = self
                .messages
                .iter()
                .rev()
                .filter(|(uid, _)| !seen.contains(uid))
                .fold("* SEARCH".to_string(), |line, (uid, _)| format!("{line} {uid}"));
            return (format!("{untagged}\r\n"), "OK SEARCH completed");
        }
        if let Some(set) = command
            .strip_prefix("UID FETCH ")
            .and_then(|rest| rest.strip_suffix(" (UID INTERNALDATE)"))
        {
            let untagged = set
                .split(',')
                .enumerate()
                .map(|(i, uid)| {
                    format!(
                        "* {} FETCH (UID {uid} INTERNALDATE \"01-May-2024 10:00:00 +0000\")\r\n",
                        i + 1
                    )
                })
                .collect();
            return (untagged, "OK FETCH completed");
        }
        if let Some(uid) = command
            .strip_prefix("UID FETCH ")
            .and_then(|rest| rest.strip_suffix(" (UID BODY.PEEK[])"))
        {
            let raw = self
                .messages
                .iter()
                .find(|(u, _)| u.to_string() == uid)
                .map(|(_, raw)| raw.as_str())
                .unwrap_or_default();
            let untagged = format!("* 1 FETCH (UID {uid} BODY[] {{{}}}\r\n{raw})\r\n", raw.len());
            return (untagged, "OK FETCH completed");
        }
        if let Some(uid) = command
            .strip_prefix("UID STORE ")
            .and_then(|rest| rest.strip_suffix(" +FLAGS (\\Seen)"))
        {
            if let Ok(uid) = uid.parse() {
                self.seen.lock().unwrap().push(uid);
            }
            return (format!("* 1 FETCH (UID {uid} FLAGS (\\Seen))\r\n"), "OK STORE completed");
        }
        if command == "LOGOUT" {
            return ("* BYE logging out\r\n".to_string(), "OK LOGOUT completed");
        }
        (String::new(), "BAD unknown command")
    }
}
