//! Integration tests for mail-harvest.
//!
//! Tests against a real IMAP server are ignored by default. To run them:
//!
//! ```bash
//! # Set environment variables (or put them in .env)
//! export MAIL_HARVEST_TEST_HOST="imap.example.com"
//! export MAIL_HARVEST_TEST_USER="robot@example.com"
//! export MAIL_HARVEST_TEST_PASSWORD="your-app-password"
//!
//! # Optional
//! export MAIL_HARVEST_TEST_FOLDER="Notifications"
//! export MAIL_HARVEST_TEST_SOURCE="https://target.example/files"
//!
//! # Run with the integration-tests feature
//! cargo test --features integration-tests -- --ignored
//! ```
//!
//! The remaining tests run offline against an in-memory mailbox and a local
//! HTTP server.

use async_trait::async_trait;
use mail_harvest::mail::MessageSummary;
use mail_harvest::{
    HarvestConfig, HttpDownloader, ImapConnector, MailConnector, MailHarvester, MailSession,
    Orchestrator, Result, RevealDestination, RunOutcome,
};
use std::collections::HashSet;
use std::env;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ─────────────────────────────────────────────────────────────────────────────
// Test Configuration Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn get_test_config() -> Option<HarvestConfig> {
    dotenvy::dotenv().ok();
    let host = env::var("MAIL_HARVEST_TEST_HOST").ok()?;
    let user = env::var("MAIL_HARVEST_TEST_USER").ok()?;
    let password = env::var("MAIL_HARVEST_TEST_PASSWORD").ok()?;
    let folder = env::var("MAIL_HARVEST_TEST_FOLDER").unwrap_or_default();
    let source = env::var("MAIL_HARVEST_TEST_SOURCE")
        .unwrap_or_else(|_| "https://target.example/files".to_string());

    HarvestConfig::builder()
        .imap_host(host)
        .user(user)
        .password(password)
        .folder(folder)
        .download_source(source)
        .mark_seen(false)
        .retries(1)
        .timeout(Duration::from_secs(20))
        .build()
        .ok()
}

struct NoReveal;

impl RevealDestination for NoReveal {
    fn reveal(&self, _dir: &Path) -> std::io::Result<()> {
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Real Server Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
#[ignore = "requires real IMAP server"]
async fn test_connect_and_logout() {
    let config = get_test_config().expect("Test config from environment variables");

    let mut session = ImapConnector::new(config)
        .connect()
        .await
        .expect("Failed to connect");

    let inbox = session.inbox_name().to_string();
    let resolved = session.resolve_folder(&inbox).await.expect("LIST failed");
    assert!(resolved.is_some(), "inbox must always exist");

    session.logout().await.expect("Failed to logout");
}

#[tokio::test]
#[ignore = "requires real IMAP server"]
async fn test_harvest_without_marking() {
    let config = get_test_config().expect("Test config from environment variables");

    let harvester = MailHarvester::new(ImapConnector::new(config.clone()), config.folder, false);
    let mut harvest = harvester.start().await.expect("Failed to start harvest");

    let mut uids = HashSet::new();
    while let Some(message) = harvest.next().await.expect("Failed to fetch message") {
        assert!(uids.insert(message.uid), "uid handed out twice");
        assert!(!message.html.is_empty());
    }

    harvest.close().await.expect("Failed to logout");
}

#[tokio::test]
#[ignore = "requires real IMAP server"]
async fn test_full_run_without_marking() {
    let config = get_test_config().expect("Test config from environment variables");
    let dest = tempfile::tempdir().unwrap();
    let config = HarvestConfig::builder()
        .imap_host(config.imap_host.clone())
        .user(config.user())
        .password(config.password())
        .folder(config.folder.clone())
        .download_source(config.target.to_string())
        .destination(dest.path())
        .mark_seen(false)
        .retries(1)
        .build()
        .unwrap();

    let downloader = HttpDownloader::new(config.timeouts.download_connect).unwrap();
    let outcome = Orchestrator::new(&config, ImapConnector::new(config.clone()), downloader)
        .with_revealer(NoReveal)
        .run(&CancellationToken::new())
        .await;

    match outcome {
        RunOutcome::Succeeded(report) => println!("Run report: {report:?}"),
        other => println!("Run did not succeed: {other:?}"),
    }
}

#[tokio::test]
#[ignore = "requires intentionally wrong credentials"]
async fn test_invalid_credentials() {
    dotenvy::dotenv().ok();
    let host = env::var("MAIL_HARVEST_TEST_HOST").expect("MAIL_HARVEST_TEST_HOST");
    let config = HarvestConfig::builder()
        .imap_host(host)
        .user("nobody@example.com")
        .password("wrong-password")
        .download_source("target.example/files")
        .build()
        .expect("valid config structure");

    let result = ImapConnector::new(config).connect().await;

    let err = result.expect_err("login must fail");
    println!("Connection error: {err}");
    println!("Category: {}", err.category());
}

// ─────────────────────────────────────────────────────────────────────────────
// Offline End-to-End Tests
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct MemoryMailbox {
    messages: Arc<Mutex<Vec<(u32, String, bool)>>>,
}

impl MemoryMailbox {
    fn add(&self, uid: u32, html: &str) {
        self.messages
            .lock()
            .unwrap()
            .push((uid, html.to_string(), false));
    }

    fn is_seen(&self, uid: u32) -> bool {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .any(|(u, _, seen)| *u == uid && *seen)
    }
}

#[async_trait]
impl MailConnector for MemoryMailbox {
    type Session = MemoryMailbox;

    async fn connect(&self) -> Result<MemoryMailbox> {
        Ok(self.clone())
    }
}

#[async_trait]
impl MailSession for MemoryMailbox {
    async fn resolve_folder(&mut self, path: &str) -> Result<Option<String>> {
        Ok((path == "INBOX").then(|| path.to_string()))
    }

    async fn open_folder(&mut self, _folder: &str) -> Result<()> {
        Ok(())
    }

    async fn search_unseen(&mut self) -> Result<Vec<u32>> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, _, seen)| !seen)
            .map(|(uid, _, _)| *uid)
            .collect())
    }

    async fn fetch_summaries(&mut self, uids: &[u32]) -> Result<Vec<MessageSummary>> {
        Ok(uids
            .iter()
            .map(|&uid| MessageSummary { uid, date: None })
            .collect())
    }

    async fn fetch_html_body(&mut self, uid: u32) -> Result<Option<String>> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .find(|(u, _, _)| *u == uid)
            .map(|(_, html, _)| html.clone()))
    }

    async fn mark_seen(&mut self, uid: u32) -> Result<()> {
        for message in self.messages.lock().unwrap().iter_mut() {
            if message.0 == uid {
                message.2 = true;
            }
        }
        Ok(())
    }

    async fn logout(&mut self) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_end_to_end_download_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PK\x03\x04archive".to_vec()))
        .expect(2)
        .mount(&server)
        .await;

    let mailbox = MemoryMailbox::default();
    mailbox.add(
        1,
        &format!(
            r#"<p>Выписка № 2024.05.01</p><a href="{}/files?id=1">скачать</a>"#,
            server.uri()
        ),
    );
    mailbox.add(
        2,
        &format!(
            r#"<p>Выписка № 2024.05.01</p><a href="{}/files?id=2">скачать</a>"#,
            server.uri()
        ),
    );

    let dest = tempfile::tempdir().unwrap();
    let config = HarvestConfig::builder()
        .imap_host("imap.example.com")
        .user("robot@example.com")
        .password("secret")
        .download_source(format!("{}/files", server.uri()))
        .destination(dest.path())
        .build()
        .unwrap();

    let downloader = HttpDownloader::new(Duration::from_secs(5)).unwrap();
    let outcome = Orchestrator::new(&config, mailbox.clone(), downloader)
        .with_revealer(NoReveal)
        .run(&CancellationToken::new())
        .await;

    let RunOutcome::Succeeded(report) = outcome else {
        panic!("run failed: {outcome:?}");
    };
    assert_eq!(report.downloads.len(), 2);
    assert_eq!(
        std::fs::read(dest.path().join("2024.05.01.zip")).unwrap(),
        b"PK\x03\x04archive"
    );
    assert!(dest.path().join("2024.05.01 (1).zip").exists());
    assert!(mailbox.is_seen(1));
    assert!(mailbox.is_seen(2));
}

#[tokio::test]
async fn test_http_error_exhausts_retries_and_keeps_message_unseen() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let mailbox = MemoryMailbox::default();
    mailbox.add(7, &format!(r#"<a href="{}/files">x</a>"#, server.uri()));

    let dest = tempfile::tempdir().unwrap();
    let config = HarvestConfig::builder()
        .imap_host("imap.example.com")
        .user("robot@example.com")
        .password("secret")
        .download_source(format!("{}/files", server.uri()))
        .destination(dest.path())
        .retries(2)
        .build()
        .unwrap();

    let downloader = HttpDownloader::new(Duration::from_secs(5)).unwrap();
    let outcome = Orchestrator::new(&config, mailbox.clone(), downloader)
        .with_revealer(NoReveal)
        .run(&CancellationToken::new())
        .await;

    assert!(matches!(
        outcome,
        RunOutcome::ExhaustedRetries { attempts: 2, .. }
    ));
    assert!(!mailbox.is_seen(7));
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_missing_required_fields() {
    let result = HarvestConfig::builder().password("password").build();
    assert!(result.is_err());

    let result = HarvestConfig::builder()
        .imap_host("imap.example.com")
        .user("robot")
        .password("password")
        .build();
    assert!(result.is_err(), "download source is required");
}

#[test]
fn test_invalid_title_pattern() {
    let result = HarvestConfig::builder()
        .imap_host("imap.example.com")
        .user("robot")
        .password("password")
        .download_source("target.example/files")
        .title_pattern("(")
        .build();

    let err = result.unwrap_err();
    assert!(!err.is_retryable());
    assert_eq!(err.category().to_string(), "configuration");
}
