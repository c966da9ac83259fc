//! Streaming HTTP downloads to exclusively created files.

use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::StreamExt;
use std::path::Path;
use std::time::Duration;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};
use url::Url;

/// Retrieves a URL into a file that must not exist yet.
#[async_trait]
pub trait Download: Send + Sync {
    /// Streams `url` into `destination` and returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DestinationExists`] if `destination` already exists,
    /// or a transport/filesystem error. Nothing is retried internally and a
    /// partially written file is left in place.
    async fn download(&self, url: &Url, destination: &Path) -> Result<u64>;
}

/// [`Download`] implementation using reqwest.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    /// Creates a downloader whose connections time out after `connect_timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HttpClient`] if the TLS backend cannot be initialized.
    pub fn new(connect_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| Error::HttpClient { source })?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Download for HttpDownloader {
    #[instrument(
        name = "HttpDownloader::download",
        skip_all,
        fields(url = %url, path = %destination.display())
    )]
    async fn download(&self, url: &Url, destination: &Path) -> Result<u64> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|source| Error::HttpRequest {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let mut file = create_new(destination).await?;
        let write_err = |source| Error::WriteFile {
            path: destination.to_path_buf(),
            source,
        };

        let mut body = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|source| Error::DownloadStream {
                url: url.to_string(),
                source,
            })?;
            file.write_all(&chunk).await.map_err(write_err)?;
            written += chunk.len() as u64;
        }

        file.flush().await.map_err(write_err)?;
        debug!(bytes = written, "Download complete");

        Ok(written)
    }
}

/// Creates `path`, failing if it already exists.
pub(crate) async fn create_new(path: &Path) -> Result<File> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
        .map_err(|source| {
            if source.kind() == std::io::ErrorKind::AlreadyExists {
                Error::DestinationExists {
                    path: path.to_path_buf(),
                }
            } else {
                Error::CreateFile {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })
}
