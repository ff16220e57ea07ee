//! Source archive download.
//!
//! Streams the archive to a `.part` file next to its destination, hashing as
//! it goes, and only renames it into place once complete. An interrupted
//! download therefore never looks like a cached archive on the next run.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use foopkg_schema::{PackageName, Version};

use crate::Reporter;
use crate::config::ProxyConfig;
use crate::paths::{is_local_source, local_source_path};

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("local source {0} does not exist")]
    MissingLocalSource(PathBuf),
}

/// Request for a download operation
pub struct FetchRequest<'a> {
    pub name: &'a PackageName,
    pub version: &'a Version,
    /// URL or local path of the archive.
    pub source: &'a str,
    pub dest: &'a Path,
    pub reporter: &'a dyn Reporter,
}

impl std::fmt::Debug for FetchRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchRequest")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("dest", &self.dest)
            .finish_non_exhaustive()
    }
}

/// Puts a source archive at its expected path.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Fetch `req.source` into `req.dest`, returning the SHA-256 of the
    /// archive as lowercase hex.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read or the destination
    /// cannot be written.
    async fn fetch(&self, req: FetchRequest<'_>) -> Result<String, DownloadError>;
}

/// Downloads over HTTP(S) with `reqwest`, and copies local paths.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: Client,
}

impl HttpDownloader {
    /// Build a downloader, routing traffic through `proxy` when given.
    ///
    /// # Errors
    ///
    /// Returns an error if a proxy URL is invalid or the client cannot be
    /// built.
    pub fn new(proxy: Option<&ProxyConfig>) -> Result<Self, DownloadError> {
        let mut builder = Client::builder().user_agent(crate::USER_AGENT);
        if let Some(proxy) = proxy {
            if let Some(http) = &proxy.http {
                builder = builder.proxy(reqwest::Proxy::http(http)?);
            }
            if let Some(https) = &proxy.https {
                builder = builder.proxy(reqwest::Proxy::https(https)?);
            }
        }
        Ok(Self {
            client: builder.build()?,
        })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn download(&self, req: &FetchRequest<'_>, part: &Path) -> Result<String, DownloadError> {
        let response = self
            .client
            .get(req.source)
            .send()
            .await?
            .error_for_status()?;

        let total = response.content_length();
        req.reporter.downloading(req.name, req.version, 0, total);

        let mut file = File::create(part).await?;
        let mut stream = response.bytes_stream();
        let mut hasher = Sha256::new();
        let mut downloaded: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            hasher.update(&chunk);
            downloaded += chunk.len() as u64;
            req.reporter
                .downloading(req.name, req.version, downloaded, total);
        }

        file.flush().await?;
        Ok(hex::encode(hasher.finalize()))
    }

    async fn copy_local(&self, req: &FetchRequest<'_>, part: &Path) -> Result<String, DownloadError> {
        let source = local_source_path(req.source);
        if !source.is_file() {
            return Err(DownloadError::MissingLocalSource(source.to_path_buf()));
        }

        let total = tokio::fs::metadata(source).await?.len();
        let mut input = File::open(source).await?;
        let mut output = File::create(part).await?;
        let mut hasher = Sha256::new();
        let mut copied: u64 = 0;
        let mut buf = vec![0u8; 64 * 1024];

        loop {
            let n = input.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            output.write_all(&buf[..n]).await?;
            hasher.update(&buf[..n]);
            copied += n as u64;
            req.reporter
                .downloading(req.name, req.version, copied, Some(total));
        }

        output.flush().await?;
        Ok(hex::encode(hasher.finalize()))
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn fetch(&self, req: FetchRequest<'_>) -> Result<String, DownloadError> {
        if let Some(parent) = req.dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let part = part_path(req.dest);

        let result = if is_local_source(req.source) {
            debug!("Copying {} to {}", req.source, req.dest.display());
            self.copy_local(&req, &part).await
        } else {
            debug!("Downloading {} to {}", req.source, req.dest.display());
            self.download(&req, &part).await
        };

        match result {
            Ok(digest) => {
                tokio::fs::rename(&part, req.dest).await?;
                Ok(digest)
            }
            Err(e) => {
                tokio::fs::remove_file(&part).await.ok();
                Err(e)
            }
        }
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}
