//! `reqwest`-backed media and article fetchers.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::sanitize;

use super::html::HtmlDocument;
use super::{ArticleFetcher, FetchedMedia, MediaFetchService, PageDocument, ServiceError};

const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Extensions trusted from the URL path without looking at headers.
const MEDIA_EXTENSIONS: &[&str] = &["m4a", "webm", "mp3", "mp4", "wav", "ogg"];

fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}

fn map_request_error(err: reqwest::Error) -> ServiceError {
    if err.is_timeout() {
        ServiceError::Transient(format!("request timed out: {}", err))
    } else if err.is_connect() {
        ServiceError::Transient(format!("connection failed: {}", err))
    } else if err.is_builder() {
        ServiceError::Rejected(err.to_string())
    } else {
        ServiceError::Transient(err.to_string())
    }
}

/// Maps a non-success HTTP status to the shared failure taxonomy.
pub fn classify_status(status: StatusCode) -> Result<(), ServiceError> {
    match status {
        s if s.is_success() => Ok(()),
        StatusCode::FORBIDDEN => Err(ServiceError::Blocked(format!("HTTP {}", status))),
        StatusCode::NOT_FOUND | StatusCode::GONE => {
            Err(ServiceError::Unavailable(format!("HTTP {}", status)))
        }
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => {
            Err(ServiceError::Transient(format!("HTTP {}", status)))
        }
        s if s.is_server_error() => Err(ServiceError::Transient(format!("HTTP {}", status))),
        s => Err(ServiceError::Rejected(format!("HTTP {}", s))),
    }
}

/// Picks a file extension: a known media extension in the URL path wins,
/// then the `Content-Type`, then `bin`.
pub fn media_extension(url: &str, content_type: Option<&str>) -> String {
    let from_path = url::Url::parse(url).ok().and_then(|u| {
        Path::new(u.path())
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
    });
    if let Some(ext) = from_path.filter(|e| MEDIA_EXTENSIONS.contains(&e.as_str())) {
        return ext;
    }

    if let Some(ct) = content_type {
        let essence = ct.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
        if essence == "text/html" || essence == "application/xhtml+xml" {
            return "html".to_string();
        }
        if let Some(exts) = mime_guess::get_mime_extensions_str(&essence) {
            let preferred = exts
                .iter()
                .find(|e| MEDIA_EXTENSIONS.contains(e))
                .or_else(|| exts.first());
            if let Some(ext) = preferred {
                return (*ext).to_string();
            }
        }
    }

    "bin".to_string()
}

/// Streams media over HTTP into the job's scratch directory.
pub struct HttpMediaFetcher {
    client: Client,
}

impl HttpMediaFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: build_client(timeout),
        }
    }

    async fn send(&self, url: &str) -> Result<Response, ServiceError> {
        let response = self.client.get(url).send().await.map_err(map_request_error)?;
        classify_status(response.status())?;
        Ok(response)
    }
}

#[async_trait]
impl MediaFetchService for HttpMediaFetcher {
    async fn download(
        &self,
        url: &str,
        dest_dir: &Path,
        max_bytes: u64,
    ) -> Result<FetchedMedia, ServiceError> {
        let mut response = self.send(url).await?;

        if let Some(len) = response.content_length() {
            if len > max_bytes {
                return Err(ServiceError::PayloadTooLarge {
                    size: len,
                    limit: max_bytes,
                });
            }
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let extension = media_extension(url, content_type.as_deref());
        let path = dest_dir.join(format!("media.{}", extension));

        let io_err = |e: std::io::Error| ServiceError::Transient(format!("write failed: {}", e));
        let mut file = tokio::fs::File::create(&path).await.map_err(io_err)?;
        let mut written: u64 = 0;

        while let Some(chunk) = response.chunk().await.map_err(map_request_error)? {
            written += chunk.len() as u64;
            if written > max_bytes {
                drop(file);
                let _ = tokio::fs::remove_file(&path).await;
                return Err(ServiceError::PayloadTooLarge {
                    size: written,
                    limit: max_bytes,
                });
            }
            file.write_all(&chunk).await.map_err(io_err)?;
        }
        file.flush().await.map_err(io_err)?;

        debug!(
            url = %sanitize::redact_url(url),
            bytes = written,
            "Media downloaded"
        );

        Ok(FetchedMedia {
            path,
            size_bytes: written,
            content_type,
        })
    }
}

/// Fetches article pages and parses them into an [`HtmlDocument`].
pub struct HttpArticleFetcher {
    client: Client,
}

impl HttpArticleFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: build_client(timeout),
        }
    }
}

#[async_trait]
impl ArticleFetcher for HttpArticleFetcher {
    async fn fetch(&self, url: &str) -> Result<Box<dyn PageDocument>, ServiceError> {
        let response = self.client.get(url).send().await.map_err(map_request_error)?;
        classify_status(response.status())?;
        let body = response.text().await.map_err(map_request_error)?;
        Ok(Box::new(HtmlDocument::parse(&body)))
    }
}
