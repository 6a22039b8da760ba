use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// One-time upload authorization minted by the backend for a single file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTicket {
    pub url: String,
}

impl UploadTicket {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// A file staged for upload: the raw payload plus what the pinning layer
/// needs to name it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub filename: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Key/value metadata attached to every pinned file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub slug: String,
    pub fid: String,
    pub board_name: String,
    pub caption: String,
}

/// Outcome of a delegated upload: the content id the gateway serves the
/// file under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinnedFile {
    pub cid: String,
}

#[derive(Debug, Error)]
pub enum PinningError {
    #[error("upload request failed: {0}")]
    Transport(String),
    #[error("pinning service rejected upload with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("pinning service returned an unreadable response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait PinningUploader: Send + Sync {
    /// Uploads the file bytes using the one-time ticket and attaches the
    /// given metadata. Consumes exactly one ticket per call.
    async fn upload(
        &self,
        ticket: &UploadTicket,
        file: &StagedFile,
        metadata: &FileMetadata,
    ) -> Result<PinnedFile>;
}

pub struct MissingPinningUploader;

#[async_trait]
impl PinningUploader for MissingPinningUploader {
    async fn upload(
        &self,
        _ticket: &UploadTicket,
        file: &StagedFile,
        _metadata: &FileMetadata,
    ) -> Result<PinnedFile> {
        Err(anyhow!(
            "pinning uploader is unavailable; cannot upload '{}'",
            file.filename
        ))
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    data: UploadedFileData,
}

#[derive(Debug, Deserialize)]
struct UploadedFileData {
    cid: String,
}

/// Uploads directly over HTTP: one multipart POST of the file bytes and the
/// metadata key/values to the presigned URL.
pub struct HttpPinningUploader {
    http: reqwest::Client,
}

impl HttpPinningUploader {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    fn keyvalues_json(metadata: &FileMetadata) -> Result<String> {
        let keyvalues = serde_json::json!({
            "slug": metadata.slug,
            "fid": metadata.fid,
            "boardName": metadata.board_name,
            "caption": metadata.caption,
        });
        serde_json::to_string(&keyvalues).context("failed to encode upload keyvalues")
    }
}

impl Default for HttpPinningUploader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PinningUploader for HttpPinningUploader {
    async fn upload(
        &self,
        ticket: &UploadTicket,
        file: &StagedFile,
        metadata: &FileMetadata,
    ) -> Result<PinnedFile> {
        let mut part = reqwest::multipart::Part::bytes(file.bytes.clone())
            .file_name(file.filename.clone());
        if let Some(mime_type) = &file.mime_type {
            part = part
                .mime_str(mime_type)
                .with_context(|| format!("invalid mime type '{mime_type}'"))?;
        }

        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("name", file.filename.clone())
            .text("network", "public")
            .text("keyvalues", Self::keyvalues_json(metadata)?);

        let response = self
            .http
            .post(&ticket.url)
            .multipart(form)
            .send()
            .await
            .map_err(|err| PinningError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PinningError::Rejected {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let parsed: UploadResponse = response
            .json()
            .await
            .map_err(|err| PinningError::InvalidResponse(err.to_string()))?;
        Ok(PinnedFile {
            cid: parsed.data.cid,
        })
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
