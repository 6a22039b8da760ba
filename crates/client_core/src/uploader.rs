use std::sync::Arc;

use pinning_integration::{FileMetadata, PinningUploader, StagedFile, UploadTicket};
use rand::{distributions::Alphanumeric, Rng};
use reqwest::Client;
use shared::protocol::{CreateBoardRequest, ErrorBody, PresignedUrlRequest, PresignedUrlResponse};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

use crate::{
    previews::{PreviewHandle, PreviewRegistry},
    session::{Credentials, SessionManager},
};

const SLUG_LEN: usize = 7;
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Short random public identifier for a board, generated at submission time.
fn generate_slug() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SLUG_LEN)
        .map(char::from)
        .collect()
}

/// One file staged for a board, prior to submission.
pub struct PendingUpload {
    pub file: StagedFile,
    pub caption: String,
    pub preview: PreviewHandle,
}

#[derive(Debug, Clone)]
pub enum UploadEvent {
    Progress { percent: u8 },
    Completed { slug: String },
    Failed { reason: String },
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("sign in before creating a board")]
    NotAuthenticated,
    #[error("board name must not be empty")]
    EmptyBoardName,
    #[error("add at least one image before submitting")]
    NoPendingFiles,
    #[error("a submission is already in progress")]
    AlreadySubmitting,
    #[error("upload authorization failed: {0}")]
    Authorization(String),
    #[error("delegated upload failed for '{filename}': {source}")]
    Upload {
        filename: String,
        source: anyhow::Error,
    },
    #[error("board creation request failed: {0}")]
    BoardRequest(String),
    #[error("board creation failed with status {status}: {message}")]
    BoardCreation { status: u16, message: String },
}

/// Outcome of a fully successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedBoard {
    pub slug: String,
    pub image_links: Vec<String>,
    pub captions: Vec<String>,
}

#[derive(Default)]
struct DraftState {
    items: Vec<PendingUpload>,
    submitting: bool,
    progress: u8,
}

/// Owns the sequential multi-file upload workflow: per-file authorization,
/// delegated upload, progress accounting, and the final board-creation call.
///
/// Uploads within one `submit` are strictly sequential so that the progress
/// counter and the positional image/caption alignment stay correct; do not
/// parallelize without re-deriving both invariants.
pub struct UploadOrchestrator {
    http: Client,
    server_url: String,
    gateway_url: String,
    uploader: Arc<dyn PinningUploader>,
    previews: Arc<PreviewRegistry>,
    inner: Mutex<DraftState>,
    events: broadcast::Sender<UploadEvent>,
}

impl UploadOrchestrator {
    pub fn new(
        server_url: impl Into<String>,
        gateway_url: impl Into<String>,
        uploader: Arc<dyn PinningUploader>,
        previews: Arc<PreviewRegistry>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            http: Client::new(),
            server_url: server_url.into(),
            gateway_url: gateway_url.into(),
            uploader,
            previews,
            inner: Mutex::new(DraftState::default()),
            events,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<UploadEvent> {
        self.events.subscribe()
    }

    /// Stages a file with an empty caption and a fresh preview handle.
    /// Returns the new item's position.
    pub async fn add_file(&self, file: StagedFile) -> usize {
        let preview = self.previews.register(&file.bytes);
        let mut guard = self.inner.lock().await;
        guard.items.push(PendingUpload {
            file,
            caption: String::new(),
            preview,
        });
        guard.items.len() - 1
    }

    /// Replaces the caption at `index`; no-op when out of range.
    pub async fn update_caption(&self, index: usize, text: impl Into<String>) {
        let mut guard = self.inner.lock().await;
        if let Some(item) = guard.items.get_mut(index) {
            item.caption = text.into();
        }
    }

    /// Releases the preview at `index` and removes the item, shifting
    /// subsequent indices down by one. No-op when out of range.
    pub async fn remove_file(&self, index: usize) {
        let mut guard = self.inner.lock().await;
        if index >= guard.items.len() {
            return;
        }
        let removed = guard.items.remove(index);
        self.previews.release(removed.preview);
    }

    /// Drops the whole batch, releasing every preview.
    pub async fn discard(&self) {
        let mut guard = self.inner.lock().await;
        for item in guard.items.drain(..) {
            self.previews.release(item.preview);
        }
        guard.progress = 0;
    }

    pub async fn pending_count(&self) -> usize {
        self.inner.lock().await.items.len()
    }

    pub async fn is_submitting(&self) -> bool {
        self.inner.lock().await.submitting
    }

    /// Last computed progress percentage, 0 until a submission advances.
    pub async fn progress(&self) -> u8 {
        self.inner.lock().await.progress
    }

    /// Uploads every staged item strictly sequentially, then issues one
    /// board-creation call. First failure aborts the submission: no board is
    /// created, already-pinned files are not cleaned up, and the staged
    /// items are kept so the caller can retry. On total success the staged
    /// items are cleared and their previews released.
    pub async fn submit(
        &self,
        board_name: &str,
        session: &SessionManager,
    ) -> Result<SubmittedBoard, SubmitError> {
        let Some(credentials) = session.credentials().await else {
            return Err(self.report_failure(SubmitError::NotAuthenticated));
        };
        let fid = session.fid().await.unwrap_or_default();

        let board_name = board_name.trim();
        if board_name.is_empty() {
            return Err(self.report_failure(SubmitError::EmptyBoardName));
        }

        let snapshot: Vec<(StagedFile, String)> = {
            let mut guard = self.inner.lock().await;
            if guard.submitting {
                // No Failed event here: it would land in the in-flight
                // submission's event stream.
                return Err(SubmitError::AlreadySubmitting);
            }
            if guard.items.is_empty() {
                return Err(self.report_failure(SubmitError::NoPendingFiles));
            }
            guard.submitting = true;
            guard.progress = 0;
            guard
                .items
                .iter()
                .map(|item| (item.file.clone(), item.caption.clone()))
                .collect()
        };

        let slug = generate_slug();
        let result = self
            .run_submission(board_name, &slug, &credentials, &fid, &snapshot)
            .await;

        let mut guard = self.inner.lock().await;
        guard.submitting = false;
        match result {
            Ok(submitted) => {
                for item in guard.items.drain(..) {
                    self.previews.release(item.preview);
                }
                info!(slug = %submitted.slug, images = submitted.image_links.len(), "upload: board created");
                let _ = self.events.send(UploadEvent::Completed {
                    slug: submitted.slug.clone(),
                });
                Ok(submitted)
            }
            Err(err) => {
                warn!("upload: submission aborted: {err}");
                Err(self.report_failure(err))
            }
        }
    }

    fn report_failure(&self, err: SubmitError) -> SubmitError {
        let _ = self.events.send(UploadEvent::Failed {
            reason: err.to_string(),
        });
        err
    }

    async fn run_submission(
        &self,
        board_name: &str,
        slug: &str,
        credentials: &Credentials,
        fid: &str,
        items: &[(StagedFile, String)],
    ) -> Result<SubmittedBoard, SubmitError> {
        let total = items.len();
        let mut image_links = Vec::with_capacity(total);
        let mut captions = Vec::with_capacity(total);

        for (index, (file, caption)) in items.iter().enumerate() {
            let ticket = self.request_upload_ticket(credentials).await?;
            let metadata = FileMetadata {
                slug: slug.to_string(),
                fid: fid.to_string(),
                board_name: board_name.to_string(),
                caption: caption.clone(),
            };
            let pinned = self
                .uploader
                .upload(&ticket, file, &metadata)
                .await
                .map_err(|source| SubmitError::Upload {
                    filename: file.filename.clone(),
                    source,
                })?;

            image_links.push(format!("https://{}/ipfs/{}", self.gateway_url, pinned.cid));
            captions.push(caption.clone());

            let completed = index + 1;
            let mut percent = ((completed as f64 / total as f64) * 100.0).round() as u8;
            if completed < total {
                // 100 is reserved for the final item.
                percent = percent.min(99);
            }
            {
                let mut guard = self.inner.lock().await;
                guard.progress = percent;
            }
            let _ = self.events.send(UploadEvent::Progress { percent });
            info!(index, total, percent, "upload: item pinned");
        }

        self.create_board(board_name, slug, credentials, &image_links, &captions)
            .await?;

        Ok(SubmittedBoard {
            slug: slug.to_string(),
            image_links,
            captions,
        })
    }

    async fn request_upload_ticket(
        &self,
        credentials: &Credentials,
    ) -> Result<UploadTicket, SubmitError> {
        let response = self
            .http
            .post(format!("{}/presigned_url", self.server_url))
            .json(&PresignedUrlRequest {
                nonce: credentials.nonce.clone(),
                message: credentials.message.clone(),
                signature: credentials.signature.clone(),
            })
            .send()
            .await
            .map_err(|err| SubmitError::Authorization(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SubmitError::Authorization(format!(
                "backend returned status {status}"
            )));
        }

        let parsed: PresignedUrlResponse = response
            .json()
            .await
            .map_err(|err| SubmitError::Authorization(err.to_string()))?;
        Ok(UploadTicket::new(parsed.url))
    }

    async fn create_board(
        &self,
        board_name: &str,
        slug: &str,
        credentials: &Credentials,
        image_links: &[String],
        captions: &[String],
    ) -> Result<(), SubmitError> {
        let request = CreateBoardRequest {
            board_name: board_name.to_string(),
            image_links: image_links.to_vec(),
            captions: captions.to_vec(),
            slug: slug.to_string(),
            nonce: credentials.nonce.clone(),
            message: credentials.message.clone(),
            signature: credentials.signature.clone(),
        };

        let response = self
            .http
            .post(format!("{}/boards", self.server_url))
            .json(&request)
            .send()
            .await
            .map_err(|err| SubmitError::BoardRequest(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|parsed| parsed.error)
                .unwrap_or(body);
            return Err(SubmitError::BoardCreation {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/uploader_tests.rs"]
mod tests;
