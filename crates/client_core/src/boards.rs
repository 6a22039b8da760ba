use std::sync::atomic::{AtomicU64, Ordering};

use reqwest::Client;
use shared::protocol::{BoardDetails, ListBoardsRequest};
use tokio::sync::Mutex;
use tracing::warn;

use crate::session::Credentials;

/// Fetches the signed-in identity's boards and individual board details.
///
/// Every refresh is tagged with a monotonic request id; a response whose id
/// is no longer the latest issued is discarded instead of overwriting newer
/// state, so two triggers firing close together cannot reorder the list.
pub struct BoardDirectory {
    http: Client,
    server_url: String,
    latest_request: AtomicU64,
    boards: Mutex<Vec<BoardDetails>>,
}

impl BoardDirectory {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            server_url: server_url.into(),
            latest_request: AtomicU64::new(0),
            boards: Mutex::new(Vec::new()),
        }
    }

    /// Refetches the board list. Fetch failures are logged and rendered as
    /// an empty list, never raised. Returns the applied list, or `None` when
    /// a newer refresh superseded this one before it resolved.
    pub async fn refresh(&self, credentials: &Credentials) -> Option<Vec<BoardDetails>> {
        let request_id = self.begin_refresh();
        let fetched = match self.fetch_list(credentials).await {
            Ok(boards) => boards,
            Err(err) => {
                warn!("boards: list fetch failed; rendering empty list: {err}");
                Vec::new()
            }
        };

        if self.apply_refresh(request_id, fetched.clone()).await {
            Some(fetched)
        } else {
            None
        }
    }

    fn begin_refresh(&self) -> u64 {
        self.latest_request.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn apply_refresh(&self, request_id: u64, boards: Vec<BoardDetails>) -> bool {
        if self.latest_request.load(Ordering::SeqCst) != request_id {
            warn!(request_id, "boards: discarding superseded list response");
            return false;
        }
        *self.boards.lock().await = boards;
        true
    }

    async fn fetch_list(&self, credentials: &Credentials) -> reqwest::Result<Vec<BoardDetails>> {
        self.http
            .post(format!("{}/list-boards", self.server_url))
            .json(&ListBoardsRequest {
                message: credentials.message.clone(),
                nonce: credentials.nonce.clone(),
                signature: credentials.signature.clone(),
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    /// Last applied board list.
    pub async fn boards(&self) -> Vec<BoardDetails> {
        self.boards.lock().await.clone()
    }

    /// Fetches one board by slug. Any failure (non-2xx, transport, decode)
    /// is logged and reported as "not found".
    pub async fn fetch_board(&self, slug: &str) -> Option<BoardDetails> {
        let result: reqwest::Result<BoardDetails> = async {
            self.http
                .get(format!("{}/board/{slug}", self.server_url))
                .send()
                .await?
                .error_for_status()?
                .json()
                .await
        }
        .await;

        match result {
            Ok(details) => Some(details),
            Err(err) => {
                warn!(slug, "boards: detail fetch failed; treating as not found: {err}");
                None
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/boards_tests.rs"]
mod tests;
