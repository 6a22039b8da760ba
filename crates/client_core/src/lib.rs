use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::protocol::BoardDetails;

pub mod boards;
pub mod previews;
pub mod session;
pub mod uploader;

pub use boards::BoardDirectory;
pub use previews::{PreviewHandle, PreviewRegistry};
pub use session::{Credentials, FileSessionStore, SessionManager, SessionStore};
pub use uploader::{SubmitError, SubmittedBoard, UploadEvent, UploadOrchestrator};

/// Credential pair produced by the hosting environment's signing action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedCredential {
    pub message: String,
    pub signature: String,
}

/// Capabilities supplied by the surrounding mini-app runtime. Treated as an
/// opaque collaborator: the client never inspects how signing or cast
/// composition happen.
#[async_trait]
pub trait FrameHost: Send + Sync {
    /// Signals the host that the client finished loading.
    async fn ready(&self) -> Result<()>;
    /// Asks the host to sign the given nonce on behalf of the user.
    async fn sign_in(&self, nonce: &str) -> Result<SignedCredential>;
    /// Opens the host's cast composer prefilled with text and embeds.
    async fn compose_cast(&self, text: &str, embeds: &[String]) -> Result<()>;
}

pub struct MissingFrameHost;

#[async_trait]
impl FrameHost for MissingFrameHost {
    async fn ready(&self) -> Result<()> {
        Err(anyhow!("frame host is unavailable"))
    }

    async fn sign_in(&self, nonce: &str) -> Result<SignedCredential> {
        Err(anyhow!("frame host is unavailable; cannot sign nonce {nonce}"))
    }

    async fn compose_cast(&self, _text: &str, _embeds: &[String]) -> Result<()> {
        Err(anyhow!("frame host is unavailable"))
    }
}

/// Composes a cast sharing the given board through the frame host.
pub async fn share_board(host: &dyn FrameHost, app_url: &str, board: &BoardDetails) -> Result<()> {
    let text = format!("Check out my board \"{}\"", board.name);
    let embed = format!("{}/board/{}", app_url.trim_end_matches('/'), board.slug);
    host.compose_cast(&text, &[embed]).await
}
