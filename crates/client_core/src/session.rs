use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex as StdMutex, PoisonError},
};

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use reqwest::Client;
use shared::protocol::{VerifyRequest, VerifyResponse};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{FrameHost, SignedCredential};

const NONCE_KEY: &str = "nonce";
const MESSAGE_KEY: &str = "message";
const SIGNATURE_KEY: &str = "signature";
const FID_KEY: &str = "fid";
const EXPIRES_AT_KEY: &str = "expires_at";
/// Keys cleared at sign-out; the nonce key is replaced rather than removed.
const CREDENTIAL_KEYS: [&str; 4] = [MESSAGE_KEY, SIGNATURE_KEY, FID_KEY, EXPIRES_AT_KEY];

fn session_ttl() -> Duration {
    Duration::hours(4)
}

/// Mints an opaque random sign-in nonce.
fn mint_nonce() -> String {
    Uuid::new_v4().to_string().replace('-', "d")
}

/// Keyed durable storage for the session fields. Values are strings;
/// `expires_at` is epoch milliseconds, string-encoded.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn put(&self, key: &str, value: &str) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;
}

/// Session store backed by a single JSON file, written through on every
/// mutation.
pub struct FileSessionStore {
    path: PathBuf,
    cells: StdMutex<HashMap<String, String>>,
}

impl FileSessionStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create session directory '{}'", parent.display())
            })?;
        }

        let cells = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).with_context(|| {
                format!("session file '{}' holds invalid JSON", path.display())
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to read session file '{}'", path.display())
                })
            }
        };

        Ok(Self {
            path,
            cells: StdMutex::new(cells),
        })
    }

    fn flush(&self, cells: &HashMap<String, String>) -> Result<()> {
        let json = serde_json::to_string_pretty(cells).context("failed to encode session file")?;
        fs::write(&self.path, json)
            .with_context(|| format!("failed to write session file '{}'", self.path.display()))
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(cells.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        let mut cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
        cells.insert(key.to_string(), value.to_string());
        self.flush(&cells)
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
        if cells.remove(key).is_some() {
            self.flush(&cells)?;
        }
        Ok(())
    }
}

/// Read-only credential view handed to consumers; the session fields stay
/// owned by the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub nonce: String,
    pub message: String,
    pub signature: String,
}

#[derive(Default)]
struct SessionState {
    nonce: String,
    message: String,
    signature: String,
    fid: Option<String>,
    expires_at_ms: Option<i64>,
    authenticating: bool,
}

impl SessionState {
    fn is_authenticated(&self) -> bool {
        // fid is deliberately not required: verify-endpoint failure still
        // yields a usable "soft authenticated" session.
        !self.nonce.is_empty()
            && !self.message.is_empty()
            && !self.signature.is_empty()
            && self
                .expires_at_ms
                .is_some_and(|expires_at| Utc::now().timestamp_millis() < expires_at)
    }
}

/// Owns sign-in state, the nonce lifecycle, and the persisted session.
///
/// The nonce changes on exactly two events: `initialize` finding no valid
/// session, and `sign_out`. It never changes while a session is valid.
pub struct SessionManager {
    http: Client,
    server_url: String,
    store: Arc<dyn SessionStore>,
    host: Arc<dyn FrameHost>,
    inner: Mutex<SessionState>,
}

impl SessionManager {
    pub fn new(
        server_url: impl Into<String>,
        store: Arc<dyn SessionStore>,
        host: Arc<dyn FrameHost>,
    ) -> Self {
        Self {
            http: Client::new(),
            server_url: server_url.into(),
            store,
            host,
            inner: Mutex::new(SessionState::default()),
        }
    }

    /// Restores a persisted session or mints a fresh nonce. Idempotent and
    /// purely local: no network call is made.
    pub async fn initialize(&self) -> Result<()> {
        let stored_nonce = self.store.get(NONCE_KEY)?;
        let stored_message = self.store.get(MESSAGE_KEY)?;
        let stored_signature = self.store.get(SIGNATURE_KEY)?;
        let stored_expires_at = self.store.get(EXPIRES_AT_KEY)?;

        if let (Some(nonce), Some(message), Some(signature), Some(expires_at)) = (
            stored_nonce,
            stored_message,
            stored_signature,
            stored_expires_at,
        ) {
            let expires_at_ms = expires_at.parse::<i64>().ok();
            if expires_at_ms.is_some_and(|ms| Utc::now().timestamp_millis() < ms) {
                let fid = self.store.get(FID_KEY)?;
                let mut guard = self.inner.lock().await;
                *guard = SessionState {
                    nonce,
                    message,
                    signature,
                    fid,
                    expires_at_ms,
                    authenticating: false,
                };
                info!("session: restored persisted session");
                return Ok(());
            }
        }

        self.reset_with_fresh_nonce().await?;
        info!("session: no valid persisted session; fresh nonce minted");
        Ok(())
    }

    /// Runs the host signing action for the current nonce, verifies the
    /// signature with the backend, and persists the resulting session.
    ///
    /// Failures are logged rather than raised: callers observe the outcome
    /// through `is_authenticated`. Returns the resulting authentication
    /// state for convenience.
    pub async fn sign_in(&self) -> bool {
        let nonce = {
            let mut guard = self.inner.lock().await;
            if guard.nonce.is_empty() {
                warn!("session: sign-in requested before initialize; no nonce available");
                return false;
            }
            guard.authenticating = true;
            guard.nonce.clone()
        };

        if let Err(err) = self.sign_in_with_nonce(&nonce).await {
            warn!("session: sign-in failed: {err:#}");
        }

        let mut guard = self.inner.lock().await;
        guard.authenticating = false;
        guard.is_authenticated()
    }

    async fn sign_in_with_nonce(&self, nonce: &str) -> Result<()> {
        let credential = self
            .host
            .sign_in(nonce)
            .await
            .context("frame host signing action failed")?;

        // Verification resolves the fid but is not load-bearing for the
        // session itself; a failure leaves an fid-less session.
        let fid = match self.verify_signature(nonce, &credential).await {
            Ok(fid) => fid,
            Err(err) => {
                warn!("session: signature verification failed: {err:#}");
                None
            }
        };

        let expires_at_ms = Utc::now().timestamp_millis() + session_ttl().num_milliseconds();
        {
            let mut guard = self.inner.lock().await;
            guard.message = credential.message.clone();
            guard.signature = credential.signature.clone();
            guard.expires_at_ms = Some(expires_at_ms);
            if fid.is_some() {
                guard.fid = fid.clone();
            }
        }

        self.store.put(MESSAGE_KEY, &credential.message)?;
        self.store.put(SIGNATURE_KEY, &credential.signature)?;
        self.store.put(EXPIRES_AT_KEY, &expires_at_ms.to_string())?;
        if let Some(fid) = &fid {
            self.store.put(FID_KEY, fid)?;
        }

        info!(
            fid = fid.as_deref().unwrap_or("<unverified>"),
            "session: signed in"
        );
        Ok(())
    }

    async fn verify_signature(
        &self,
        nonce: &str,
        credential: &SignedCredential,
    ) -> Result<Option<String>> {
        let response: VerifyResponse = self
            .http
            .post(format!("{}/verify", self.server_url))
            .json(&VerifyRequest {
                nonce: nonce.to_string(),
                message: credential.message.clone(),
                signature: credential.signature.clone(),
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.fid)
    }

    /// Clears the session and mints a fresh nonce. Always succeeds; store
    /// write failures are logged and the in-memory state is reset anyway.
    pub async fn sign_out(&self) {
        if let Err(err) = self.reset_with_fresh_nonce().await {
            warn!("session: failed to persist sign-out: {err:#}");
        }
        info!("session: signed out");
    }

    async fn reset_with_fresh_nonce(&self) -> Result<()> {
        let fresh_nonce = mint_nonce();
        {
            let mut guard = self.inner.lock().await;
            *guard = SessionState {
                nonce: fresh_nonce.clone(),
                ..SessionState::default()
            };
        }

        for key in CREDENTIAL_KEYS {
            self.store.delete(key)?;
        }
        self.store.put(NONCE_KEY, &fresh_nonce)
    }

    pub async fn is_authenticated(&self) -> bool {
        self.inner.lock().await.is_authenticated()
    }

    pub async fn is_authenticating(&self) -> bool {
        self.inner.lock().await.authenticating
    }

    pub async fn nonce(&self) -> String {
        self.inner.lock().await.nonce.clone()
    }

    pub async fn fid(&self) -> Option<String> {
        self.inner.lock().await.fid.clone()
    }

    /// Returns the credential triple iff the session is currently valid.
    pub async fn credentials(&self) -> Option<Credentials> {
        let guard = self.inner.lock().await;
        if !guard.is_authenticated() {
            return None;
        }
        Some(Credentials {
            nonce: guard.nonce.clone(),
            message: guard.message.clone(),
            signature: guard.signature.clone(),
        })
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
