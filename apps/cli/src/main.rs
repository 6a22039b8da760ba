use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use client_core::{
    share_board, BoardDirectory, FileSessionStore, FrameHost, PreviewRegistry, SessionManager,
    SignedCredential, UploadEvent, UploadOrchestrator,
};
use pinning_integration::{HttpPinningUploader, StagedFile};
use shared::protocol::BoardDetails;
use tracing::warn;

mod config;

use config::{load_settings, validate_settings};

#[derive(Parser, Debug)]
#[command(name = "billboards", about = "Create and view Billboards image boards")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the current session: nonce, authentication state, fid.
    Status,
    /// Sign in with a credential pair produced by signing the current nonce.
    SignIn {
        #[arg(long)]
        message: String,
        #[arg(long)]
        signature: String,
    },
    /// Clear the session and mint a fresh nonce.
    SignOut,
    /// List the boards owned by the signed-in identity.
    List,
    /// Show one board by slug.
    Show { slug: String },
    /// Create a board from local image files.
    Create {
        name: String,
        /// Image file, repeatable; order defines the board order.
        #[arg(long = "file", required = true)]
        files: Vec<PathBuf>,
        /// Caption for the file at the same position, repeatable.
        #[arg(long = "caption")]
        captions: Vec<String>,
    },
    /// Compose a cast sharing a board.
    Share { slug: String },
}

/// Frame-host capability for terminal use. The signing action happens in an
/// external wallet: the user signs the printed nonce out of band and passes
/// the resulting credential pair back through flags. Cast composition is
/// rendered to stdout.
struct ManualFrameHost {
    credential: Option<SignedCredential>,
}

impl ManualFrameHost {
    fn new(credential: Option<SignedCredential>) -> Self {
        Self { credential }
    }
}

#[async_trait]
impl FrameHost for ManualFrameHost {
    async fn ready(&self) -> Result<()> {
        Ok(())
    }

    async fn sign_in(&self, nonce: &str) -> Result<SignedCredential> {
        self.credential.clone().ok_or_else(|| {
            anyhow!("no credential supplied; sign nonce {nonce} and pass --message/--signature")
        })
    }

    async fn compose_cast(&self, text: &str, embeds: &[String]) -> Result<()> {
        println!("{text}");
        for embed in embeds {
            println!("{embed}");
        }
        Ok(())
    }
}

fn mime_type_for(path: &PathBuf) -> Option<String> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        _ => return None,
    };
    Some(mime.to_string())
}

fn stage_file(path: &PathBuf) -> Result<StagedFile> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read image file '{}'", path.display()))?;
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("'{}' has no usable file name", path.display()))?;
    Ok(StagedFile {
        filename,
        mime_type: mime_type_for(path),
        bytes,
    })
}

fn print_board(board: &BoardDetails) {
    println!("{} ({})", board.name, board.slug);
    for image in &board.board_images {
        match &image.caption {
            Some(caption) if !caption.is_empty() => {
                println!("  {} - {caption}", image.image_url)
            }
            _ => println!("  {}", image.image_url),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let cli = Cli::parse();

    let settings = load_settings();
    validate_settings(&settings)?;

    let credential = match &cli.command {
        Command::SignIn { message, signature } => Some(SignedCredential {
            message: message.clone(),
            signature: signature.clone(),
        }),
        _ => None,
    };
    let host: Arc<dyn FrameHost> = Arc::new(ManualFrameHost::new(credential));
    if let Err(err) = host.ready().await {
        warn!("frame host ready signal failed: {err}");
    }

    let store = Arc::new(FileSessionStore::open(&settings.session_file)?);
    let session = SessionManager::new(&settings.server_url, store, Arc::clone(&host));
    session.initialize().await?;

    match cli.command {
        Command::Status => {
            println!("authenticated: {}", session.is_authenticated().await);
            if let Some(fid) = session.fid().await {
                println!("fid: {fid}");
            }
            println!("nonce: {}", session.nonce().await);
        }
        Command::SignIn { .. } => {
            if session.sign_in().await {
                match session.fid().await {
                    Some(fid) => println!("signed in as fid {fid}"),
                    None => println!("signed in (identity unverified)"),
                }
            } else {
                println!("sign-in failed; session remains unauthenticated");
            }
        }
        Command::SignOut => {
            session.sign_out().await;
            println!("signed out; new nonce: {}", session.nonce().await);
        }
        Command::List => {
            let Some(credentials) = session.credentials().await else {
                return Err(anyhow!("not signed in; run `billboards sign-in` first"));
            };
            let directory = BoardDirectory::new(&settings.server_url);
            let boards = directory.refresh(&credentials).await.unwrap_or_default();
            if boards.is_empty() {
                println!("no boards yet");
            }
            for board in &boards {
                print_board(board);
            }
        }
        Command::Show { slug } => {
            let directory = BoardDirectory::new(&settings.server_url);
            match directory.fetch_board(&slug).await {
                Some(board) => print_board(&board),
                None => println!("board not found"),
            }
        }
        Command::Create {
            name,
            files,
            captions,
        } => {
            let previews = Arc::new(PreviewRegistry::new());
            let orchestrator = UploadOrchestrator::new(
                &settings.server_url,
                &settings.gateway_url,
                Arc::new(HttpPinningUploader::new()),
                previews,
            );

            for (index, path) in files.iter().enumerate() {
                let staged = stage_file(path)?;
                let position = orchestrator.add_file(staged).await;
                if let Some(caption) = captions.get(index) {
                    orchestrator.update_caption(position, caption.clone()).await;
                }
            }

            let mut events = orchestrator.subscribe_events();
            let progress_task = tokio::spawn(async move {
                while let Ok(event) = events.recv().await {
                    match event {
                        UploadEvent::Progress { percent } => println!("{percent}% complete"),
                        UploadEvent::Completed { .. } | UploadEvent::Failed { .. } => break,
                    }
                }
            });

            let result = orchestrator.submit(&name, &session).await;
            let _ = progress_task.await;
            let submitted = result.context("board creation failed")?;
            println!(
                "created board '{name}' ({}) with {} images",
                submitted.slug,
                submitted.image_links.len()
            );
            println!("{}/board/{}", settings.app_url.trim_end_matches('/'), submitted.slug);
        }
        Command::Share { slug } => {
            let directory = BoardDirectory::new(&settings.server_url);
            let Some(board) = directory.fetch_board(&slug).await else {
                return Err(anyhow!("board '{slug}' not found"));
            };
            share_board(host.as_ref(), &settings.app_url, &board).await?;
        }
    }

    Ok(())
}
