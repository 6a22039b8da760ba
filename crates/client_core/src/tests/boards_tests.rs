use super::*;
use std::sync::{Arc, Mutex as StdMutex};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use shared::domain::{BoardId, ImageId};
use shared::protocol::BoardImage;
use tokio::net::TcpListener;

fn sample_board(slug: &str) -> BoardDetails {
    BoardDetails {
        id: BoardId(3),
        fid: 6023,
        name: "Trip".into(),
        slug: slug.into(),
        board_images: vec![BoardImage {
            id: ImageId(1),
            fid: 6023,
            caption: Some("hi".into()),
            board_id: BoardId(3),
            image_url: "https://gateway.test/ipfs/cid-a".into(),
        }],
    }
}

#[derive(Clone)]
struct BoardsBackendState {
    boards: Vec<BoardDetails>,
    reject_list: bool,
    list_requests: Arc<StdMutex<Vec<ListBoardsRequest>>>,
}

async fn handle_list_boards(
    State(state): State<BoardsBackendState>,
    Json(request): Json<ListBoardsRequest>,
) -> impl IntoResponse {
    state.list_requests.lock().expect("requests").push(request);
    if state.reject_list {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": "list unavailable"})),
        );
    }
    (StatusCode::OK, Json(serde_json::json!(state.boards)))
}

async fn handle_board_detail(
    State(state): State<BoardsBackendState>,
    Path(slug): Path<String>,
) -> impl IntoResponse {
    match state.boards.iter().find(|board| board.slug == slug) {
        Some(board) => (StatusCode::OK, Json(serde_json::json!(board))),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "board not found"})),
        ),
    }
}

async fn spawn_boards_backend(boards: Vec<BoardDetails>, reject_list: bool) -> (String, BoardsBackendState) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let state = BoardsBackendState {
        boards,
        reject_list,
        list_requests: Arc::new(StdMutex::new(Vec::new())),
    };
    let app = Router::new()
        .route("/list-boards", post(handle_list_boards))
        .route("/board/:slug", get(handle_board_detail))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), state)
}

fn credentials() -> Credentials {
    Credentials {
        nonce: "n".into(),
        message: "m".into(),
        signature: "s".into(),
    }
}

#[tokio::test]
async fn refresh_applies_owned_boards_and_sends_credentials() {
    let (server_url, state) = spawn_boards_backend(vec![sample_board("x9y8z7w")], false).await;
    let directory = BoardDirectory::new(&server_url);

    let applied = directory.refresh(&credentials()).await.expect("applied");

    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].slug, "x9y8z7w");
    assert_eq!(directory.boards().await, applied);

    let requests = state.list_requests.lock().expect("requests").clone();
    assert_eq!(
        requests,
        [ListBoardsRequest {
            message: "m".into(),
            nonce: "n".into(),
            signature: "s".into(),
        }]
    );
}

#[tokio::test]
async fn superseded_refresh_response_is_discarded() {
    let directory = BoardDirectory::new("http://127.0.0.1:9");

    let stale = directory.begin_refresh();
    let latest = directory.begin_refresh();

    // The slower, older response arrives after a newer refresh was issued:
    // it must not overwrite the newer state.
    assert!(!directory
        .apply_refresh(stale, vec![sample_board("old1234")])
        .await);
    assert!(directory
        .apply_refresh(latest, vec![sample_board("new1234")])
        .await);

    let boards = directory.boards().await;
    assert_eq!(boards.len(), 1);
    assert_eq!(boards[0].slug, "new1234");
}

#[tokio::test]
async fn list_failure_is_rendered_as_empty_list() {
    let (server_url, _state) = spawn_boards_backend(vec![sample_board("x9y8z7w")], true).await;
    let directory = BoardDirectory::new(&server_url);

    let applied = directory.refresh(&credentials()).await.expect("applied");

    assert!(applied.is_empty());
    assert!(directory.boards().await.is_empty());
}

#[tokio::test]
async fn fetch_board_returns_details_or_not_found() {
    let (server_url, _state) = spawn_boards_backend(vec![sample_board("x9y8z7w")], false).await;
    let directory = BoardDirectory::new(&server_url);

    let found = directory.fetch_board("x9y8z7w").await.expect("found");
    assert_eq!(found.name, "Trip");
    assert_eq!(found.board_images.len(), 1);

    assert!(directory.fetch_board("missing1").await.is_none());
}
