use super::*;
use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Clone, Default)]
struct UploadEndpointState {
    fields: Arc<Mutex<Vec<(String, String)>>>,
    file_bytes: Arc<Mutex<Option<Vec<u8>>>>,
    reject: bool,
}

async fn handle_upload(
    State(state): State<UploadEndpointState>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    while let Some(field) = multipart.next_field().await.expect("field") {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let bytes = field.bytes().await.expect("file bytes");
            *state.file_bytes.lock().await = Some(bytes.to_vec());
        } else {
            let value = field.text().await.expect("field text");
            state.fields.lock().await.push((name, value));
        }
    }

    if state.reject {
        return (
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({"error": "ticket already consumed"})),
        );
    }

    (
        StatusCode::OK,
        Json(serde_json::json!({"data": {"id": "f-1", "cid": "bafytestcid"}})),
    )
}

async fn spawn_upload_endpoint(reject: bool) -> (String, UploadEndpointState) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let state = UploadEndpointState {
        reject,
        ..UploadEndpointState::default()
    };
    let app = Router::new()
        .route("/v3/files", post(handle_upload))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}/v3/files?sig=one-time"), state)
}

fn staged_png() -> StagedFile {
    StagedFile {
        filename: "photo.png".into(),
        mime_type: Some("image/png".into()),
        bytes: b"not-really-a-png".to_vec(),
    }
}

fn metadata() -> FileMetadata {
    FileMetadata {
        slug: "abc1234".into(),
        fid: "6023".into(),
        board_name: "My Board".into(),
        caption: "hello".into(),
    }
}

#[tokio::test]
async fn uploads_bytes_and_keyvalues_to_ticket_url() {
    let (url, state) = spawn_upload_endpoint(false).await;
    let uploader = HttpPinningUploader::new();

    let pinned = uploader
        .upload(&UploadTicket::new(url), &staged_png(), &metadata())
        .await
        .expect("upload");
    assert_eq!(pinned.cid, "bafytestcid");

    let bytes = state.file_bytes.lock().await.clone().expect("file part");
    assert_eq!(bytes, b"not-really-a-png");

    let fields = state.fields.lock().await.clone();
    let keyvalues = fields
        .iter()
        .find(|(name, _)| name == "keyvalues")
        .map(|(_, value)| value.clone())
        .expect("keyvalues part");
    let parsed: serde_json::Value = serde_json::from_str(&keyvalues).expect("keyvalues json");
    assert_eq!(parsed["slug"], "abc1234");
    assert_eq!(parsed["fid"], "6023");
    assert_eq!(parsed["boardName"], "My Board");
    assert_eq!(parsed["caption"], "hello");
    assert!(fields.iter().any(|(name, value)| name == "network" && value == "public"));
}

#[tokio::test]
async fn rejected_upload_surfaces_status_and_body() {
    let (url, _state) = spawn_upload_endpoint(true).await;
    let uploader = HttpPinningUploader::new();

    let err = uploader
        .upload(&UploadTicket::new(url), &staged_png(), &metadata())
        .await
        .expect_err("must fail");
    let pinning_err = err.downcast::<PinningError>().expect("typed error");
    match pinning_err {
        PinningError::Rejected { status, body } => {
            assert_eq!(status, 403);
            assert!(body.contains("ticket already consumed"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn missing_uploader_always_errors() {
    let err = MissingPinningUploader
        .upload(&UploadTicket::new("http://unused"), &staged_png(), &metadata())
        .await
        .expect_err("must fail");
    assert!(err.to_string().contains("unavailable"));
}
