use serde::{Deserialize, Serialize};

use crate::domain::{BoardId, ImageId};

/// Credential triple accepted by every authenticated backend endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerifyRequest {
    pub nonce: String,
    pub message: String,
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fid: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresignedUrlRequest {
    pub nonce: String,
    pub message: String,
    pub signature: String,
}

/// One-time upload authorization minted by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresignedUrlResponse {
    pub url: String,
}

/// Board-creation payload. The backend associates images to captions
/// positionally: `image_links[i]` and `captions[i]` describe the same item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateBoardRequest {
    pub board_name: String,
    pub image_links: Vec<String>,
    pub captions: Vec<String>,
    pub slug: String,
    pub nonce: String,
    pub message: String,
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListBoardsRequest {
    pub message: String,
    pub nonce: String,
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoardImage {
    pub id: ImageId,
    pub fid: i64,
    #[serde(default)]
    pub caption: Option<String>,
    pub board_id: BoardId,
    pub image_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoardDetails {
    pub id: BoardId,
    pub fid: i64,
    pub name: String,
    pub slug: String,
    pub board_images: Vec<BoardImage>,
}

/// Body carried by non-2xx backend responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
