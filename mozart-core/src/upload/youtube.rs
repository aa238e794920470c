use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use reqwest::{Body, Client};
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use super::{PlatformUploader, UploadError, UploadRequest, UploadResult};
use crate::config::UploadSection;

const CHUNK_SIZE: usize = 5 * 1024 * 1024;

#[derive(Debug, Deserialize)]
struct TokenFile {
    token: Option<String>,
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadedVideo {
    #[serde(default)]
    id: String,
}

/// Resumable upload against the videos endpoint. Expects a still-valid
/// bearer token on disk; it never refreshes one.
#[derive(Debug, Clone)]
pub struct YoutubeUploader {
    http: Client,
    endpoint: String,
    token_file: PathBuf,
}

impl YoutubeUploader {
    pub fn new(section: &UploadSection) -> UploadResult<Self> {
        let http = Client::builder()
            .user_agent(concat!("mozart-tube/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            endpoint: section.endpoint.trim_end_matches('/').to_string(),
            token_file: section.token_file.clone(),
        })
    }

    fn thumbnail_endpoint(&self) -> String {
        match self.endpoint.strip_suffix("/videos") {
            Some(base) => format!("{base}/thumbnails/set"),
            None => format!("{}/thumbnails/set", self.endpoint),
        }
    }

    fn load_token(&self) -> UploadResult<String> {
        let raw = std::fs::read_to_string(&self.token_file)
            .map_err(|source| UploadError::io(&self.token_file, source))?;
        parse_token(&raw, &self.token_file)
    }
}

fn parse_token(raw: &str, path: &Path) -> UploadResult<String> {
    let parsed: TokenFile = serde_json::from_str(raw).map_err(|source| UploadError::Token {
        source,
        path: path.to_path_buf(),
    })?;
    parsed
        .token
        .or(parsed.access_token)
        .filter(|token| !token.trim().is_empty())
        .ok_or_else(|| UploadError::MissingToken(path.to_path_buf()))
}

#[async_trait]
impl PlatformUploader for YoutubeUploader {
    async fn upload(&self, request: &UploadRequest) -> UploadResult<String> {
        let token = self.load_token()?;
        let file = tokio::fs::File::open(&request.file_path)
            .await
            .map_err(|source| UploadError::io(&request.file_path, source))?;
        let size = file
            .metadata()
            .await
            .map_err(|source| UploadError::io(&request.file_path, source))?
            .len();

        let payload = serde_json::json!({
            "snippet": {
                "title": request.title,
                "description": request.description,
                "tags": request.tags,
                "categoryId": request.category_id,
            },
            "status": {
                "privacyStatus": request.privacy_status,
            }
        });
        let session = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&token)
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .header("X-Upload-Content-Type", "video/mp4")
            .header("X-Upload-Content-Length", size.to_string())
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        let location = session
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(UploadError::MissingSession)?
            .to_string();
        debug!(%location, bytes = size, "upload session opened");

        info!(title = %request.title, bytes = size, "streaming video");
        let stream = ReaderStream::with_capacity(file, CHUNK_SIZE);
        let uploaded: UploadedVideo = self
            .http
            .put(location)
            .bearer_auth(&token)
            .header(CONTENT_TYPE, "video/mp4")
            .header(CONTENT_LENGTH, size)
            .body(Body::wrap_stream(stream))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if uploaded.id.is_empty() {
            return Err(UploadError::Rejected(
                "upload response carried no video id".into(),
            ));
        }
        Ok(uploaded.id)
    }

    async fn set_thumbnail(&self, video_id: &str, image: &Path) -> UploadResult<()> {
        let token = self.load_token()?;
        let bytes = tokio::fs::read(image)
            .await
            .map_err(|source| UploadError::io(image, source))?;
        self.http
            .post(self.thumbnail_endpoint())
            .bearer_auth(&token)
            .query(&[("videoId", video_id)])
            .header(CONTENT_TYPE, "image/jpeg")
            .body(bytes)
            .send()
            .await?
            .error_for_status()?;
        info!(%video_id, "thumbnail set");
        Ok(())
    }
}
