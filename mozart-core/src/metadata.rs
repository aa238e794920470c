use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::config::YoutubeSection;
use crate::link::SourceId;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("no api key configured for title lookup")]
    MissingApiKey,
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("request to {url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("no metadata returned for {0}")]
    NotFound(SourceId),
}

pub type MetadataResult<T> = Result<T, MetadataError>;

#[async_trait]
pub trait MetadataClient: Send + Sync {
    async fn fetch_title(&self, id: &SourceId) -> MetadataResult<String>;
    async fn fetch_thumbnail(&self, id: &SourceId) -> MetadataResult<Vec<u8>>;
}

pub fn thumbnail_url(host: &str, id: &SourceId) -> String {
    format!("https://{host}/vi/{id}/hqdefault.jpg")
}

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoResource>,
}

#[derive(Debug, Deserialize)]
struct VideoResource {
    snippet: VideoSnippet,
}

#[derive(Debug, Deserialize)]
struct VideoSnippet {
    title: String,
}

#[derive(Debug, Clone)]
pub struct YoutubeMetadataClient {
    http: Client,
    api_key: Option<String>,
    api_base: String,
    thumbnail_host: String,
}

impl YoutubeMetadataClient {
    pub fn new(section: &YoutubeSection) -> MetadataResult<Self> {
        let http = Client::builder()
            .user_agent(concat!("mozart-tube/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(section.request_timeout_seconds))
            .build()?;
        Ok(Self {
            http,
            api_key: section.api_key.clone().filter(|key| !key.trim().is_empty()),
            api_base: section.api_base.trim_end_matches('/').to_string(),
            thumbnail_host: section.thumbnail_host.clone(),
        })
    }
}

#[async_trait]
impl MetadataClient for YoutubeMetadataClient {
    async fn fetch_title(&self, id: &SourceId) -> MetadataResult<String> {
        let key = self.api_key.as_deref().ok_or(MetadataError::MissingApiKey)?;
        let url = format!("{}/videos", self.api_base);
        let response = self
            .http
            .get(&url)
            .query(&[("id", id.as_str()), ("part", "snippet"), ("key", key)])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MetadataError::Status {
                url,
                status: status.as_u16(),
            });
        }
        let body: VideoListResponse = response.json().await?;
        let title = body
            .items
            .into_iter()
            .next()
            .map(|item| item.snippet.title)
            .ok_or_else(|| MetadataError::NotFound(id.clone()))?;
        debug!(source_id = %id, %title, "resolved title");
        Ok(title)
    }

    async fn fetch_thumbnail(&self, id: &SourceId) -> MetadataResult<Vec<u8>> {
        let url = thumbnail_url(&self.thumbnail_host, id);
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MetadataError::Status {
                url,
                status: status.as_u16(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}
