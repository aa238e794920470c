mod error;
mod youtube;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::config::UploadSection;

pub use error::{UploadError, UploadResult};
pub use youtube::YoutubeUploader;

/// What the platform needs to publish one rendered file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadRequest {
    pub file_path: PathBuf,
    pub title: String,
    pub tags: Vec<String>,
    pub description: String,
    pub privacy_status: String,
    pub category_id: String,
}

#[async_trait]
pub trait PlatformUploader: Send + Sync {
    /// Returns the platform-assigned video id.
    async fn upload(&self, request: &UploadRequest) -> UploadResult<String>;

    async fn set_thumbnail(&self, video_id: &str, image: &Path) -> UploadResult<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedVideo {
    pub source_id: String,
    pub path: PathBuf,
    pub title: String,
    pub thumbnail: Option<PathBuf>,
}

/// Finds the first rendered `.mp4` in each `output_dir/<id>/`, ordered by id.
pub fn collect_rendered(output_dir: &Path) -> UploadResult<Vec<RenderedVideo>> {
    let mut videos: Vec<RenderedVideo> = Vec::new();
    for entry in WalkDir::new(output_dir)
        .min_depth(2)
        .max_depth(2)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|err| {
            let path = err
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| output_dir.to_path_buf());
            UploadError::io(path, err.into())
        })?;
        let path = entry.path();
        if !entry.file_type().is_file() || !is_rendered_file(path) {
            continue;
        }
        let Some(source_id) = path
            .parent()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().to_string())
        else {
            continue;
        };
        if videos.last().map(|last| last.source_id == source_id).unwrap_or(false) {
            continue;
        }
        let title = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_default();
        let thumbnail = path.with_file_name(format!("{source_id}.jpg"));
        videos.push(RenderedVideo {
            thumbnail: thumbnail.is_file().then_some(thumbnail),
            source_id,
            path: path.to_path_buf(),
            title,
        });
    }
    Ok(videos)
}

fn is_rendered_file(path: &Path) -> bool {
    let is_mp4 = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("mp4"))
        .unwrap_or(false);
    let is_partial = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().ends_with(".partial"))
        .unwrap_or(false);
    is_mp4 && !is_partial
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    All,
    #[default]
    One,
    Few,
}

/// Narrows the rendered set: everything, a single random pick, or a random
/// subset of random size (at least one).
pub fn select<R: Rng + ?Sized>(
    videos: Vec<RenderedVideo>,
    mode: SelectionMode,
    rng: &mut R,
) -> Vec<RenderedVideo> {
    if videos.is_empty() {
        return videos;
    }
    match mode {
        SelectionMode::All => videos,
        SelectionMode::One => videos.choose(rng).cloned().into_iter().collect(),
        SelectionMode::Few => {
            let count = rng.gen_range(1..=videos.len());
            videos.choose_multiple(rng, count).cloned().collect()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UploadStatus {
    Uploaded { video_id: String },
    DryRun,
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadRecord {
    pub source_id: String,
    pub title: String,
    pub path: PathBuf,
    #[serde(flatten)]
    pub status: UploadStatus,
}

pub struct UploadRunner {
    uploader: Arc<dyn PlatformUploader>,
    defaults: UploadSection,
}

impl UploadRunner {
    pub fn new(uploader: Arc<dyn PlatformUploader>, defaults: UploadSection) -> Self {
        Self { uploader, defaults }
    }

    pub fn request_for(&self, video: &RenderedVideo) -> UploadRequest {
        UploadRequest {
            file_path: video.path.clone(),
            title: video.title.clone(),
            tags: self.defaults.tags.clone(),
            description: self.defaults.description.clone(),
            privacy_status: self.defaults.privacy_status.clone(),
            category_id: self.defaults.category_id.clone(),
        }
    }

    /// Uploads one after another; a failed upload is recorded and the next
    /// one still runs.
    pub async fn run(&self, videos: &[RenderedVideo], dry_run: bool) -> Vec<UploadRecord> {
        let mut records = Vec::with_capacity(videos.len());
        for video in videos {
            let request = self.request_for(video);
            let status = if dry_run {
                info!(source_id = %video.source_id, title = %request.title, "dry run, not uploading");
                UploadStatus::DryRun
            } else {
                self.upload_one(video, &request).await
            };
            records.push(UploadRecord {
                source_id: video.source_id.clone(),
                title: request.title,
                path: request.file_path,
                status,
            });
        }
        records
    }

    async fn upload_one(&self, video: &RenderedVideo, request: &UploadRequest) -> UploadStatus {
        info!(source_id = %video.source_id, title = %request.title, "uploading");
        let video_id = match self.uploader.upload(request).await {
            Ok(video_id) => video_id,
            Err(err) => {
                error!(source_id = %video.source_id, error = %err, "upload failed");
                return UploadStatus::Failed {
                    reason: err.to_string(),
                };
            }
        };
        info!(source_id = %video.source_id, %video_id, "upload finished");
        if let Some(thumbnail) = &video.thumbnail {
            if let Err(err) = self.uploader.set_thumbnail(&video_id, thumbnail).await {
                warn!(%video_id, error = %err, "thumbnail upload failed");
            }
        }
        UploadStatus::Uploaded { video_id }
    }
}
