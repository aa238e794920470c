use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};

pub const DEFAULT_TITLE_SUFFIX: &str = " 1 Hour looped";
pub const DEFAULT_TITLE_LIMIT: usize = 100;
pub const DEFAULT_SEGMENT_SECONDS: u64 = 30;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MozartConfig {
    #[serde(default)]
    pub tools: ToolsSection,
    pub paths: PathsSection,
    pub render: RenderSection,
    #[serde(default)]
    pub youtube: YoutubeSection,
    #[serde(default)]
    pub upload: UploadSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl MozartConfig {
    /// Rejects values that would make every item fail or loop forever.
    pub fn validate(&self) -> Result<()> {
        if self.render.target_duration_seconds == 0 {
            return Err(ConfigError::Invalid {
                field: "render.target_duration_seconds",
                reason: "must be greater than zero".into(),
            });
        }
        if self.render.segment_baseline_seconds == 0 {
            return Err(ConfigError::Invalid {
                field: "render.segment_baseline_seconds",
                reason: "must be greater than zero".into(),
            });
        }
        let reserved = self.render.title_suffix.chars().count() + 1;
        if self.render.title_limit <= reserved {
            return Err(ConfigError::Invalid {
                field: "render.title_limit",
                reason: format!(
                    "{} leaves no room for a title next to the suffix ({reserved} chars)",
                    self.render.title_limit
                ),
            });
        }
        if !self.paths.asset_video.is_file() {
            return Err(ConfigError::Invalid {
                field: "paths.asset_video",
                reason: format!("{} not found", self.paths.asset_video.display()),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,
    #[serde(default)]
    pub ffprobe: Option<PathBuf>,
    #[serde(default = "default_yt_dlp")]
    pub yt_dlp: PathBuf,
    #[serde(default = "default_ffmpeg_log_level")]
    pub ffmpeg_log_level: String,
}

impl ToolsSection {
    /// Explicit `ffprobe` wins; otherwise it sits next to `ffmpeg`.
    pub fn ffprobe_path(&self) -> PathBuf {
        if let Some(path) = &self.ffprobe {
            return path.clone();
        }
        let name = self
            .ffmpeg
            .file_name()
            .map(|name| name.to_string_lossy().replace("ffmpeg", "ffprobe"))
            .unwrap_or_else(|| "ffprobe".to_string());
        match self.ffmpeg.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.join(name),
            _ => PathBuf::from(name),
        }
    }
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            ffprobe: None,
            yt_dlp: default_yt_dlp(),
            ffmpeg_log_level: default_ffmpeg_log_level(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsSection {
    pub asset_video: PathBuf,
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_links_file")]
    pub links_file: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenderSection {
    pub target_duration_seconds: u64,
    #[serde(default = "default_segment_seconds")]
    pub segment_baseline_seconds: u64,
    #[serde(default = "default_title_suffix")]
    pub title_suffix: String,
    #[serde(default = "default_title_limit")]
    pub title_limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct YoutubeSection {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_thumbnail_host")]
    pub thumbnail_host: String,
    #[serde(default = "default_fallback_title")]
    pub fallback_title: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for YoutubeSection {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: default_api_base(),
            thumbnail_host: default_thumbnail_host(),
            fallback_title: default_fallback_title(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadSection {
    #[serde(default = "default_upload_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,
    #[serde(default = "default_privacy_status")]
    pub privacy_status: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_category_id")]
    pub category_id: String,
}

impl Default for UploadSection {
    fn default() -> Self {
        Self {
            endpoint: default_upload_endpoint(),
            token_file: default_token_file(),
            privacy_status: default_privacy_status(),
            description: String::new(),
            tags: Vec::new(),
            category_id: default_category_id(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_logs_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            dir: default_logs_dir(),
            filter: default_log_filter(),
        }
    }
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_yt_dlp() -> PathBuf {
    PathBuf::from("yt-dlp")
}

fn default_ffmpeg_log_level() -> String {
    "error".into()
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("files")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_links_file() -> PathBuf {
    PathBuf::from("links.txt")
}

fn default_segment_seconds() -> u64 {
    DEFAULT_SEGMENT_SECONDS
}

fn default_title_suffix() -> String {
    DEFAULT_TITLE_SUFFIX.into()
}

fn default_title_limit() -> usize {
    DEFAULT_TITLE_LIMIT
}

fn default_api_base() -> String {
    "https://www.googleapis.com/youtube/v3".into()
}

fn default_thumbnail_host() -> String {
    "i.ytimg.com".into()
}

fn default_fallback_title() -> String {
    "Viral Song".into()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_upload_endpoint() -> String {
    "https://www.googleapis.com/upload/youtube/v3/videos".into()
}

fn default_token_file() -> PathBuf {
    PathBuf::from("token.json")
}

fn default_privacy_status() -> String {
    "public".into()
}

fn default_category_id() -> String {
    "22".into()
}

fn default_logs_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_filter() -> String {
    "mozart_core=debug,mozartctl=debug,info".into()
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<MozartConfig> {
    load_toml(path)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
