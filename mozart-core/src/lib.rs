pub mod batch;
pub mod cleaner;
pub mod config;
pub mod downloader;
pub mod error;
pub mod link;
pub mod metadata;
pub mod pipeline;
pub mod tools;
pub mod upload;

pub use batch::{BatchDriver, BatchError, BatchReport, BatchResult, BatchSettings, SkippedLink};
pub use cleaner::{clean_workspace, CleanError, CleanReport};
pub use config::{
    load_config, LoggingSection, MozartConfig, PathsSection, RenderSection, ToolsSection,
    UploadSection, YoutubeSection,
};
pub use downloader::Downloader;
pub use error::{ConfigError, Result};
pub use link::{extract_source_id, parse_links, LinkError, SourceId};
pub use metadata::{
    thumbnail_url, MetadataClient, MetadataError, MetadataResult, YoutubeMetadataClient,
};
pub use pipeline::{
    GatedStage, ItemReport, ItemStatus, Pipeline, PipelineError, PipelineItem, PipelineResult,
    PipelineSettings, Stage, StageAction, StageOutcome, StageRecord, WorkspacePaths,
};
pub use tools::{
    CommandExecutor, SystemCommandExecutor, Tool, ToolError, ToolOutput, ToolPaths, ToolResult,
    ToolRunner,
};
pub use upload::{
    collect_rendered, select, PlatformUploader, RenderedVideo, SelectionMode, UploadError,
    UploadRecord, UploadRequest, UploadResult, UploadRunner, UploadStatus, YoutubeUploader,
};
