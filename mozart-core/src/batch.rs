use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};

use crate::config::MozartConfig;
use crate::downloader::Downloader;
use crate::link::{parse_links, LinkError, SourceId};
use crate::metadata::MetadataClient;
use crate::pipeline::{ItemReport, Pipeline, PipelineItem, PipelineSettings, WorkspacePaths};
use crate::tools::ToolRunner;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("failed to read links file {path}: {source}")]
    LinksFile {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("failed to prepare directory {path}: {source}")]
    Prepare {
        source: std::io::Error,
        path: PathBuf,
    },
}

pub type BatchResult<T> = Result<T, BatchError>;

#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub work_dir: PathBuf,
    pub output_dir: PathBuf,
    pub segment_baseline_seconds: u64,
    pub target_duration_seconds: u64,
}

impl From<&MozartConfig> for BatchSettings {
    fn from(config: &MozartConfig) -> Self {
        Self {
            work_dir: config.paths.work_dir.clone(),
            output_dir: config.paths.output_dir.clone(),
            segment_baseline_seconds: config.render.segment_baseline_seconds,
            target_duration_seconds: config.render.target_duration_seconds,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedLink {
    pub line: usize,
    pub link: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub items: Vec<ItemReport>,
    pub skipped: Vec<SkippedLink>,
}

impl BatchReport {
    pub fn completed(&self) -> usize {
        self.items.iter().filter(|item| item.is_completed()).count()
    }

    pub fn failed(&self) -> usize {
        self.items.len() - self.completed()
    }
}

/// Walks the link list one item at a time. Nothing an item does can stop
/// the batch; only setup failures surface as errors.
#[derive(Debug, Clone)]
pub struct BatchDriver {
    downloader: Downloader,
    pipeline: Pipeline,
    settings: BatchSettings,
}

impl BatchDriver {
    pub fn new(
        tools: Arc<ToolRunner>,
        metadata: Arc<dyn MetadataClient>,
        settings: BatchSettings,
        pipeline_settings: PipelineSettings,
    ) -> Self {
        Self {
            downloader: Downloader::new(tools.clone(), settings.work_dir.clone()),
            pipeline: Pipeline::new(tools, metadata, pipeline_settings),
            settings,
        }
    }

    pub fn from_config(
        config: &MozartConfig,
        tools: Arc<ToolRunner>,
        metadata: Arc<dyn MetadataClient>,
    ) -> Self {
        Self::new(tools, metadata, config.into(), config.into())
    }

    pub async fn prepare(&self) -> BatchResult<()> {
        for dir in [&self.settings.work_dir, &self.settings.output_dir] {
            if !dir.exists() {
                info!(dir = %dir.display(), "creating directory");
            }
            fs::create_dir_all(dir)
                .await
                .map_err(|source| BatchError::Prepare {
                    source,
                    path: dir.clone(),
                })?;
        }
        Ok(())
    }

    pub async fn run_file(&self, links_path: &Path) -> BatchResult<BatchReport> {
        let contents = fs::read_to_string(links_path)
            .await
            .map_err(|source| BatchError::LinksFile {
                source,
                path: links_path.to_path_buf(),
            })?;
        Ok(self.run_links(&contents).await)
    }

    pub async fn run_links(&self, contents: &str) -> BatchReport {
        let started_at = Utc::now();
        let links = parse_links(contents);
        info!(links = links.len(), "starting batch");

        let mut items = Vec::new();
        let mut skipped = Vec::new();
        for (index, (line, link)) in links.iter().enumerate() {
            info!(line, position = index + 1, total = links.len(), %link, "processing link");
            match self.process_link(link).await {
                Ok(report) => items.push(report),
                Err(err) => {
                    warn!(line, %link, error = %err, "skipping link");
                    skipped.push(SkippedLink {
                        line: *line,
                        link: link.to_string(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        let report = BatchReport {
            started_at,
            finished_at: Utc::now(),
            items,
            skipped,
        };
        info!(
            completed = report.completed(),
            failed = report.failed(),
            skipped = report.skipped.len(),
            "batch finished"
        );
        report
    }

    /// Runs one link end to end. Only an unrecognised link is an error;
    /// tool and network failures land in the returned report.
    pub async fn process_link(&self, link: &str) -> Result<ItemReport, LinkError> {
        let source_id = SourceId::try_from(link)?;
        let paths = WorkspacePaths::new(
            &self.settings.work_dir,
            &self.settings.output_dir,
            &source_id,
        );
        let item = PipelineItem::new(
            source_id,
            paths,
            self.settings.segment_baseline_seconds,
            self.settings.target_duration_seconds,
        );
        let outcome = self.downloader.fetch(item).await;
        let mut report = self.pipeline.run(outcome).await;
        report.link = Some(link.to_string());
        Ok(report)
    }
}
