use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::link::SourceId;
use crate::pipeline::{PipelineItem, Stage, StageAction, StageOutcome, WorkspacePaths};
use crate::tools::{Tool, ToolRunner};

/// Fetches the source video for an item into its work directory.
#[derive(Debug, Clone)]
pub struct Downloader {
    tools: Arc<ToolRunner>,
    work_dir: PathBuf,
}

impl Downloader {
    pub fn new(tools: Arc<ToolRunner>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            tools,
            work_dir: work_dir.into(),
        }
    }

    /// Options first, then `--`, then a URL rebuilt from the validated id.
    /// The raw links-file line never reaches the downloader's argv.
    pub fn download_args(&self, id: &SourceId) -> Vec<String> {
        vec![
            "--output".to_string(),
            WorkspacePaths::download_template(&self.work_dir),
            "--".to_string(),
            id.watch_url(),
        ]
    }

    /// A failed download hands back a `Failed` outcome at the download stage
    /// so the rest of the sequence skips the item.
    pub async fn fetch(&self, mut item: PipelineItem) -> StageOutcome {
        if let Some(reason) = cached_reason(&item.paths) {
            info!(source_id = %item.source_id, %reason, "download skipped");
            item.record(Stage::Download, StageAction::Skipped(reason));
            return StageOutcome::Ok(item);
        }

        let args = self.download_args(&item.source_id);
        info!(source_id = %item.source_id, url = %args[3], "downloading source video");
        match self.tools.invoke(Tool::Download, &args).await {
            Ok(output) => {
                if item.paths.find_input().is_none() {
                    return StageOutcome::failed(
                        item,
                        Stage::Download,
                        "downloader exited cleanly but left no input file",
                    );
                }
                info!(
                    source_id = %item.source_id,
                    download_secs = output.elapsed.as_secs_f64(),
                    "download finished"
                );
                item.record(Stage::Download, StageAction::Completed);
                StageOutcome::Ok(item)
            }
            Err(err) => StageOutcome::failed(item, Stage::Download, err.to_string()),
        }
    }
}

fn cached_reason(paths: &WorkspacePaths) -> Option<String> {
    if paths.find_input().is_some() {
        return Some("input already downloaded".to_string());
    }
    [&paths.normalized, &paths.merged]
        .into_iter()
        .find(|path| path.exists())
        .map(|path| format!("{} already exists", path.display()))
}
