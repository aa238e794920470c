mod error;
mod manifest;
mod title;
mod types;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tracing::{error, info, warn};

use crate::config::MozartConfig;
use crate::link::SourceId;
use crate::metadata::MetadataClient;
use crate::tools::{Tool, ToolOutput, ToolRunner};

pub use error::{PipelineError, PipelineResult};
pub use manifest::{manifest_contents, repetitions};
pub use title::{render_title, sanitize_title};
pub use types::{
    partial_path, GatedStage, ItemReport, ItemStatus, PipelineItem, Stage, StageAction,
    StageOutcome, StageRecord, WorkspacePaths,
};

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub asset_video: PathBuf,
    pub ffmpeg_log_level: String,
    pub title_suffix: String,
    pub title_limit: usize,
    pub fallback_title: String,
}

impl From<&MozartConfig> for PipelineSettings {
    fn from(config: &MozartConfig) -> Self {
        Self {
            asset_video: config.paths.asset_video.clone(),
            ffmpeg_log_level: config.tools.ffmpeg_log_level.clone(),
            title_suffix: config.render.title_suffix.clone(),
            title_limit: config.render.title_limit,
            fallback_title: config.youtube.fallback_title.clone(),
        }
    }
}

/// Runs the fixed stage sequence for one item at a time.
#[derive(Clone)]
pub struct Pipeline {
    tools: Arc<ToolRunner>,
    metadata: Arc<dyn MetadataClient>,
    settings: Arc<PipelineSettings>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("tools", &self.tools)
            .field("settings", &self.settings)
            .finish()
    }
}

impl Pipeline {
    pub fn new(
        tools: Arc<ToolRunner>,
        metadata: Arc<dyn MetadataClient>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            tools,
            metadata,
            settings: Arc::new(settings),
        }
    }

    pub async fn process(&self, item: PipelineItem) -> ItemReport {
        self.run(StageOutcome::Ok(item)).await
    }

    /// Drives an outcome through every gated stage and the thumbnail fetch.
    /// An already failed outcome only collects skip records.
    pub async fn run(&self, outcome: StageOutcome) -> ItemReport {
        let mut outcome = outcome;
        for stage in GatedStage::ALL {
            outcome = self.advance(stage, outcome).await;
        }

        let (mut item, status) = match outcome {
            StageOutcome::Ok(item) => (item, ItemStatus::Completed),
            StageOutcome::Failed {
                item,
                stage,
                reason,
            } => (item, ItemStatus::Failed { stage, reason }),
        };
        // Runs regardless of upstream failure.
        let thumbnail = self.fetch_thumbnail(&mut item).await;

        match &status {
            ItemStatus::Completed => {
                info!(source_id = %item.source_id, rendered = ?item.rendered, "item completed")
            }
            ItemStatus::Failed { stage, reason } => {
                error!(source_id = %item.source_id, %stage, %reason, "item failed")
            }
        }

        ItemReport {
            source_id: item.source_id,
            link: None,
            status,
            title: item.title,
            rendered: item.rendered,
            thumbnail,
            stages: item.actions,
        }
    }

    async fn advance(&self, gated: GatedStage, outcome: StageOutcome) -> StageOutcome {
        let stage = Stage::from(gated);
        match outcome {
            StageOutcome::Failed {
                mut item,
                stage: failed_stage,
                reason,
            } => {
                warn!(source_id = %item.source_id, %stage, failed_stage = %failed_stage, "previous stage failed, skipping");
                item.record(
                    stage,
                    StageAction::Skipped(format!("{failed_stage} failed")),
                );
                StageOutcome::Failed {
                    item,
                    stage: failed_stage,
                    reason,
                }
            }
            StageOutcome::Ok(mut item) => {
                info!(source_id = %item.source_id, %stage, "stage started");
                match self.execute(gated, &mut item).await {
                    Ok(action) => {
                        match &action {
                            StageAction::Skipped(reason) => {
                                info!(source_id = %item.source_id, %stage, %reason, "stage skipped")
                            }
                            _ => info!(source_id = %item.source_id, %stage, "stage completed"),
                        }
                        item.record(stage, action);
                        StageOutcome::Ok(item)
                    }
                    Err(err) => {
                        error!(source_id = %item.source_id, %stage, error = %err, "stage failed");
                        StageOutcome::failed(item, stage, err.to_string())
                    }
                }
            }
        }
    }

    async fn execute(
        &self,
        stage: GatedStage,
        item: &mut PipelineItem,
    ) -> PipelineResult<StageAction> {
        match stage {
            GatedStage::Normalize => self.normalize(item).await,
            GatedStage::ExtractAudio => self.extract_audio(item).await,
            GatedStage::Merge => self.merge(item).await,
            GatedStage::ProbeDuration => self.probe_duration(item).await,
            GatedStage::BuildManifest => self.build_manifest(item).await,
            GatedStage::Render => self.render(item).await,
        }
    }

    async fn normalize(&self, item: &mut PipelineItem) -> PipelineResult<StageAction> {
        let paths = item.paths.clone();
        let input = paths.find_input();
        if let Some(input) = input.as_ref().filter(|path| has_extension(path, "mp4")) {
            item.source = Some(input.clone());
            return Ok(StageAction::Skipped("download is already mp4".into()));
        }
        if paths.normalized.exists() {
            item.source = Some(paths.normalized.clone());
            return Ok(StageAction::Skipped(exists_reason(&paths.normalized)));
        }
        if paths.merged.exists() {
            return Ok(StageAction::Skipped(exists_reason(&paths.merged)));
        }

        let input = input.ok_or_else(|| PipelineError::MissingInput(paths.item_dir.clone()))?;
        self.transcode_into(
            &paths.normalized,
            vec!["-i".into(), path_arg(&input), "-c".into(), "copy".into()],
        )
        .await?;
        item.source = Some(paths.normalized);
        Ok(StageAction::Completed)
    }

    async fn extract_audio(&self, item: &mut PipelineItem) -> PipelineResult<StageAction> {
        let paths = item.paths.clone();
        if paths.audio.exists() {
            return Ok(StageAction::Skipped(exists_reason(&paths.audio)));
        }
        if paths.merged.exists() {
            return Ok(StageAction::Skipped(exists_reason(&paths.merged)));
        }
        let source = item
            .source
            .clone()
            .ok_or_else(|| PipelineError::MissingInput(paths.item_dir.clone()))?;
        self.transcode_into(
            &paths.audio,
            vec![
                "-i".into(),
                path_arg(&source),
                "-q:a".into(),
                "0".into(),
                "-map".into(),
                "a".into(),
            ],
        )
        .await?;
        Ok(StageAction::Completed)
    }

    async fn merge(&self, item: &mut PipelineItem) -> PipelineResult<StageAction> {
        let paths = &item.paths;
        if paths.merged.exists() {
            return Ok(StageAction::Skipped(exists_reason(&paths.merged)));
        }
        self.transcode_into(
            &paths.merged,
            vec![
                "-i".into(),
                path_arg(&self.settings.asset_video),
                "-i".into(),
                path_arg(&paths.audio),
                "-c:v".into(),
                "copy".into(),
                "-c:a".into(),
                "aac".into(),
            ],
        )
        .await?;
        Ok(StageAction::Completed)
    }

    async fn probe_duration(&self, item: &mut PipelineItem) -> PipelineResult<StageAction> {
        if item.paths.manifest.exists() {
            return Ok(StageAction::Skipped(format!(
                "{}; duration not needed",
                exists_reason(&item.paths.manifest)
            )));
        }
        let args = vec![
            "-v".to_string(),
            "quiet".to_string(),
            "-show_entries".to_string(),
            "format=duration".to_string(),
            "-of".to_string(),
            "csv=p=0".to_string(),
            path_arg(&item.paths.merged),
        ];
        let output = self.tools.invoke(Tool::Probe, &args).await?;
        let seconds = parse_duration(&output.stdout)?;
        info!(source_id = %item.source_id, seconds, "merged segment duration");
        item.segment_duration = seconds;
        Ok(StageAction::Completed)
    }

    async fn build_manifest(&self, item: &mut PipelineItem) -> PipelineResult<StageAction> {
        let paths = &item.paths;
        if paths.manifest.exists() {
            return Ok(StageAction::Skipped(exists_reason(&paths.manifest)));
        }
        let count = repetitions(item.target_duration, item.segment_duration);
        let clip = absolutize(&paths.merged)?;
        info!(
            source_id = %item.source_id,
            target = item.target_duration,
            segment = item.segment_duration,
            repetitions = count,
            "writing concat manifest"
        );
        write_atomically(&paths.manifest, manifest_contents(&clip, count).as_bytes()).await?;
        Ok(StageAction::Completed)
    }

    async fn render(&self, item: &mut PipelineItem) -> PipelineResult<StageAction> {
        let title = self.resolve_title(&item.source_id).await;
        let paths = item.paths.clone();
        let rendered = paths.rendered(&title);
        item.title = Some(title);

        if !paths.output_dir.exists() {
            info!(dir = %paths.output_dir.display(), "creating output directory");
            fs::create_dir_all(&paths.output_dir)
                .await
                .map_err(|source| PipelineError::io(&paths.output_dir, source))?;
        }
        if rendered.exists() {
            item.rendered = Some(rendered.clone());
            return Ok(StageAction::Skipped(exists_reason(&rendered)));
        }

        let output = self
            .transcode_into(
                &rendered,
                vec![
                    "-f".into(),
                    "concat".into(),
                    "-safe".into(),
                    "0".into(),
                    "-i".into(),
                    path_arg(&paths.manifest),
                    "-c".into(),
                    "copy".into(),
                ],
            )
            .await?;
        info!(
            source_id = %item.source_id,
            output = %rendered.display(),
            render_secs = output.elapsed.as_secs_f64(),
            "rendered final video"
        );
        item.rendered = Some(rendered);
        Ok(StageAction::Completed)
    }

    async fn resolve_title(&self, id: &SourceId) -> String {
        let raw = match self.metadata.fetch_title(id).await {
            Ok(title) => title,
            Err(err) => {
                warn!(source_id = %id, error = %err, fallback = %self.settings.fallback_title, "title lookup failed, using fallback");
                self.settings.fallback_title.clone()
            }
        };
        render_title(&raw, &self.settings.title_suffix, self.settings.title_limit)
    }

    async fn fetch_thumbnail(&self, item: &mut PipelineItem) -> Option<PathBuf> {
        let target = item.paths.thumbnail.clone();
        if target.exists() {
            item.record(Stage::Thumbnail, StageAction::Skipped(exists_reason(&target)));
            return Some(target);
        }
        let result = match self.metadata.fetch_thumbnail(&item.source_id).await {
            Ok(bytes) => write_atomically(&target, &bytes).await,
            Err(err) => Err(err.into()),
        };
        match result {
            Ok(()) => {
                info!(source_id = %item.source_id, path = %target.display(), "thumbnail saved");
                item.record(Stage::Thumbnail, StageAction::Completed);
                Some(target)
            }
            Err(err) => {
                warn!(source_id = %item.source_id, error = %err, "thumbnail fetch failed");
                item.record(Stage::Thumbnail, StageAction::Failed(err.to_string()));
                None
            }
        }
    }

    /// Runs ffmpeg into the partial sibling of `target`, then renames it
    /// into place.
    async fn transcode_into(
        &self,
        target: &Path,
        input_args: Vec<String>,
    ) -> PipelineResult<ToolOutput> {
        let partial = partial_path(target);
        let mut args = self.base_args();
        args.extend(input_args);
        args.push(path_arg(&partial));
        let output = self.tools.invoke(Tool::Transcode, &args).await?;
        fs::rename(&partial, target)
            .await
            .map_err(|source| PipelineError::io(target, source))?;
        Ok(output)
    }

    fn base_args(&self) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            self.settings.ffmpeg_log_level.clone(),
            "-y".to_string(),
        ]
    }
}

/// Probe prints fractional seconds; truncate, and refuse anything that
/// would make the repetition count meaningless.
pub fn parse_duration(stdout: &str) -> PipelineResult<u64> {
    let trimmed = stdout.trim();
    let value: f64 = trimmed
        .parse()
        .map_err(|_| PipelineError::DurationParse {
            output: trimmed.to_string(),
        })?;
    if !value.is_finite() || value < 1.0 {
        return Err(PipelineError::DurationParse {
            output: trimmed.to_string(),
        });
    }
    Ok(value.trunc() as u64)
}

async fn write_atomically(target: &Path, contents: &[u8]) -> PipelineResult<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|source| PipelineError::io(parent, source))?;
    }
    let partial = partial_path(target);
    fs::write(&partial, contents)
        .await
        .map_err(|source| PipelineError::io(&partial, source))?;
    fs::rename(&partial, target)
        .await
        .map_err(|source| PipelineError::io(target, source))
}

fn absolutize(path: &Path) -> PipelineResult<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .map_err(|source| PipelineError::io(path, source))
}

fn has_extension(path: &Path, expected: &str) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case(expected))
        .unwrap_or(false)
}

fn exists_reason(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    format!("{name} already exists")
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
