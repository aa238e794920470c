use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::link::SourceId;

const NORMALIZED_FILE: &str = "output.mp4";
const AUDIO_FILE: &str = "audio.mp3";
const MERGED_FILE: &str = "final_output.mp4";
const MANIFEST_FILE: &str = "files.txt";
const INPUT_STEM: &str = "input";

/// Extensions yt-dlp leaves behind while a download is still in flight.
const DOWNLOAD_PARTIAL_EXTENSIONS: &[&str] = &["part", "ytdl", "temp"];

/// Filesystem layout of one item; presence of a file is its cache signal.
#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    pub item_dir: PathBuf,
    pub normalized: PathBuf,
    pub audio: PathBuf,
    pub merged: PathBuf,
    pub manifest: PathBuf,
    pub output_dir: PathBuf,
    pub thumbnail: PathBuf,
}

impl WorkspacePaths {
    pub fn new(work_dir: &Path, output_dir: &Path, id: &SourceId) -> Self {
        let item_dir = work_dir.join(id.as_str());
        let output_dir = output_dir.join(id.as_str());
        Self {
            normalized: item_dir.join(NORMALIZED_FILE),
            audio: item_dir.join(AUDIO_FILE),
            merged: item_dir.join(MERGED_FILE),
            manifest: item_dir.join(MANIFEST_FILE),
            thumbnail: output_dir.join(format!("{id}.jpg")),
            item_dir,
            output_dir,
        }
    }

    /// Output template handed to the downloader: `<work_dir>/%(id)s/input.%(ext)s`.
    pub fn download_template(work_dir: &Path) -> String {
        work_dir
            .join("%(id)s")
            .join(format!("{INPUT_STEM}.%(ext)s"))
            .to_string_lossy()
            .to_string()
    }

    pub fn rendered(&self, title: &str) -> PathBuf {
        self.output_dir.join(format!("{title}.mp4"))
    }

    /// The raw download, whatever container the downloader picked.
    pub fn find_input(&self) -> Option<PathBuf> {
        let entries = std::fs::read_dir(&self.item_dir).ok()?;
        let mut candidates: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && is_complete_input(path))
            .collect();
        candidates.sort();
        candidates.into_iter().next()
    }
}

fn is_complete_input(path: &Path) -> bool {
    let stem_matches = path
        .file_stem()
        .map(|stem| stem == INPUT_STEM)
        .unwrap_or(false);
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase());
    match extension {
        Some(ext) => stem_matches && !DOWNLOAD_PARTIAL_EXTENSIONS.contains(&ext.as_str()),
        None => false,
    }
}

/// `output.mp4` becomes `output.partial.mp4`; tools write there first and
/// the file is renamed into place only after a clean exit.
pub fn partial_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}.partial.{}", ext.to_string_lossy()),
        None => format!("{stem}.partial"),
    };
    path.with_file_name(name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Download,
    Normalize,
    ExtractAudio,
    Merge,
    ProbeDuration,
    BuildManifest,
    Render,
    Thumbnail,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Stage::Download => "download",
            Stage::Normalize => "normalize",
            Stage::ExtractAudio => "extract_audio",
            Stage::Merge => "merge",
            Stage::ProbeDuration => "probe_duration",
            Stage::BuildManifest => "build_manifest",
            Stage::Render => "render",
            Stage::Thumbnail => "thumbnail",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Stages the pipeline runs behind the failure flag. Download happens
/// before the pipeline and the thumbnail fetch after it, so neither is here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatedStage {
    Normalize,
    ExtractAudio,
    Merge,
    ProbeDuration,
    BuildManifest,
    Render,
}

impl GatedStage {
    /// Execution order.
    pub const ALL: [GatedStage; 6] = [
        GatedStage::Normalize,
        GatedStage::ExtractAudio,
        GatedStage::Merge,
        GatedStage::ProbeDuration,
        GatedStage::BuildManifest,
        GatedStage::Render,
    ];
}

impl From<GatedStage> for Stage {
    fn from(stage: GatedStage) -> Self {
        match stage {
            GatedStage::Normalize => Stage::Normalize,
            GatedStage::ExtractAudio => Stage::ExtractAudio,
            GatedStage::Merge => Stage::Merge,
            GatedStage::ProbeDuration => Stage::ProbeDuration,
            GatedStage::BuildManifest => Stage::BuildManifest,
            GatedStage::Render => Stage::Render,
        }
    }
}

impl fmt::Display for GatedStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Stage::from(*self).fmt(f)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineItem {
    pub source_id: SourceId,
    pub paths: WorkspacePaths,
    /// Container-compatible file audio is extracted from.
    pub source: Option<PathBuf>,
    pub segment_duration: u64,
    pub target_duration: u64,
    pub title: Option<String>,
    pub rendered: Option<PathBuf>,
    pub actions: Vec<StageRecord>,
}

impl PipelineItem {
    pub fn new(
        source_id: SourceId,
        paths: WorkspacePaths,
        segment_duration: u64,
        target_duration: u64,
    ) -> Self {
        Self {
            source_id,
            paths,
            source: None,
            segment_duration,
            target_duration,
            title: None,
            rendered: None,
            actions: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, stage: Stage, action: StageAction) {
        self.actions.push(StageRecord { stage, action });
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "detail", rename_all = "snake_case")]
pub enum StageAction {
    Completed,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageRecord {
    pub stage: Stage,
    #[serde(flatten)]
    pub action: StageAction,
}

/// Per-item state threaded by value through the stages. Once `Failed`,
/// every gated stage passes it along untouched.
#[derive(Debug, Clone)]
pub enum StageOutcome {
    Ok(PipelineItem),
    Failed {
        item: PipelineItem,
        stage: Stage,
        reason: String,
    },
}

impl StageOutcome {
    pub fn failed(mut item: PipelineItem, stage: Stage, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        item.record(stage, StageAction::Failed(reason.clone()));
        StageOutcome::Failed {
            item,
            stage,
            reason,
        }
    }

    pub fn item(&self) -> &PipelineItem {
        match self {
            StageOutcome::Ok(item) | StageOutcome::Failed { item, .. } => item,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, StageOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Completed,
    Failed { stage: Stage, reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    pub source_id: SourceId,
    pub link: Option<String>,
    pub status: ItemStatus,
    pub title: Option<String>,
    pub rendered: Option<PathBuf>,
    pub thumbnail: Option<PathBuf>,
    pub stages: Vec<StageRecord>,
}

impl ItemReport {
    pub fn is_completed(&self) -> bool {
        matches!(self.status, ItemStatus::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_layout_is_keyed_by_source_id() {
        let id = SourceId::try_from("https://youtu.be/abc12345678").unwrap();
        let paths = WorkspacePaths::new(Path::new("files"), Path::new("output"), &id);
        assert_eq!(paths.item_dir, PathBuf::from("files/abc12345678"));
        assert_eq!(paths.normalized, PathBuf::from("files/abc12345678/output.mp4"));
        assert_eq!(paths.audio, PathBuf::from("files/abc12345678/audio.mp3"));
        assert_eq!(
            paths.merged,
            PathBuf::from("files/abc12345678/final_output.mp4")
        );
        assert_eq!(paths.manifest, PathBuf::from("files/abc12345678/files.txt"));
        assert_eq!(
            paths.thumbnail,
            PathBuf::from("output/abc12345678/abc12345678.jpg")
        );
        assert_eq!(
            paths.rendered("Song 1 Hour looped"),
            PathBuf::from("output/abc12345678/Song 1 Hour looped.mp4")
        );
    }

    #[test]
    fn gated_order_sits_between_download_and_thumbnail() {
        let stages: Vec<Stage> = GatedStage::ALL.into_iter().map(Stage::from).collect();
        assert_eq!(
            stages,
            [
                Stage::Normalize,
                Stage::ExtractAudio,
                Stage::Merge,
                Stage::ProbeDuration,
                Stage::BuildManifest,
                Stage::Render,
            ]
        );
        assert_eq!(GatedStage::ProbeDuration.to_string(), "probe_duration");
    }

    #[test]
    fn partial_path_keeps_container_extension() {
        assert_eq!(
            partial_path(Path::new("files/x/output.mp4")),
            PathBuf::from("files/x/output.partial.mp4")
        );
        assert_eq!(
            partial_path(Path::new("files/x/files.txt")),
            PathBuf::from("files/x/files.partial.txt")
        );
    }

    #[test]
    fn find_input_ignores_in_flight_downloads() {
        let dir = tempfile::tempdir().unwrap();
        let id = SourceId::try_from("https://youtu.be/abc12345678").unwrap();
        let paths = WorkspacePaths::new(dir.path(), dir.path(), &id);
        std::fs::create_dir_all(&paths.item_dir).unwrap();
        assert!(paths.find_input().is_none());

        std::fs::write(paths.item_dir.join("input.webm.part"), b"..").unwrap();
        std::fs::write(paths.item_dir.join("audio.mp3"), b"..").unwrap();
        assert!(paths.find_input().is_none());

        std::fs::write(paths.item_dir.join("input.webm"), b"..").unwrap();
        assert_eq!(paths.find_input(), Some(paths.item_dir.join("input.webm")));
    }

    #[test]
    fn failure_is_recorded_on_the_item() {
        let id = SourceId::try_from("https://youtu.be/abc12345678").unwrap();
        let paths = WorkspacePaths::new(Path::new("files"), Path::new("output"), &id);
        let item = PipelineItem::new(id, paths, 30, 3600);
        let outcome = StageOutcome::failed(item, Stage::Merge, "ffmpeg exited 1");
        assert!(outcome.is_failed());
        assert_eq!(
            outcome.item().actions,
            vec![StageRecord {
                stage: Stage::Merge,
                action: StageAction::Failed("ffmpeg exited 1".into()),
            }]
        );
    }
}
