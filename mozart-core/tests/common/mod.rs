#![allow(dead_code)]

use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Output};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use mozart_core::link::extract_source_id;
use mozart_core::metadata::{MetadataClient, MetadataError, MetadataResult};
use mozart_core::pipeline::{Pipeline, PipelineItem, PipelineSettings, WorkspacePaths};
use mozart_core::tools::{CommandExecutor, ToolPaths, ToolRunner};
use mozart_core::{BatchDriver, BatchSettings, SourceId};

pub const TARGET_SECONDS: u64 = 3600;
pub const PROBED_DURATION: &str = "30.480000\n";

/// Stands in for ffmpeg, ffprobe and yt-dlp: writes whatever file the
/// last argument names and records every call.
#[derive(Default)]
pub struct FakeMedia {
    calls: Mutex<Vec<(String, Vec<String>)>>,
    fail_when_arg_contains: Option<String>,
    duration_output: Option<String>,
    missing_program: Option<String>,
}

impl FakeMedia {
    pub fn failing_on(fragment: &str) -> Self {
        Self {
            fail_when_arg_contains: Some(fragment.to_string()),
            ..Self::default()
        }
    }

    /// ffprobe prints `output` instead of a usable duration.
    pub fn with_duration_output(output: &str) -> Self {
        Self {
            duration_output: Some(output.to_string()),
            ..Self::default()
        }
    }

    /// Spawning `program` fails as if it were not installed.
    pub fn without_program(program: &str) -> Self {
        Self {
            missing_program: Some(program.to_string()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn programs(&self) -> Vec<String> {
        self.calls().into_iter().map(|(program, _)| program).collect()
    }

    fn status(code: i32) -> ExitStatus {
        ExitStatus::from_raw(code << 8)
    }
}

#[async_trait]
impl CommandExecutor for FakeMedia {
    async fn run(&self, program: &Path, args: &[String]) -> std::io::Result<Output> {
        let name = program.to_string_lossy().to_string();
        self.calls.lock().unwrap().push((name.clone(), args.to_vec()));

        if self.missing_program.as_deref() == Some(name.as_str()) {
            return Err(std::io::Error::from(std::io::ErrorKind::NotFound));
        }

        if let Some(fragment) = &self.fail_when_arg_contains {
            if args.iter().any(|arg| arg.contains(fragment.as_str())) {
                return Ok(Output {
                    status: Self::status(1),
                    stdout: Vec::new(),
                    stderr: b"simulated tool failure".to_vec(),
                });
            }
        }

        let stdout = match name.as_str() {
            "ffprobe" => self
                .duration_output
                .as_deref()
                .unwrap_or(PROBED_DURATION)
                .as_bytes()
                .to_vec(),
            "yt-dlp" => {
                let url = args.last().expect("yt-dlp gets a url");
                let id = extract_source_id(url).expect("test links carry an id");
                let template = args
                    .iter()
                    .position(|arg| arg == "--output")
                    .map(|index| &args[index + 1])
                    .expect("yt-dlp gets an output template");
                let target = template
                    .replace("%(id)s", id.as_str())
                    .replace("%(ext)s", "webm");
                let target = PathBuf::from(target);
                std::fs::create_dir_all(target.parent().unwrap())?;
                std::fs::write(&target, b"webm")?;
                Vec::new()
            }
            _ => {
                let target = PathBuf::from(args.last().expect("ffmpeg gets an output"));
                std::fs::write(&target, b"media")?;
                Vec::new()
            }
        };
        Ok(Output {
            status: Self::status(0),
            stdout,
            stderr: Vec::new(),
        })
    }
}

pub struct StubMetadata {
    pub title: Option<String>,
    pub thumbnail: bool,
}

impl StubMetadata {
    pub fn titled(title: &str) -> Self {
        Self {
            title: Some(title.to_string()),
            thumbnail: true,
        }
    }

    pub fn offline() -> Self {
        Self {
            title: None,
            thumbnail: false,
        }
    }
}

#[async_trait]
impl MetadataClient for StubMetadata {
    async fn fetch_title(&self, id: &SourceId) -> MetadataResult<String> {
        self.title
            .clone()
            .ok_or_else(|| MetadataError::NotFound(id.clone()))
    }

    async fn fetch_thumbnail(&self, id: &SourceId) -> MetadataResult<Vec<u8>> {
        if self.thumbnail {
            Ok(b"jpeg".to_vec())
        } else {
            Err(MetadataError::NotFound(id.clone()))
        }
    }
}

pub struct Workspace {
    pub dir: TempDir,
    pub work_dir: PathBuf,
    pub output_dir: PathBuf,
    pub asset: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let work_dir = dir.path().join("files");
        let output_dir = dir.path().join("output");
        let asset = dir.path().join("assets").join("sample.mp4");
        std::fs::create_dir_all(asset.parent().unwrap()).unwrap();
        std::fs::write(&asset, b"asset").unwrap();
        Self {
            dir,
            work_dir,
            output_dir,
            asset,
        }
    }

    /// Drops a finished download into place so pipeline tests start after
    /// the download stage.
    pub fn seed_input(&self, id: &str, extension: &str) -> PathBuf {
        let item_dir = self.work_dir.join(id);
        std::fs::create_dir_all(&item_dir).unwrap();
        let input = item_dir.join(format!("input.{extension}"));
        std::fs::write(&input, b"downloaded").unwrap();
        input
    }

    pub fn item(&self, id: &str) -> PipelineItem {
        let id = SourceId::try_from(format!("https://youtu.be/{id}").as_str()).unwrap();
        let paths = WorkspacePaths::new(&self.work_dir, &self.output_dir, &id);
        PipelineItem::new(id, paths, 30, TARGET_SECONDS)
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            asset_video: self.asset.clone(),
            ffmpeg_log_level: "error".into(),
            title_suffix: " 1 Hour looped".into(),
            title_limit: 100,
            fallback_title: "Viral Song".into(),
        }
    }

    pub fn batch_settings(&self) -> BatchSettings {
        BatchSettings {
            work_dir: self.work_dir.clone(),
            output_dir: self.output_dir.clone(),
            segment_baseline_seconds: 30,
            target_duration_seconds: TARGET_SECONDS,
        }
    }

    pub fn pipeline(&self, media: Arc<FakeMedia>, metadata: StubMetadata) -> Pipeline {
        Pipeline::new(runner(media), Arc::new(metadata), self.pipeline_settings())
    }

    pub fn driver(&self, media: Arc<FakeMedia>, metadata: StubMetadata) -> BatchDriver {
        BatchDriver::new(
            runner(media),
            Arc::new(metadata),
            self.batch_settings(),
            self.pipeline_settings(),
        )
    }
}

pub fn runner(media: Arc<FakeMedia>) -> Arc<ToolRunner> {
    let paths = ToolPaths {
        ffmpeg: PathBuf::from("ffmpeg"),
        ffprobe: PathBuf::from("ffprobe"),
        yt_dlp: PathBuf::from("yt-dlp"),
    };
    Arc::new(ToolRunner::new(paths).with_executor(media))
}
