use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::info;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum CleanError {
    #[error("work directory {0} is not a directory")]
    NotADirectory(PathBuf),
    #[error("failed to scan {path}: {source}")]
    Scan {
        #[source]
        source: walkdir::Error,
        path: PathBuf,
    },
    #[error("failed to remove {path}: {source}")]
    Remove {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanReport {
    pub removed: Vec<PathBuf>,
    pub kept: Vec<PathBuf>,
}

/// Drops per-item work directories. Without `all`, only items whose
/// rendered video already sits in `output_dir/<id>/` are removed.
pub fn clean_workspace(
    work_dir: &Path,
    output_dir: &Path,
    all: bool,
) -> Result<CleanReport, CleanError> {
    let mut report = CleanReport::default();
    if !work_dir.exists() {
        return Ok(report);
    }
    if !work_dir.is_dir() {
        return Err(CleanError::NotADirectory(work_dir.to_path_buf()));
    }
    for entry in WalkDir::new(work_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|source| CleanError::Scan {
            source,
            path: work_dir.to_path_buf(),
        })?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let item_dir = entry.path().to_path_buf();
        if all || has_rendered(&output_dir.join(entry.file_name())) {
            std::fs::remove_dir_all(&item_dir).map_err(|source| CleanError::Remove {
                source,
                path: item_dir.clone(),
            })?;
            info!(dir = %item_dir.display(), "removed work directory");
            report.removed.push(item_dir);
        } else {
            report.kept.push(item_dir);
        }
    }
    Ok(report)
}

fn has_rendered(item_output: &Path) -> bool {
    let Ok(entries) = std::fs::read_dir(item_output) else {
        return false;
    };
    entries.flatten().any(|entry| {
        let name = entry.file_name().to_string_lossy().to_string();
        name.ends_with(".mp4") && !name.ends_with(".partial.mp4")
    })
}
