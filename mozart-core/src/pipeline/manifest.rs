use std::path::Path;

/// Loop count needed to reach `target` seconds; rounds up so the rendered
/// video is never shorter than the target.
pub fn repetitions(target: u64, segment: u64) -> u64 {
    target.div_ceil(segment.max(1))
}

/// Concat-demuxer manifest listing `clip` `count` times.
pub fn manifest_contents(clip: &Path, count: u64) -> String {
    let escaped = clip.to_string_lossy().replace('\'', r"'\''");
    let line = format!("file '{escaped}'\n");
    line.repeat(count as usize)
}
