use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

pub const SOURCE_ID_LEN: usize = 11;

const LINK_PATTERN: &str =
    r"(?:youtu\.be/|youtube\.com/(?:.*v=|.*/|.*embed/|v/|shorts/))([\w-]{11})";

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("no source identifier in link {0:?}")]
    Unrecognized(String),
}

/// Opaque token naming one clip; also the key of its working directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Canonical watch URL rebuilt from the id alone.
    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.0)
    }
}

impl AsRef<str> for SourceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for SourceId {
    type Error = LinkError;

    fn try_from(link: &str) -> Result<Self, Self::Error> {
        extract_source_id(link).ok_or_else(|| LinkError::Unrecognized(link.to_string()))
    }
}

fn link_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(LINK_PATTERN).expect("link pattern is valid"))
}

pub fn extract_source_id(link: &str) -> Option<SourceId> {
    link_regex()
        .captures(link)
        .and_then(|captures| captures.get(1))
        .map(|token| SourceId(token.as_str().to_string()))
}

/// Splits a links file into `(line_number, link)` pairs, skipping blank lines.
pub fn parse_links(contents: &str) -> Vec<(usize, &str)> {
    contents
        .split('\n')
        .enumerate()
        .map(|(index, line)| (index + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty())
        .collect()
}
