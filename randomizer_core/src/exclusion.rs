//! The user-maintained exclusion list: tags that never reach the prompt, whatever the post.
//!
//! The list lives in a UTF-8 text file edited outside the engine. One or more tags per
//! line, comma separated, blank lines ignored, lines starting with `#` are comments.
//! Reading is best-effort: any failure yields an empty set so generation is never blocked.

use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use itertools::Itertools;
use tempfile::NamedTempFile;

use randomizer_util::normalize_tag;

use crate::error::Result;

pub type ExclusionSet = HashSet<String>;

#[derive(Debug, Clone)]
pub struct ExclusionStore {
    path: PathBuf,
    /// Modification time of the file when `set` was read. `None` when it did not exist.
    modified: Option<SystemTime>,
    set: Arc<ExclusionSet>,
}

impl ExclusionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            modified: None,
            set: Arc::new(ExclusionSet::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The normalized set, re-read only when the file changed since the last load or `force` is set.
    pub fn load(&mut self, force: bool) -> Arc<ExclusionSet> {
        let modified = modified_time(&self.path);
        if !force && modified == self.modified {
            return self.set.clone();
        }
        let set = parse(&self.read_text());
        tracing::debug!("Loaded {} excluded tags from {}", set.len(), self.path.display());
        self.modified = modified;
        self.set = Arc::new(set);
        self.set.clone()
    }

    /// Current file content, empty when the file is missing or unreadable.
    pub fn read_text(&self) -> String {
        match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                tracing::warn!("Cannot read exclusion list {}: {}", self.path.display(), e);
                String::new()
            }
        }
    }

    /// Force a reload and return the file content.
    pub fn reload(&mut self) -> String {
        self.load(true);
        self.read_text()
    }

    /// Replace the file content atomically: write and sync a unique temp file in the same
    /// directory, then rename it over the list. Readers see either the old or the new content.
    pub fn save(&mut self, text: &str) -> Result<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;
        let mut tmp = NamedTempFile::new_in(&parent)?;
        tmp.write_all(text.as_bytes())?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        self.load(true);
        Ok(())
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

pub fn parse(text: &str) -> ExclusionSet {
    text.replace('\r', "\n")
        .split('\n')
        .filter(|line| !line.trim_start().starts_with('#'))
        .flat_map(|line| line.split(','))
        .map(normalize_tag)
        .filter(|tag| !tag.is_empty())
        .collect()
}

/// One tag per line, sorted.
pub fn serialize(set: &ExclusionSet) -> String {
    let mut text = set.iter().sorted().join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    text
}

/// Drop blank and excluded tags, keeping the order of the rest.
pub fn filter_tags(tags: &[String], exclusion: &ExclusionSet) -> Vec<String> {
    tags.iter()
        .filter(|tag| !tag.trim().is_empty())
        .filter(|tag| exclusion.is_empty() || !exclusion.contains(&normalize_tag(tag)))
        .cloned()
        .collect()
}
