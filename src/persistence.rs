//! Atomic JSON persistence for the seven collaborator stores (§6).
//!
//! Every store is a flat JSON file written with a write-tmp-then-rename
//! sequence so a crash mid-save never leaves a truncated file on disk.
//! Individual repositories (tasks, reflection log, insights, facts,
//! notifications, tool registry, goals) wrap a `Store<T>` rather than
//! touching the filesystem directly.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Write `value` to `path` atomically: serialize to a sibling temp file in
/// the same directory, then `rename` over the destination. A same-filesystem
/// rename is atomic on both the happy path and on crash.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("serializing JSON")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    let mut tmp = tempfile::NamedTempFile::new_in(
        path.parent().unwrap_or_else(|| Path::new(".")),
    )
    .context("creating temp file")?;
    use std::io::Write;
    tmp.write_all(json.as_bytes())
        .context("writing temp file")?;
    tmp.flush().context("flushing temp file")?;
    tmp.persist(path)
        .map_err(|e| anyhow::anyhow!("renaming temp file into place: {}", e.error))?;
    Ok(())
}

/// Read and deserialize JSON from `path`; returns `None` if the file does
/// not exist yet (a fresh data directory).
pub fn read_json_opt<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let value = serde_json::from_str(&content)
                .with_context(|| format!("parsing JSON from {}", path.display()))?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
    }
}

/// Resolves the data directory's well-known file paths (§6).
#[derive(Debug, Clone)]
pub struct DataPaths {
    root: PathBuf,
}

impl DataPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn active_tasks(&self) -> PathBuf {
        self.root.join("active_tasks.json")
    }

    pub fn reflection_log(&self) -> PathBuf {
        self.root.join("reflection_log.json")
    }

    pub fn actionable_insights(&self) -> PathBuf {
        self.root.join("actionable_insights.json")
    }

    pub fn learned_facts(&self) -> PathBuf {
        self.root.join("learned_facts.json")
    }

    pub fn notifications(&self) -> PathBuf {
        self.root.join("notifications.json")
    }

    pub fn tool_registry(&self) -> PathBuf {
        self.root.join("tool_registry.json")
    }

    pub fn goals(&self) -> PathBuf {
        self.root.join("goals.json")
    }
}
