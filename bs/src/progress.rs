//! Resumable progress ledger
//!
//! A single shared file maps absolute source paths to completed row ids so
//! an interrupted run resumes where it left off. Every completion is
//! persisted immediately via read-merge-write: a crash loses at most the
//! in-flight send, never a confirmed one.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Current on-disk format version
const LEDGER_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    #[serde(default)]
    version: u32,
    /// Absolute source path -> completed row ids
    #[serde(default)]
    sources: BTreeMap<String, BTreeSet<u32>>,
}

/// Tracker scoped to one source's entry in the shared ledger
pub struct ProgressTracker {
    ledger_path: PathBuf,
    source_key: String,
    completed: BTreeSet<u32>,
}

impl ProgressTracker {
    /// Open the tracker for a source file
    ///
    /// The source path is resolved to its absolute form so the same logical
    /// file resumes correctly under different relative spellings. A missing
    /// or corrupt ledger starts empty with a warning; corruption never
    /// aborts a run.
    pub fn for_source(ledger_path: impl Into<PathBuf>, source: &Path) -> Self {
        let ledger_path = ledger_path.into();
        let source_key = resolve_key(source);
        let ledger = read_ledger(&ledger_path);
        let completed = ledger.sources.get(&source_key).cloned().unwrap_or_default();

        debug!(
            source = %source_key,
            completed = completed.len(),
            "progress tracker opened"
        );
        Self {
            ledger_path,
            source_key,
            completed,
        }
    }

    /// Whether the row was already completed in this or a prior run
    pub fn has_row(&self, row_id: u32) -> bool {
        self.completed.contains(&row_id)
    }

    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    /// Completed row ids in ascending order
    pub fn completed(&self) -> impl Iterator<Item = u32> + '_ {
        self.completed.iter().copied()
    }

    /// Record a completed row and persist immediately; idempotent
    pub fn mark_completed(&mut self, row_id: u32) -> Result<()> {
        if !self.completed.insert(row_id) {
            debug!(row = row_id, "row already recorded as completed");
            return Ok(());
        }
        self.save()
    }

    /// Forget this source's progress; deletes the ledger file when it
    /// becomes empty
    pub fn clear(&mut self) -> Result<()> {
        self.completed.clear();
        let mut ledger = read_ledger(&self.ledger_path);
        ledger.sources.remove(&self.source_key);
        info!(source = %self.source_key, "cleared progress entry");
        write_or_remove(&self.ledger_path, &ledger)
    }

    fn save(&self) -> Result<()> {
        // Read-merge-write so trackers for other sources are not clobbered
        let mut ledger = read_ledger(&self.ledger_path);
        ledger.version = LEDGER_VERSION;
        ledger.sources.insert(self.source_key.clone(), self.completed.clone());
        write_or_remove(&self.ledger_path, &ledger)
    }
}

fn resolve_key(source: &Path) -> String {
    source
        .canonicalize()
        .unwrap_or_else(|_| source.to_path_buf())
        .to_string_lossy()
        .into_owned()
}

fn read_ledger(path: &Path) -> LedgerFile {
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(ledger) => ledger,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "progress ledger is corrupt, starting empty");
                LedgerFile::default()
            }
        },
        Err(e) if e.kind() == ErrorKind::NotFound => LedgerFile::default(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "progress ledger is unreadable, starting empty");
            LedgerFile::default()
        }
    }
}

fn write_or_remove(path: &Path, ledger: &LedgerFile) -> Result<()> {
    if ledger.sources.is_empty() {
        if path.exists() {
            fs::remove_file(path)
                .with_context(|| format!("Failed to remove empty progress ledger {}", path.display()))?;
            info!(path = %path.display(), "removed empty progress ledger");
        }
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let content = serde_json::to_string_pretty(ledger)?;
    fs::write(path, content).with_context(|| format!("Failed to write progress ledger {}", path.display()))
}
