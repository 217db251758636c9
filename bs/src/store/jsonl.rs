//! JSONL-backed record store
//!
//! One JSON object per line. Status annotations are merged into the row
//! object under `status` / `status_message` / `status_at` and written back
//! by rewriting the whole file.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info};

use crate::domain::StatusRecord;

use super::{FIELD_STATUS, FIELD_STATUS_AT, FIELD_STATUS_MESSAGE, RecordRow, RecordStore, StoreError};

#[derive(Debug)]
pub struct JsonlStore {
    path: PathBuf,
    rows: Vec<RecordRow>,
    dirty: bool,
}

impl JsonlStore {
    /// Open a JSONL contact source
    ///
    /// Failure here is the one fatal error of a run: a source that cannot be
    /// read or parsed aborts before anything is dispatched. Blank lines are
    /// skipped but keep their line number, so row ids stay stable for
    /// sources that end in a trailing newline.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let resolved = path.canonicalize().map_err(|_| StoreError::NotFound(path.display().to_string()))?;

        let content = fs::read_to_string(&resolved)?;
        let mut rows = Vec::new();

        for (index, line) in content.lines().enumerate() {
            let id = (index + 1) as u32;
            if line.trim().is_empty() {
                continue;
            }
            let value: Value = serde_json::from_str(line).map_err(|e| StoreError::Malformed {
                row: id,
                reason: e.to_string(),
            })?;
            match value {
                Value::Object(fields) => rows.push(RecordRow { id, fields }),
                other => {
                    return Err(StoreError::Malformed {
                        row: id,
                        reason: format!("expected an object, found {other}"),
                    });
                }
            }
        }

        debug!(path = %resolved.display(), rows = rows.len(), "opened contact source");
        Ok(Self {
            path: resolved,
            rows,
            dirty: false,
        })
    }
}

impl RecordStore for JsonlStore {
    fn path(&self) -> &Path {
        &self.path
    }

    fn rows(&self) -> &[RecordRow] {
        &self.rows
    }

    fn annotate(&mut self, row_id: u32, record: &StatusRecord) -> Result<(), StoreError> {
        let row = self
            .rows
            .iter_mut()
            .find(|r| r.id == row_id)
            .ok_or(StoreError::RowNotFound(row_id))?;

        row.fields
            .insert(FIELD_STATUS.into(), Value::String(record.status.as_str().into()));
        row.fields
            .insert(FIELD_STATUS_MESSAGE.into(), Value::String(record.message.clone()));
        row.fields
            .insert(FIELD_STATUS_AT.into(), Value::String(record.timestamp.to_rfc3339()));

        self.dirty = true;
        Ok(())
    }

    fn persist(&mut self) -> Result<(), StoreError> {
        if !self.dirty {
            debug!(path = %self.path.display(), "persist: no changes");
            return Ok(());
        }

        let mut out = String::new();
        for row in &self.rows {
            out.push_str(&serde_json::to_string(&Value::Object(row.fields.clone()))?);
            out.push('\n');
        }
        fs::write(&self.path, out)?;
        self.dirty = false;

        info!(path = %self.path.display(), rows = self.rows.len(), "persisted contact source");
        Ok(())
    }
}
