//! Record source abstraction
//!
//! The dispatcher consumes tabular contact sources through [`RecordStore`];
//! the mechanics of a concrete on-disk format live in implementations.

use std::path::Path;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::{DeliveryStatus, StatusRecord};

mod jsonl;

pub use jsonl::JsonlStore;

/// Field names of the persisted status annotation
pub const FIELD_STATUS: &str = "status";
pub const FIELD_STATUS_MESSAGE: &str = "status_message";
pub const FIELD_STATUS_AT: &str = "status_at";

/// Errors from record source operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("source not found: {0}")]
    NotFound(String),

    #[error("row {0} not found in source")]
    RowNotFound(u32),

    #[error("malformed row {row}: {reason}")]
    Malformed { row: u32, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One row of the contact source
#[derive(Debug, Clone)]
pub struct RecordRow {
    /// 1-based position in the source file
    pub id: u32,
    /// Raw fields of the row
    pub fields: Map<String, Value>,
}

impl RecordRow {
    /// Raw phone value, accepting both English and Spanish column keys
    pub fn phone(&self) -> Option<String> {
        self.field(&["phone", "telefono", "Phone", "Telefono"])
    }

    /// Display name, accepting both English and Spanish column keys
    pub fn name(&self) -> Option<String> {
        self.field(&["name", "nombre", "Name", "Nombre"])
    }

    /// Previously recorded status, if any. Unknown strings are treated as
    /// no status (the row is pending again).
    pub fn status(&self) -> Option<DeliveryStatus> {
        self.fields
            .get(FIELD_STATUS)
            .and_then(Value::as_str)
            .and_then(DeliveryStatus::parse)
    }

    fn field(&self, keys: &[&str]) -> Option<String> {
        for key in keys {
            match self.fields.get(*key) {
                Some(Value::String(s)) => {
                    let trimmed = s.trim();
                    if !trimmed.is_empty() {
                        return Some(trimmed.to_string());
                    }
                }
                // Phone columns are often numeric in exported data
                Some(Value::Number(n)) => return Some(n.to_string()),
                _ => {}
            }
        }
        None
    }
}

/// An ordered contact source that supports per-row status annotations
pub trait RecordStore: Send {
    /// Resolved path of the underlying source
    fn path(&self) -> &Path;

    /// All rows in source order
    fn rows(&self) -> &[RecordRow];

    /// Replace the row's status annotation (all three fields together)
    fn annotate(&mut self, row_id: u32, record: &StatusRecord) -> Result<(), StoreError>;

    /// Write accumulated annotations back to the source
    fn persist(&mut self) -> Result<(), StoreError>;
}
