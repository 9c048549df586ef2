//! Side-index key derivation.

use serde::{Deserialize, Serialize};

use super::StreamEntry;
use crate::error::EntryError;

/// Where a claimed entry lands in the side-index: `<prefix><entry[field]>`.
///
/// The key is built from a stable payload field so rewriting the same entry
/// overwrites the same record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexKeyPolicy {
    pub prefix: String,
    pub field: String,
}

impl Default for IndexKeyPolicy {
    fn default() -> Self {
        Self {
            prefix: "tweet:".to_string(),
            field: "id".to_string(),
        }
    }
}

impl IndexKeyPolicy {
    /// 新しい IndexKeyPolicy を作成
    pub fn new(prefix: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            field: field.into(),
        }
    }

    /// Derives the key, rejecting entries whose key field is absent, blank or
    /// not UTF-8.
    pub fn key_for(&self, entry: &StreamEntry) -> Result<String, EntryError> {
        match entry.field(&self.field).map(str::trim) {
            Some(value) if !value.is_empty() => Ok(format!("{}{}", self.prefix, value)),
            _ => Err(EntryError::MissingKeyField {
                field: self.field.clone(),
            }),
        }
    }
}
