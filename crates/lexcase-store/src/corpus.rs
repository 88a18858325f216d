//! Corpus loading from a JSON array of precedent records.
//!
//! Each record needs `title`, `year`, `court`, `tags` and `text`; `id` and
//! `level_weight` are optional. Malformed records are skipped with a warning
//! so one bad entry never sinks the whole corpus.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use lexcase_core::{Court, Document, IssueTag, document_id};
use serde::Deserialize;
use tracing::{info, warn};

use crate::StoreError;

#[derive(Deserialize)]
struct RawRecord {
    #[serde(default)]
    id: Option<String>,
    title: String,
    year: i32,
    court: String,
    tags: Vec<String>,
    text: String,
    #[serde(default)]
    level_weight: Option<f32>,
}

impl RawRecord {
    fn into_document(self) -> Document {
        let id = match self.id {
            Some(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ => document_id(&self.title, self.year),
        };

        let mut tags = BTreeSet::new();
        for raw in &self.tags {
            match raw.parse::<IssueTag>() {
                Ok(tag) => {
                    tags.insert(tag);
                }
                Err(_) => warn!(document = %id, tag = %raw, "ignoring tag outside issue vocabulary"),
            }
        }

        Document {
            id,
            title: self.title,
            year: self.year,
            court: Court::from_name(&self.court),
            tags,
            text: self.text,
            level_weight: self.level_weight,
        }
    }
}

/// Load a corpus file (see [`parse_corpus`]).
pub fn load_corpus(path: &Path) -> Result<Vec<Document>, StoreError> {
    if !path.exists() {
        return Err(StoreError::CorpusNotFound(path.to_path_buf()));
    }
    let json = std::fs::read_to_string(path)?;
    let docs = parse_corpus(&json)?;
    info!(count = docs.len(), path = %path.display(), "loaded corpus");
    Ok(docs)
}

/// Parse a JSON array of precedent records.
///
/// The top level must be an array. Records missing a required field, with a
/// wrong field type, or reusing an earlier record's id are skipped.
pub fn parse_corpus(json: &str) -> Result<Vec<Document>, StoreError> {
    let values: Vec<serde_json::Value> = serde_json::from_str(json)?;
    let mut seen = HashSet::new();
    let mut docs = Vec::with_capacity(values.len());

    for (i, value) in values.into_iter().enumerate() {
        let record: RawRecord = match serde_json::from_value(value) {
            Ok(r) => r,
            Err(e) => {
                warn!(record = i, error = %e, "skipping malformed corpus record");
                continue;
            }
        };
        let doc = record.into_document();
        if !seen.insert(doc.id.clone()) {
            warn!(record = i, id = %doc.id, "skipping duplicate corpus id");
            continue;
        }
        docs.push(doc);
    }

    Ok(docs)
}
