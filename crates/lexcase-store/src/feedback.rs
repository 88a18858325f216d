//! Persistent per-document ranking nudges and drafting style hints.
//!
//! The store is a single JSON file. Every mutation clones the current
//! snapshot, applies the change, writes the result to a temporary file in the
//! same directory and renames it over the old one, then publishes the new
//! snapshot. Mutations are serialized by a store-wide write lock; readers
//! always see a whole snapshot, either before or after a write.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::Utc;
use lexcase_core::FeedbackEntry;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::StoreError;

/// Default absolute bound on a document's boost.
pub const DEFAULT_BOOST_BOUND: f32 = 0.2;

/// Boost applied per document by a thumbs-up (or subtracted by a thumbs-down).
pub const VERDICT_STEP: f32 = 0.02;

const MAX_STYLE_HINTS: usize = 5;
const MAX_STORED_NOTES: usize = 20;
const MAX_STYLE_LEVEL: u8 = 2;

/// Drafting style preferences learned from thumbs-up/down feedback.
///
/// Each flag is a level in `0..=2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleFlags {
    pub bullets: u8,
    pub citations: u8,
    pub proportionality_emphasis: u8,
}

impl Default for StyleFlags {
    fn default() -> Self {
        Self {
            bullets: 0,
            citations: 1,
            proportionality_emphasis: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StyleNote {
    note: String,
    timestamp: chrono::DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct FeedbackData {
    #[serde(default)]
    entries: BTreeMap<String, FeedbackEntry>,
    #[serde(default)]
    style: StyleFlags,
    /// Oldest first.
    #[serde(default)]
    notes: Vec<StyleNote>,
}

/// Flat layout written by earlier releases: `doc_boosts` plus integer style flags.
#[derive(Deserialize)]
struct LegacyFeedback {
    #[serde(default)]
    style_bullets: u8,
    #[serde(default = "one")]
    style_citations: u8,
    #[serde(default = "one")]
    emphasis_proportionality: u8,
    doc_boosts: BTreeMap<String, f32>,
    #[serde(default)]
    last_notes: Option<String>,
}

fn one() -> u8 {
    1
}

impl FeedbackData {
    fn parse(json: &str) -> Result<Self, String> {
        let value: serde_json::Value = serde_json::from_str(json).map_err(|e| e.to_string())?;
        if value.get("doc_boosts").is_some() {
            let legacy: LegacyFeedback =
                serde_json::from_value(value).map_err(|e| e.to_string())?;
            return Ok(Self::from_legacy(legacy));
        }
        serde_json::from_value(value).map_err(|e| e.to_string())
    }

    fn from_legacy(legacy: LegacyFeedback) -> Self {
        let now = Utc::now();
        let entries = legacy
            .doc_boosts
            .into_iter()
            .map(|(id, boost)| {
                let entry = FeedbackEntry {
                    document_id: id.clone(),
                    boost,
                    style_notes: None,
                    timestamp: now,
                };
                (id, entry)
            })
            .collect();
        let notes = legacy
            .last_notes
            .filter(|n| !n.trim().is_empty())
            .map(|note| StyleNote {
                note,
                timestamp: now,
            })
            .into_iter()
            .collect();
        Self {
            entries,
            style: StyleFlags {
                bullets: legacy.style_bullets.min(MAX_STYLE_LEVEL),
                citations: legacy.style_citations.min(MAX_STYLE_LEVEL),
                proportionality_emphasis: legacy.emphasis_proportionality.min(MAX_STYLE_LEVEL),
            },
            notes,
        }
    }

    fn push_note(&mut self, note: &str) {
        let note = note.trim();
        if note.is_empty() {
            return;
        }
        self.notes.push(StyleNote {
            note: note.to_string(),
            timestamp: Utc::now(),
        });
        if self.notes.len() > MAX_STORED_NOTES {
            let excess = self.notes.len() - MAX_STORED_NOTES;
            self.notes.drain(..excess);
        }
    }

    fn apply_delta(&mut self, document_id: &str, delta: f32, note: Option<&str>, bound: f32) -> f32 {
        let current = self.entries.get(document_id).map_or(0.0, |e| e.boost);
        let delta = if delta.is_finite() { delta } else { 0.0 };
        let boost = (current + delta).clamp(-bound, bound);
        let note = note.map(str::trim).filter(|n| !n.is_empty());
        let previous_note = self
            .entries
            .get(document_id)
            .and_then(|e| e.style_notes.clone());

        self.entries.insert(
            document_id.to_string(),
            FeedbackEntry {
                document_id: document_id.to_string(),
                boost,
                style_notes: note.map(str::to_string).or(previous_note),
                timestamp: Utc::now(),
            },
        );
        boost
    }
}

/// Feedback store shared by concurrent retrievals.
pub struct FeedbackStore {
    path: Option<PathBuf>,
    bound: f32,
    snapshot: RwLock<Arc<FeedbackData>>,
    write_lock: Mutex<()>,
}

impl FeedbackStore {
    /// A store with no backing file. Mutations only live in memory.
    pub fn in_memory() -> Self {
        Self::from_data(None, FeedbackData::default())
    }

    /// Load the store at `path`.
    ///
    /// An absent or empty file yields an empty store. Malformed content fails
    /// with [`StoreError::CorruptFeedback`].
    pub fn try_load(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Ok(Self::from_data(Some(path.to_path_buf()), FeedbackData::default()));
        }
        let json = std::fs::read_to_string(path)?;
        if json.trim().is_empty() {
            return Ok(Self::from_data(Some(path.to_path_buf()), FeedbackData::default()));
        }
        let data = FeedbackData::parse(&json).map_err(|reason| StoreError::CorruptFeedback {
            path: path.to_path_buf(),
            reason,
        })?;
        info!(entries = data.entries.len(), path = %path.display(), "loaded feedback store");
        Ok(Self::from_data(Some(path.to_path_buf()), data))
    }

    /// Load the store at `path`, recovering from any failure with an empty
    /// store bound to the same path. The next write replaces the bad file.
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(store) => store,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "feedback store unreadable, starting empty");
                Self::from_data(Some(path.to_path_buf()), FeedbackData::default())
            }
        }
    }

    /// Override the boost bound (default [`DEFAULT_BOOST_BOUND`]).
    pub fn with_bound(mut self, bound: f32) -> Self {
        self.bound = bound.abs();
        self
    }

    fn from_data(path: Option<PathBuf>, mut data: FeedbackData) -> Self {
        for entry in data.entries.values_mut() {
            if !entry.boost.is_finite() {
                entry.boost = 0.0;
            }
        }
        Self {
            path,
            bound: DEFAULT_BOOST_BOUND,
            snapshot: RwLock::new(Arc::new(data)),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn bound(&self) -> f32 {
        self.bound
    }

    fn current(&self) -> Arc<FeedbackData> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Boost for a document, 0.0 when none is recorded.
    pub fn get_boost(&self, document_id: &str) -> f32 {
        self.current()
            .entries
            .get(document_id)
            .map_or(0.0, |e| e.boost.clamp(-self.bound, self.bound))
    }

    pub fn entry(&self, document_id: &str) -> Option<FeedbackEntry> {
        self.current().entries.get(document_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.current().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn style_flags(&self) -> StyleFlags {
        self.current().style
    }

    /// Recent style notes, most recent first, without repeats, at most five.
    pub fn style_hints(&self) -> Vec<String> {
        let data = self.current();
        let mut hints: Vec<String> = Vec::with_capacity(MAX_STYLE_HINTS);
        for note in data.notes.iter().rev() {
            if hints.len() == MAX_STYLE_HINTS {
                break;
            }
            if !hints.iter().any(|h| h == &note.note) {
                hints.push(note.note.clone());
            }
        }
        hints
    }

    /// Add `boost_delta` to a document's boost, clamp to the bound, persist.
    ///
    /// Returns the stored boost.
    pub fn record(
        &self,
        document_id: &str,
        boost_delta: f32,
        style_note: Option<&str>,
    ) -> Result<f32, StoreError> {
        self.mutate(|data, bound| {
            let boost = data.apply_delta(document_id, boost_delta, style_note, bound);
            if let Some(note) = style_note {
                data.push_note(note);
            }
            boost
        })
        .inspect(|boost| info!(document = document_id, boost, "recorded feedback"))
    }

    /// Apply a thumbs-up/down verdict on a drafted result.
    ///
    /// Every used document moves by [`VERDICT_STEP`]; the style flags learn
    /// the preference (citations and proportionality emphasis on approval,
    /// bullets on rejection).
    pub fn record_verdict(
        &self,
        thumbs_up: bool,
        used_document_ids: &[String],
        note: Option<&str>,
    ) -> Result<StyleFlags, StoreError> {
        let delta = if thumbs_up { VERDICT_STEP } else { -VERDICT_STEP };
        self.mutate(|data, bound| {
            for id in used_document_ids {
                data.apply_delta(id, delta, note, bound);
            }
            if let Some(note) = note {
                data.push_note(note);
            }
            let style = &mut data.style;
            if thumbs_up {
                style.citations = (style.citations + 1).min(MAX_STYLE_LEVEL);
                style.proportionality_emphasis =
                    (style.proportionality_emphasis + 1).min(MAX_STYLE_LEVEL);
            } else {
                style.bullets = (style.bullets + 1).min(MAX_STYLE_LEVEL);
            }
            *style
        })
        .inspect(|_| {
            info!(
                thumbs_up,
                documents = used_document_ids.len(),
                "recorded verdict feedback"
            )
        })
    }

    fn mutate<T>(&self, apply: impl FnOnce(&mut FeedbackData, f32) -> T) -> Result<T, StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = (*self.current()).clone();
        let out = apply(&mut next, self.bound);
        if let Some(path) = &self.path {
            persist(path, &next)?;
        }
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
        Ok(out)
    }
}

/// Write `data` next to `path` and atomically rename it into place.
fn persist(path: &Path, data: &FeedbackData) -> Result<(), StoreError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, data)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}
