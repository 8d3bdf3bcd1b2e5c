//! Healing memory: persisted healings, feedback and request attempts.
//!
//! The pipeline only needs [`HealingMemory`]; [`JsonFileMemory`] is the
//! bundled store, a single pretty-printed JSON document rewritten on every
//! write. Writes are serialized behind a mutex, and a record is readable as
//! soon as `append` returns. The attempt log keeps the newest
//! [`MAX_ATTEMPTS`] entries.

use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::errors::HealerError;
use crate::types::{
    FeedbackEntry, FeedbackRating, HealingAttempt, HealingRecord, HealingStats, HistoryItem,
    HistoryPage, NewHealingRecord, SelectorCount,
};

/// How many selectors `stats` lists as most healed
const MOST_HEALED_LIMIT: usize = 10;
const RECENT_DAYS: i64 = 7;
/// Attempts kept in the store; older ones are dropped first
pub const MAX_ATTEMPTS: usize = 1_000;

/// One healing request as logged, successful or not
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptLog {
    pub failed_selector: String,
    pub url: String,
    pub success: bool,
    pub error_message: Option<String>,
    pub processing_time_ms: f64,
}

pub trait HealingMemory: Send + Sync {
    /// Most recent healing whose old selector equals `old_selector` exactly.
    fn lookup_by_old_selector(&self, old_selector: &str) -> Result<Option<HealingRecord>, HealerError>;

    /// Persist a healing and return its id.
    fn append(&self, record: NewHealingRecord) -> Result<u64, HealerError>;

    /// Record feedback for a healing and set its success flag. A healing
    /// accepts feedback once.
    fn attach_feedback(
        &self,
        healing_id: u64,
        rating: FeedbackRating,
        comment: Option<String>,
        actual_selector_used: Option<String>,
    ) -> Result<u64, HealerError>;

    fn log_attempt(&self, attempt: AttemptLog) -> Result<u64, HealerError>;

    /// Persist the outcome of one heal: the healing when there is one, and the attempt.
    ///
    /// Returns the new healing id. Stores that can do both in a single write
    /// should override this.
    fn record_outcome(
        &self,
        record: Option<NewHealingRecord>,
        attempt: AttemptLog,
    ) -> Result<Option<u64>, HealerError> {
        let id = record.map(|r| self.append(r)).transpose()?;
        self.log_attempt(attempt)?;
        Ok(id)
    }

    /// Healings newest first. `page` starts at 1; `url_filter` is a substring match.
    fn history(
        &self,
        page: usize,
        page_size: usize,
        url_filter: Option<&str>,
    ) -> Result<HistoryPage, HealerError>;

    fn stats(&self) -> Result<HealingStats, HealerError>;

    /// Cheap reachability check for health reporting
    fn check(&self) -> Result<(), HealerError>;
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct MemoryStore {
    #[serde(default)]
    last_healing_id: u64,
    #[serde(default)]
    last_feedback_id: u64,
    #[serde(default)]
    last_attempt_id: u64,
    #[serde(default)]
    healings: Vec<HealingRecord>,
    #[serde(default)]
    feedback: Vec<FeedbackEntry>,
    #[serde(default)]
    attempts: Vec<HealingAttempt>,
}

impl MemoryStore {
    fn push_healing(&mut self, record: NewHealingRecord) -> u64 {
        self.last_healing_id += 1;
        let id = self.last_healing_id;
        self.healings.push(HealingRecord {
            id,
            old_selector: record.old_selector,
            new_selector: record.new_selector,
            confidence: record.confidence,
            url: record.url,
            selector_type: record.selector_type,
            timestamp: Utc::now(),
            processing_time_ms: record.processing_time_ms,
            llm_used: record.llm_used,
            screenshot_analyzed: record.screenshot_analyzed,
            success: None,
        });
        id
    }

    fn push_attempt(&mut self, attempt: AttemptLog) -> u64 {
        self.last_attempt_id += 1;
        let id = self.last_attempt_id;
        self.attempts.push(HealingAttempt {
            id,
            failed_selector: attempt.failed_selector,
            url: attempt.url,
            timestamp: Utc::now(),
            success: attempt.success,
            error_message: attempt.error_message,
            processing_time_ms: attempt.processing_time_ms,
        });
        if self.attempts.len() > MAX_ATTEMPTS {
            let excess = self.attempts.len() - MAX_ATTEMPTS;
            self.attempts.drain(..excess);
        }
        id
    }
}

/// JSON-file healing memory
pub struct JsonFileMemory {
    path: Option<PathBuf>,
    store: Mutex<MemoryStore>,
}

impl JsonFileMemory {
    /// Open (or create) a store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, HealerError> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let store = if path.exists() {
            let content = fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                MemoryStore::default()
            } else {
                serde_json::from_str(&content).map_err(|e| {
                    HealerError::Storage(format!("{} is not a valid store: {}", path.display(), e))
                })?
            }
        } else {
            MemoryStore::default()
        };

        debug!(
            "Opened healing memory at {} ({} healings)",
            path.display(),
            store.healings.len()
        );
        Ok(Self {
            path: Some(path),
            store: Mutex::new(store),
        })
    }

    /// A store that lives only as long as the process
    pub fn in_memory() -> Self {
        Self {
            path: None,
            store: Mutex::new(MemoryStore::default()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryStore>, HealerError> {
        self.store
            .lock()
            .map_err(|_| HealerError::Storage("healing memory lock poisoned".to_string()))
    }

    /// Apply `change` and write the result; on a failed write the store is left as it was.
    fn write<T>(
        &self,
        change: impl FnOnce(&mut MemoryStore) -> Result<T, HealerError>,
    ) -> Result<T, HealerError> {
        let mut store = self.lock()?;
        let mut next = store.clone();
        let result = change(&mut next)?;
        self.persist(&next)?;
        *store = next;
        Ok(result)
    }

    fn persist(&self, store: &MemoryStore) -> Result<(), HealerError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(store)
            .map_err(|e| HealerError::Storage(e.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl HealingMemory for JsonFileMemory {
    fn lookup_by_old_selector(&self, old_selector: &str) -> Result<Option<HealingRecord>, HealerError> {
        let store = self.lock()?;
        Ok(store
            .healings
            .iter()
            .filter(|h| h.old_selector == old_selector)
            .max_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)))
            .cloned())
    }

    fn append(&self, record: NewHealingRecord) -> Result<u64, HealerError> {
        let id = self.write(|store| Ok(store.push_healing(record)))?;
        info!("Saved healing {}", id);
        Ok(id)
    }

    fn attach_feedback(
        &self,
        healing_id: u64,
        rating: FeedbackRating,
        comment: Option<String>,
        actual_selector_used: Option<String>,
    ) -> Result<u64, HealerError> {
        self.write(|store| {
            let Some(healing) = store.healings.iter_mut().find(|h| h.id == healing_id) else {
                return Err(HealerError::NotFound(format!("healing {}", healing_id)));
            };
            if healing.success.is_some() {
                return Err(HealerError::InvalidRequest(format!(
                    "feedback already recorded for healing {}",
                    healing_id
                )));
            }
            healing.success = Some(rating == FeedbackRating::Positive);

            store.last_feedback_id += 1;
            let id = store.last_feedback_id;
            store.feedback.push(FeedbackEntry {
                id,
                healing_id,
                rating,
                comment,
                actual_selector_used,
                timestamp: Utc::now(),
            });
            Ok(id)
        })
    }

    fn log_attempt(&self, attempt: AttemptLog) -> Result<u64, HealerError> {
        self.write(|store| Ok(store.push_attempt(attempt)))
    }

    fn record_outcome(
        &self,
        record: Option<NewHealingRecord>,
        attempt: AttemptLog,
    ) -> Result<Option<u64>, HealerError> {
        let id = self.write(|store| {
            let id = record.map(|r| store.push_healing(r));
            store.push_attempt(attempt);
            Ok(id)
        })?;
        if let Some(id) = id {
            info!("Saved healing {}", id);
        }
        Ok(id)
    }

    fn history(
        &self,
        page: usize,
        page_size: usize,
        url_filter: Option<&str>,
    ) -> Result<HistoryPage, HealerError> {
        if page == 0 || page_size == 0 {
            return Err(HealerError::InvalidRequest(
                "page and page size must be at least 1".to_string(),
            ));
        }
        let store = self.lock()?;

        let feedback_by_healing: HashMap<u64, &FeedbackEntry> =
            store.feedback.iter().map(|f| (f.healing_id, f)).collect();

        let mut matching: Vec<&HealingRecord> = store
            .healings
            .iter()
            .filter(|h| url_filter.is_none_or(|filter| h.url.contains(filter)))
            .collect();
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));

        let total_count = matching.len();
        let offset = (page - 1).saturating_mul(page_size);
        let items = matching
            .into_iter()
            .skip(offset)
            .take(page_size)
            .map(|h| {
                let feedback = feedback_by_healing.get(&h.id);
                HistoryItem {
                    id: h.id,
                    old_selector: h.old_selector.clone(),
                    new_selector: h.new_selector.clone(),
                    confidence: h.confidence,
                    url: h.url.clone(),
                    timestamp: h.timestamp,
                    success: h.success,
                    feedback_rating: feedback.map(|f| f.rating),
                    feedback_comment: feedback.and_then(|f| f.comment.clone()),
                }
            })
            .collect();

        Ok(HistoryPage {
            items,
            total_count,
            page,
            page_size,
            has_more: offset.saturating_add(page_size) < total_count,
        })
    }

    fn stats(&self) -> Result<HealingStats, HealerError> {
        let store = self.lock()?;

        let total_healings = store.healings.len();
        let total_with_feedback = store.feedback.len();
        let positive = store
            .feedback
            .iter()
            .filter(|f| f.rating == FeedbackRating::Positive)
            .count();
        let negative = total_with_feedback - positive;

        let success_rate = if total_with_feedback > 0 {
            round2(positive as f64 / total_with_feedback as f64)
        } else {
            0.0
        };

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for h in &store.healings {
            *counts.entry(h.old_selector.as_str()).or_default() += 1;
        }
        let mut most_healed: Vec<SelectorCount> = counts
            .into_iter()
            .map(|(selector, count)| SelectorCount {
                selector: selector.to_string(),
                count,
            })
            .collect();
        most_healed.sort_by(|a, b| b.count.cmp(&a.count).then(a.selector.cmp(&b.selector)));
        most_healed.truncate(MOST_HEALED_LIMIT);

        let cutoff = Utc::now() - ChronoDuration::days(RECENT_DAYS);
        let recent_healings_count = store.healings.iter().filter(|h| h.timestamp > cutoff).count();

        let average_confidence = if total_healings > 0 {
            round2(store.healings.iter().map(|h| h.confidence).sum::<f64>() / total_healings as f64)
        } else {
            0.0
        };

        Ok(HealingStats {
            total_healings,
            total_with_feedback,
            positive_feedback_count: positive,
            negative_feedback_count: negative,
            success_rate,
            most_healed_selectors: most_healed,
            recent_healings_count,
            average_confidence,
        })
    }

    fn check(&self) -> Result<(), HealerError> {
        let _store = self.lock()?;
        if let Some(path) = &self.path {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let meta = fs::metadata(dir)?;
            if meta.permissions().readonly() {
                return Err(HealerError::Storage(format!("{} is read-only", dir.display())));
            }
        }
        Ok(())
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod memory_test;
