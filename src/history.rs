//! Append-only, capacity-bounded log of successful outputs.
//!
//! The engine only ever calls [`HistoryRecorder::append`], once per
//! successful job. Two recorders are provided: [`InMemoryHistory`] and
//! [`JsonFileHistory`], which persists the same ring buffer to disk.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::HistoryError;

/// One recorded output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry<T> {
    pub id: String,
    pub kind: String,
    pub payload: T,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Value,
}

impl<T> HistoryEntry<T> {
    fn new(kind: &str, payload: T, metadata: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind: kind.to_string(),
            payload,
            created_at: Utc::now(),
            metadata,
        }
    }
}

/// Sink for successful outputs. Returns the id of the new entry.
pub trait HistoryRecorder<T>: Send + Sync {
    fn append(&self, kind: &str, payload: &T, metadata: Value) -> Result<String, HistoryError>;
}

// Push and evict oldest until within capacity.
fn push_capped<T>(entries: &mut VecDeque<HistoryEntry<T>>, entry: HistoryEntry<T>, capacity: usize) {
    entries.push_back(entry);
    while entries.len() > capacity {
        entries.pop_front();
    }
}

/// Ring buffer kept in memory only.
#[derive(Debug)]
pub struct InMemoryHistory<T> {
    capacity: usize,
    entries: Mutex<VecDeque<HistoryEntry<T>>>,
}

impl<T: Clone> InMemoryHistory<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::new()),
        }
    }

    /// Entries oldest first.
    pub fn entries(&self) -> Vec<HistoryEntry<T>> {
        self.entries
            .lock()
            .map(|e| e.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl<T: Clone + Send> HistoryRecorder<T> for InMemoryHistory<T> {
    fn append(&self, kind: &str, payload: &T, metadata: Value) -> Result<String, HistoryError> {
        let entry = HistoryEntry::new(kind, payload.clone(), metadata);
        let id = entry.id.clone();
        let mut entries = self.entries.lock().map_err(|_| HistoryError::Poisoned)?;
        push_capped(&mut entries, entry, self.capacity);
        Ok(id)
    }
}

/// Ring buffer persisted as a JSON array, rewritten on every append.
#[derive(Debug)]
pub struct JsonFileHistory<T> {
    path: PathBuf,
    capacity: usize,
    entries: Mutex<VecDeque<HistoryEntry<T>>>,
}

impl<T: Clone + Serialize + DeserializeOwned> JsonFileHistory<T> {
    /// Open the history at `path`, loading any existing entries.
    ///
    /// A missing file yields an empty history. Entries beyond `capacity` are
    /// evicted oldest first.
    pub fn open(path: impl Into<PathBuf>, capacity: usize) -> Result<Self, HistoryError> {
        let path = path.into();
        let capacity = capacity.max(1);
        let mut entries: VecDeque<HistoryEntry<T>> = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            if contents.trim().is_empty() {
                VecDeque::new()
            } else {
                serde_json::from_str(&contents)?
            }
        } else {
            VecDeque::new()
        };
        while entries.len() > capacity {
            entries.pop_front();
        }
        Ok(Self {
            path,
            capacity,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Up to `limit` entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<HistoryEntry<T>> {
        self.entries
            .lock()
            .map(|e| e.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn persist(&self, entries: &VecDeque<HistoryEntry<T>>) -> Result<(), HistoryError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl<T> HistoryRecorder<T> for JsonFileHistory<T>
where
    T: Clone + Serialize + DeserializeOwned + Send,
{
    fn append(&self, kind: &str, payload: &T, metadata: Value) -> Result<String, HistoryError> {
        let entry = HistoryEntry::new(kind, payload.clone(), metadata);
        let id = entry.id.clone();
        let mut entries = self.entries.lock().map_err(|_| HistoryError::Poisoned)?;
        push_capped(&mut entries, entry, self.capacity);
        self.persist(&entries)?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn in_memory_evicts_oldest() {
        let history = InMemoryHistory::new(2);
        history.append("portrait", &"a".to_string(), json!({})).unwrap();
        history.append("portrait", &"b".to_string(), json!({})).unwrap();
        history.append("portrait", &"c".to_string(), json!({})).unwrap();

        let payloads: Vec<String> = history.entries().into_iter().map(|e| e.payload).collect();
        assert_eq!(payloads, vec!["b", "c"]);
    }

    #[test]
    fn append_returns_unique_ids() {
        let history = InMemoryHistory::new(10);
        let a = history.append("k", &1u32, Value::Null).unwrap();
        let b = history.append("k", &2u32, Value::Null).unwrap();
        assert_ne!(a, b);
        assert_eq!(history.entries()[0].id, a);
    }

    #[test]
    fn entry_carries_kind_and_metadata() {
        let history = InMemoryHistory::new(10);
        history
            .append("id-photo", &"x".to_string(), json!({"index": 3}))
            .unwrap();
        let entry = &history.entries()[0];
        assert_eq!(entry.kind, "id-photo");
        assert_eq!(entry.metadata["index"], 3);
    }

    #[test]
    fn json_file_persists_across_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("history.json");

        let history = JsonFileHistory::<String>::open(&path, 5).unwrap();
        assert!(history.is_empty());
        history.append("themed", &"first".to_string(), json!({})).unwrap();
        history.append("themed", &"second".to_string(), json!({})).unwrap();
        drop(history);

        let reopened = JsonFileHistory::<String>::open(&path, 5).unwrap();
        assert_eq!(reopened.len(), 2);
        let recent: Vec<String> = reopened.recent(10).into_iter().map(|e| e.payload).collect();
        assert_eq!(recent, vec!["second", "first"]);
    }

    #[test]
    fn json_file_trims_to_capacity() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");

        let history = JsonFileHistory::<u32>::open(&path, 3).unwrap();
        for n in 0..5u32 {
            history.append("k", &n, Value::Null).unwrap();
        }
        let recent: Vec<u32> = history.recent(10).into_iter().map(|e| e.payload).collect();
        assert_eq!(recent, vec![4, 3, 2]);

        // Reopening with a smaller capacity evicts more.
        drop(history);
        let smaller = JsonFileHistory::<u32>::open(&path, 1).unwrap();
        let recent: Vec<u32> = smaller.recent(10).into_iter().map(|e| e.payload).collect();
        assert_eq!(recent, vec![4]);
    }

    #[test]
    fn json_file_rejects_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, "{not json").unwrap();
        let err = JsonFileHistory::<u32>::open(&path, 3).unwrap_err();
        assert!(matches!(err, HistoryError::Json(_)));
    }
}
