//! Persistence of the accumulated topic vocabulary.
//!
//! The ontology lives in a flat comma-separated file shared across runs.
//! Saving is always a union with whatever is already on disk, so concurrent
//! batches can only add names, never lose them.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum VocabularyError {
    #[error("failed to read topics file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write topics file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Load and persist the known topic names.
pub trait VocabularyStore: Send + Sync {
    fn load(&self) -> Result<BTreeSet<String>, VocabularyError>;

    /// Persists the union of `topics` with the already stored names.
    fn save(&self, topics: &BTreeSet<String>) -> Result<(), VocabularyError>;
}

/// Comma-separated topics file. Reading trims each entry and drops empties;
/// a missing file reads as an empty vocabulary. Writing emits the sorted
/// union on a single line.
pub struct FileVocabulary {
    path: PathBuf,
}

impl FileVocabulary {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl VocabularyStore for FileVocabulary {
    fn load(&self) -> Result<BTreeSet<String>, VocabularyError> {
        if !self.path.exists() {
            return Ok(BTreeSet::new());
        }
        let raw = std::fs::read_to_string(&self.path).map_err(|source| VocabularyError::Read {
            path: self.path.clone(),
            source,
        })?;
        Ok(raw
            .split([',', '\n'])
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn save(&self, topics: &BTreeSet<String>) -> Result<(), VocabularyError> {
        let mut all = self.load()?;
        all.extend(topics.iter().cloned());
        let line = all.iter().map(String::as_str).collect::<Vec<_>>().join(",");
        std::fs::write(&self.path, line).map_err(|source| VocabularyError::Write {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), topics = all.len(), "vocabulary saved");
        Ok(())
    }
}

/// In-memory store for tests and dry runs.
#[derive(Default)]
pub struct MemoryVocabulary {
    topics: Mutex<BTreeSet<String>>,
}

impl MemoryVocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(topics: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            topics: Mutex::new(topics.into_iter().map(Into::into).collect()),
        }
    }
}

impl VocabularyStore for MemoryVocabulary {
    fn load(&self) -> Result<BTreeSet<String>, VocabularyError> {
        Ok(self
            .topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, topics: &BTreeSet<String>) -> Result<(), VocabularyError> {
        self.topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(topics.iter().cloned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileVocabulary::new(dir.path().join("topics.txt"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_load_trims_and_drops_empties() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("topics.txt");
        std::fs::write(&path, " availability , latency ,, \n database ").unwrap();
        let loaded = FileVocabulary::new(&path).load().unwrap();
        assert_eq!(
            loaded,
            BTreeSet::from([
                "availability".to_string(),
                "latency".to_string(),
                "database".to_string()
            ])
        );
    }

    #[test]
    fn test_save_unions_with_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("topics.txt");
        std::fs::write(&path, "latency,availability").unwrap();

        let store = FileVocabulary::new(&path);
        store
            .save(&BTreeSet::from(["dependency".to_string(), "latency".to_string()]))
            .unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw, "availability,dependency,latency");
    }

    #[test]
    fn test_save_creates_file_when_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("topics.txt");
        let store = FileVocabulary::new(&path);
        store.save(&BTreeSet::from(["network".to_string()])).unwrap();
        assert_eq!(store.load().unwrap(), BTreeSet::from(["network".to_string()]));
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryVocabulary::seeded(["availability"]);
        store.save(&BTreeSet::from(["dependency".to_string()])).unwrap();
        let loaded = store.load().unwrap();
        assert!(loaded.contains("availability"));
        assert!(loaded.contains("dependency"));
    }
}
