//! JSON-file knowledge base of taught question/answer pairs.
//!
//! File layout: `{"questions": [{"questions": "<question>", "answer": "<answer>"}, ...]}`.
//! Saves go through a temp file in the target directory and an atomic rename. Appends are
//! serialized by a per-store async lock so concurrent teach answers are not lost.
//!
//! `try_load`, `load` and `save` block; async callers use `read` and `append`, which run the
//! file work on tokio's blocking pool.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;

const DEFAULT_PATH: &str = "knowledge_base.json";

/// One taught question/answer pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    #[serde(rename = "questions")]
    pub question: String,
    pub answer: String,
}

impl KnowledgeEntry {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// Ordered list of entries. Lookup order is insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeBase {
    #[serde(rename = "questions", default)]
    pub entries: Vec<KnowledgeEntry>,
}

impl KnowledgeBase {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push(&mut self, entry: KnowledgeEntry) {
        self.entries.push(entry);
    }

    /// First entry whose question equals `message` ignoring case (exact match, not substring).
    pub fn find_answer(&self, message: &str) -> Option<&str> {
        let needle = message.to_lowercase();
        self.entries
            .iter()
            .find(|e| e.question.to_lowercase() == needle)
            .map(|e| e.answer.as_str())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("knowledge file I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("knowledge file {path} is malformed: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// File-backed knowledge store.
pub struct KnowledgeStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl KnowledgeStore {
    /// Store at `./knowledge_base.json`.
    pub fn new() -> Self {
        Self::open_path(DEFAULT_PATH)
    }

    /// Store at the given path. The file is created on first save.
    pub fn open_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the base. A missing file is an empty base; anything else unreadable is an error.
    pub fn try_load(&self) -> Result<KnowledgeBase, StoreError> {
        read_base(&self.path)
    }

    /// Reads the base, falling back to an empty one on any failure.
    pub fn load(&self) -> KnowledgeBase {
        load_or_empty(&self.path)
    }

    /// Writes the whole base atomically (temp file + rename).
    pub fn save(&self, base: &KnowledgeBase) -> Result<(), StoreError> {
        write_base(&self.path, base)
    }

    /// [`load`](Self::load) on the blocking pool.
    pub async fn read(&self) -> KnowledgeBase {
        let path = self.path.clone();
        match tokio::task::spawn_blocking(move || load_or_empty(&path)).await {
            Ok(base) => base,
            Err(e) => {
                tracing::warn!(target: "parley::knowledge", error = %e, "Knowledge read task failed; using empty base");
                KnowledgeBase::default()
            }
        }
    }

    /// Load, push, save under the store's write lock. Returns the saved base.
    ///
    /// A malformed file is replaced rather than appended to; the read error is logged.
    pub async fn append(&self, entry: KnowledgeEntry) -> Result<KnowledgeBase, StoreError> {
        let _guard = self.write_lock.lock().await;
        let path = self.path.clone();
        let base = tokio::task::spawn_blocking(move || {
            let mut base = load_or_empty(&path);
            base.push(entry);
            write_base(&path, &base).map(|()| base)
        })
        .await
        .map_err(|e| StoreError::Io {
            path: self.path.clone(),
            source: std::io::Error::other(e),
        })??;
        tracing::debug!(target: "parley::knowledge", entries = base.len(), "Knowledge base saved");
        Ok(base)
    }
}

fn read_base(path: &Path) -> Result<KnowledgeBase, StoreError> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(KnowledgeBase::default()),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_slice(&bytes).map_err(|source| StoreError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

fn load_or_empty(path: &Path) -> KnowledgeBase {
    read_base(path).unwrap_or_else(|e| {
        tracing::warn!(target: "parley::knowledge", error = %e, "Knowledge base unreadable; using empty base");
        KnowledgeBase::default()
    })
}

fn write_base(path: &Path, base: &KnowledgeBase) -> Result<(), StoreError> {
    let io_err = |source: std::io::Error| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(io_err)?;

    let bytes = serde_json::to_vec_pretty(base).map_err(|source| StoreError::Malformed {
        path: path.to_path_buf(),
        source,
    })?;
    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
    tmp.write_all(&bytes).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

impl Default for KnowledgeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn temp_store() -> (tempfile::TempDir, KnowledgeStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = KnowledgeStore::open_path(dir.path().join("kb.json"));
        (dir, store)
    }

    #[test]
    fn missing_file_loads_empty() {
        let (_dir, store) = temp_store();
        assert!(store.try_load().unwrap().is_empty());
        assert!(store.load().is_empty());
    }

    #[test]
    fn malformed_file_is_an_error_but_load_is_empty() {
        let (_dir, store) = temp_store();
        std::fs::write(store.path(), b"{not json").unwrap();
        assert!(matches!(store.try_load(), Err(StoreError::Malformed { .. })));
        assert!(store.load().is_empty());
    }

    #[test]
    fn file_format_keeps_questions_field_name() {
        let (_dir, store) = temp_store();
        let mut base = KnowledgeBase::default();
        base.push(KnowledgeEntry::new("Who made you?", "A small team."));
        store.save(&base).unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(store.path()).unwrap()).unwrap();
        assert_eq!(raw["questions"][0]["questions"], "Who made you?");
        assert_eq!(raw["questions"][0]["answer"], "A small team.");
        assert_eq!(store.load(), base);
    }

    #[test]
    fn reads_file_written_by_older_service() {
        let (_dir, store) = temp_store();
        std::fs::write(
            store.path(),
            br#"{"questions": [{"questions": "ping", "answer": "pong"}]}"#,
        )
        .unwrap();
        let base = store.load();
        assert_eq!(base.find_answer("PING"), Some("pong"));
    }

    #[test]
    fn load_twice_is_identical() {
        let (_dir, store) = temp_store();
        let mut base = KnowledgeBase::default();
        base.push(KnowledgeEntry::new("a", "1"));
        base.push(KnowledgeEntry::new("b", "2"));
        store.save(&base).unwrap();
        assert_eq!(store.load(), store.load());
    }

    #[test]
    fn find_answer_is_case_insensitive_exact_and_first_wins() {
        let mut base = KnowledgeBase::default();
        base.push(KnowledgeEntry::new("What is Rust?", "A language."));
        base.push(KnowledgeEntry::new("what is rust?", "Oxidised iron."));
        assert_eq!(base.find_answer("WHAT IS RUST?"), Some("A language."));
        assert_eq!(base.find_answer("what is rust"), None);
        assert_eq!(base.find_answer("is Rust"), None);
    }

    #[test]
    fn save_creates_missing_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = KnowledgeStore::open_path(dir.path().join("nested/deeper/kb.json"));
        store.save(&KnowledgeBase::default()).unwrap();
        assert!(store.path().exists());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn async_read_and_append_match_blocking_load() {
        let (_dir, store) = temp_store();
        assert!(store.read().await.is_empty());
        let saved = store.append(KnowledgeEntry::new("ping", "pong")).await.unwrap();
        assert_eq!(store.read().await, saved);
        assert_eq!(store.load(), saved);

        std::fs::write(store.path(), b"{not json").unwrap();
        assert!(store.read().await.is_empty());
    }

    #[tokio::test]
    async fn concurrent_appends_are_not_lost() {
        let (_dir, store) = temp_store();
        let store = Arc::new(store);
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .append(KnowledgeEntry::new(format!("q{}", i), format!("a{}", i)))
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        let base = store.load();
        assert_eq!(base.len(), 16);
        for i in 0..16 {
            assert_eq!(base.find_answer(&format!("Q{}", i)), Some(format!("a{}", i).as_str()));
        }
    }
}
