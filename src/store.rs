//! Delta persistence
//!
//! Deltas are the unit of storage: a subject's history is the set of deltas
//! registered for it, and everything else (graph, matrix, chains) is
//! rebuilt from them. Two backends are provided, an in-memory map for tests
//! and embedding, and a directory layout of one JSON file per delta.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use crate::delta::{Delta, VersionId};
use crate::error::{Result, SchemaError};

/// Backend for delta persistence.
pub trait DeltaStore: Send + Sync {
    /// Persists one delta for `subject`. Duplicate (from, to) pairs are the
    /// caller's problem; the graph rejects them before persistence.
    fn put_delta(&self, subject: &str, delta: &Delta) -> Result<()>;

    fn get_delta(&self, subject: &str, from: &VersionId, to: &VersionId)
        -> Result<Option<Delta>>;

    /// All deltas for `subject`, in a deterministic order.
    fn list_deltas(&self, subject: &str) -> Result<Vec<Delta>>;

    /// Every version mentioned by a delta of `subject`, sorted.
    fn list_versions(&self, subject: &str) -> Result<Vec<VersionId>> {
        let mut versions = BTreeSet::new();
        for delta in self.list_deltas(subject)? {
            versions.insert(delta.from_version);
            versions.insert(delta.to_version);
        }
        Ok(versions.into_iter().collect())
    }

    /// All subjects with at least one delta, sorted.
    fn list_subjects(&self) -> Result<Vec<String>>;
}

/// In-memory store, registration order preserved.
#[derive(Debug, Default)]
pub struct MemoryStore {
    subjects: Mutex<HashMap<String, Vec<Delta>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<Delta>>> {
        match self.subjects.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl DeltaStore for MemoryStore {
    fn put_delta(&self, subject: &str, delta: &Delta) -> Result<()> {
        let mut subjects = self.lock();
        subjects
            .entry(subject.to_string())
            .or_default()
            .push(delta.clone());
        Ok(())
    }

    fn get_delta(
        &self,
        subject: &str,
        from: &VersionId,
        to: &VersionId,
    ) -> Result<Option<Delta>> {
        let subjects = self.lock();
        Ok(subjects.get(subject).and_then(|deltas| {
            deltas
                .iter()
                .find(|d| &d.from_version == from && &d.to_version == to)
                .cloned()
        }))
    }

    fn list_deltas(&self, subject: &str) -> Result<Vec<Delta>> {
        let subjects = self.lock();
        Ok(subjects.get(subject).cloned().unwrap_or_default())
    }

    fn list_subjects(&self) -> Result<Vec<String>> {
        let subjects = self.lock();
        let mut names: Vec<String> = subjects.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

/// One JSON file per delta under `<root>/<subject>/<from>__<to>.json`.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Opens (and creates if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn subject_dir(&self, subject: &str) -> Result<PathBuf> {
        if subject.is_empty() || subject.contains(['/', '\\']) || subject.contains("..") {
            return Err(SchemaError::InvalidDelta(format!(
                "subject {subject:?} is not a valid store name"
            )));
        }
        Ok(self.root.join(subject))
    }

    fn delta_path(&self, subject: &str, from: &VersionId, to: &VersionId) -> Result<PathBuf> {
        Ok(self
            .subject_dir(subject)?
            .join(format!("{}__{}.json", from, to)))
    }
}

impl DeltaStore for FileStore {
    fn put_delta(&self, subject: &str, delta: &Delta) -> Result<()> {
        let dir = self.subject_dir(subject)?;
        fs::create_dir_all(&dir)?;
        let path = self.delta_path(subject, &delta.from_version, &delta.to_version)?;
        let json = serde_json::to_string_pretty(delta)?;
        fs::write(&path, json)?;
        debug!(subject, path = %path.display(), "persisted delta");
        Ok(())
    }

    fn get_delta(
        &self,
        subject: &str,
        from: &VersionId,
        to: &VersionId,
    ) -> Result<Option<Delta>> {
        let path = self.delta_path(subject, from, to)?;
        match fs::read_to_string(&path) {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list_deltas(&self, subject: &str) -> Result<Vec<Delta>> {
        let dir = self.subject_dir(subject)?;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut paths = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();
        let mut deltas = Vec::with_capacity(paths.len());
        for path in paths {
            let json = fs::read_to_string(&path)?;
            deltas.push(serde_json::from_str(&json)?);
        }
        Ok(deltas)
    }

    fn list_subjects(&self) -> Result<Vec<String>> {
        let mut subjects = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    subjects.push(name.to_string());
                }
            }
        }
        subjects.sort();
        Ok(subjects)
    }
}
