//! Schema registry facade
//!
//! Ties the pieces together: per-subject version graphs and compatibility
//! matrices behind read/write locks, a shared chain cache, the
//! transformation engine, and a pluggable delta store. Registration is
//! persist-then-link: a delta reaches the store before the graph, so a
//! crash between the two loses an index entry, never a delta.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};

use crate::cache::{CacheKey, TransformationCache};
use crate::config::{RegistryConfig, StoreBackend};
use crate::delta::{Delta, Record, VersionId};
use crate::engine::{CancelToken, TransformationEngine};
use crate::error::{Result, SchemaError};
use crate::fingerprint::Fingerprint;
use crate::graph::{self, Compatibility, CompatibilityMatrix, ResolvedChain, VersionGraph};
use crate::store::{DeltaStore, FileStore, MemoryStore};

/// Graph and matrix for one subject, always updated together.
#[derive(Debug, Default)]
struct SubjectState {
    graph: VersionGraph,
    matrix: CompatibilityMatrix,
}

impl SubjectState {
    fn link(&mut self, delta: Delta) -> Result<Vec<(VersionId, VersionId)>> {
        let delta = self.graph.register(delta)?;
        Ok(self.matrix.apply_edge(&delta))
    }
}

/// The delta schema registry.
pub struct SchemaRegistry {
    store: Arc<dyn DeltaStore>,
    subjects: RwLock<HashMap<String, Arc<RwLock<SubjectState>>>>,
    cache: TransformationCache,
    engine: TransformationEngine,
}

impl SchemaRegistry {
    /// Opens a registry over `store`, rehydrating every persisted subject.
    pub fn new(store: Arc<dyn DeltaStore>, config: &RegistryConfig) -> Result<Self> {
        let capacity = NonZeroUsize::new(config.cache.capacity).ok_or_else(|| {
            SchemaError::InvalidDelta("cache capacity must be at least 1".to_string())
        })?;
        let registry = Self {
            store,
            subjects: RwLock::new(HashMap::new()),
            cache: TransformationCache::new(capacity),
            engine: TransformationEngine::new(config.engine.step_budget),
        };
        registry.rehydrate()?;
        Ok(registry)
    }

    /// Builds a registry from configuration, choosing the store backend.
    pub fn from_config(config: &RegistryConfig) -> Result<Self> {
        let store: Arc<dyn DeltaStore> = match config.store.backend {
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
            StoreBackend::File => Arc::new(FileStore::open(config.store_path())?),
        };
        Self::new(store, config)
    }

    /// In-memory registry with default settings. Handy for tests.
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            subjects: RwLock::new(HashMap::new()),
            cache: TransformationCache::with_default_capacity(),
            engine: TransformationEngine::default(),
        }
    }

    fn rehydrate(&self) -> Result<()> {
        for subject in self.store.list_subjects()? {
            let deltas = self.store.list_deltas(&subject)?;
            let state = self.subject_state(&subject);
            let mut state = write_lock(&state);
            for delta in deltas {
                state.link(delta)?;
            }
            info!(
                subject,
                versions = state.graph.version_count(),
                deltas = state.graph.delta_count(),
                "rehydrated subject"
            );
        }
        Ok(())
    }

    fn subject_state(&self, subject: &str) -> Arc<RwLock<SubjectState>> {
        {
            let subjects = read_lock(&self.subjects);
            if let Some(state) = subjects.get(subject) {
                return Arc::clone(state);
            }
        }
        let mut subjects = write_lock(&self.subjects);
        Arc::clone(subjects.entry(subject.to_string()).or_default())
    }

    fn existing_state(&self, subject: &str) -> Option<Arc<RwLock<SubjectState>>> {
        read_lock(&self.subjects).get(subject).cloned()
    }

    /// Registers a delta for `subject`.
    ///
    /// The delta is checked against the graph first, then persisted, then
    /// linked. Cached chains for every pair the new edge could shorten are
    /// dropped before the write lock is released.
    pub fn register(&self, subject: &str, delta: Delta) -> Result<()> {
        let state = self.subject_state(subject);
        let mut state = write_lock(&state);

        state.graph.check(&delta)?;
        self.store.put_delta(subject, &delta)?;
        let from = delta.from_version.clone();
        let to = delta.to_version.clone();
        let affected = state.link(delta)?;
        self.cache.invalidate_pairs(subject, &affected);

        info!(
            subject,
            %from,
            %to,
            invalidated = affected.len(),
            "registered delta"
        );
        Ok(())
    }

    /// All versions known for `subject`, sorted.
    pub fn versions(&self, subject: &str) -> Vec<VersionId> {
        match self.existing_state(subject) {
            Some(state) => read_lock(&state).graph.versions(),
            None => Vec::new(),
        }
    }

    /// All subjects with at least one registered delta, sorted.
    pub fn subjects(&self) -> Vec<String> {
        let mut names: Vec<String> = read_lock(&self.subjects)
            .iter()
            .filter(|(_, state)| read_lock(state).graph.delta_count() > 0)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// The registered delta from `from` to `to`, if any.
    pub fn delta(&self, subject: &str, from: &VersionId, to: &VersionId) -> Option<Arc<Delta>> {
        let state = self.existing_state(subject)?;
        let state = read_lock(&state);
        state.graph.delta(from, to)
    }

    /// Resolves the transformation chain from `source` to `target`,
    /// consulting the cache first.
    pub fn resolve(
        &self,
        subject: &str,
        source: &VersionId,
        target: &VersionId,
    ) -> Result<Arc<ResolvedChain>> {
        let key = CacheKey::new(subject, source.clone(), target.clone());
        if let Some(chain) = self.cache.get_chain(&key)? {
            debug!(subject, %source, %target, "chain cache hit");
            return Ok(chain);
        }

        let state = self.existing_state(subject).ok_or_else(|| {
            SchemaError::UnknownVersion {
                subject: subject.to_string(),
                version: source.clone(),
            }
        })?;
        let state = read_lock(&state);
        let chain = Arc::new(graph::resolve(&state.graph, subject, source, target)?);
        self.cache.put_chain(key, Arc::clone(&chain));
        Ok(chain)
    }

    /// Classifies the compatibility between two versions of `subject`.
    pub fn classify(
        &self,
        subject: &str,
        a: &VersionId,
        b: &VersionId,
    ) -> Result<Compatibility> {
        let state = self.existing_state(subject).ok_or_else(|| {
            SchemaError::UnknownVersion {
                subject: subject.to_string(),
                version: a.clone(),
            }
        })?;
        let state = read_lock(&state);
        for version in [a, b] {
            if !state.graph.has_version(version) {
                return Err(SchemaError::UnknownVersion {
                    subject: subject.to_string(),
                    version: version.clone(),
                });
            }
        }
        Ok(state.matrix.classify(a, b))
    }

    /// Transforms `record` from `source` to `target`.
    pub fn transform(
        &self,
        subject: &str,
        source: &VersionId,
        target: &VersionId,
        record: &Record,
    ) -> Result<Record> {
        self.transform_cancellable(subject, source, target, record, &CancelToken::new())
    }

    /// Like [`transform`](Self::transform), checking `cancel` between
    /// deltas.
    pub fn transform_cancellable(
        &self,
        subject: &str,
        source: &VersionId,
        target: &VersionId,
        record: &Record,
        cancel: &CancelToken,
    ) -> Result<Record> {
        let chain = self.resolve(subject, source, target)?;
        let key = CacheKey::new(subject, source.clone(), target.clone());
        let fingerprint = Fingerprint::of_record(record);
        if let Some(memo) = self.cache.get_memo(&key, &fingerprint) {
            debug!(subject, %source, %target, "transform memo hit");
            return Ok(memo);
        }

        let output = self
            .engine
            .apply_cancellable(record, &chain.steps, cancel)?;
        self.cache.put_memo(&key, fingerprint, output.clone());
        Ok(output)
    }

    pub fn cached_chains(&self) -> usize {
        self.cache.len()
    }
}

fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
