//! Transformation cache
//!
//! LRU cache over resolved chains, keyed by (subject, source, target).
//! Each entry may also memoize one transformed record, keyed by the
//! fingerprint of the input it was computed from. Entries for a pair are
//! dropped whenever a newly registered delta could shorten the pair's
//! chain.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use tracing::debug;

use crate::delta::{Record, VersionId};
use crate::error::{Result, SchemaError};
use crate::fingerprint::Fingerprint;
use crate::graph::ResolvedChain;

pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub subject: String,
    pub source: VersionId,
    pub target: VersionId,
}

impl CacheKey {
    pub fn new(subject: impl Into<String>, source: VersionId, target: VersionId) -> Self {
        Self {
            subject: subject.into(),
            source,
            target,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    chain: Arc<ResolvedChain>,
    memo: Option<(Fingerprint, Record)>,
}

/// Shared LRU cache of resolved chains and memoized transforms.
#[derive(Debug)]
pub struct TransformationCache {
    entries: Mutex<LruCache<CacheKey, CacheEntry>>,
}

impl TransformationCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn with_default_capacity() -> Self {
        // DEFAULT_CACHE_CAPACITY is non-zero.
        let capacity = NonZeroUsize::new(DEFAULT_CACHE_CAPACITY)
            .unwrap_or(NonZeroUsize::MIN);
        Self::new(capacity)
    }

    /// Looks up the chain cached for `key`, verifying that the cached
    /// chain's endpoints still match the key it was filed under.
    pub fn get_chain(&self, key: &CacheKey) -> Result<Option<Arc<ResolvedChain>>> {
        let mut entries = self.lock();
        let chain = match entries.get(key) {
            Some(entry) => Arc::clone(&entry.chain),
            None => return Ok(None),
        };
        if chain.subject != key.subject
            || chain.source != key.source
            || chain.target != key.target
        {
            entries.pop(key);
            return Err(SchemaError::CacheInconsistency(format!(
                "cached chain {}:{}->{} filed under {}:{}->{}",
                chain.subject,
                chain.source,
                chain.target,
                key.subject,
                key.source,
                key.target
            )));
        }
        Ok(Some(chain))
    }

    pub fn put_chain(&self, key: CacheKey, chain: Arc<ResolvedChain>) {
        let mut entries = self.lock();
        entries.put(
            key,
            CacheEntry { chain, memo: None },
        );
    }

    /// Returns the memoized output for `key` if one exists for exactly
    /// this input fingerprint.
    pub fn get_memo(&self, key: &CacheKey, fingerprint: &Fingerprint) -> Option<Record> {
        let mut entries = self.lock();
        let entry = entries.get(key)?;
        match &entry.memo {
            Some((memo_fp, record)) if memo_fp == fingerprint => Some(record.clone()),
            _ => None,
        }
    }

    /// Memoizes one transformed record on an existing chain entry. A
    /// newer input replaces the previous memo.
    pub fn put_memo(&self, key: &CacheKey, fingerprint: Fingerprint, record: Record) {
        let mut entries = self.lock();
        if let Some(entry) = entries.get_mut(key) {
            entry.memo = Some((fingerprint, record));
        }
    }

    /// Drops every entry whose (source, target) pair appears in
    /// `affected` for `subject`.
    pub fn invalidate_pairs(&self, subject: &str, affected: &[(VersionId, VersionId)]) {
        let mut entries = self.lock();
        let mut dropped = 0usize;
        for (source, target) in affected {
            let key = CacheKey::new(subject, source.clone(), target.clone());
            if entries.pop(&key).is_some() {
                dropped += 1;
            }
        }
        if dropped > 0 {
            debug!(subject, dropped, "invalidated cached chains");
        }
    }

    /// Drops every entry for `subject`.
    pub fn invalidate_subject(&self, subject: &str) {
        let mut entries = self.lock();
        let keys: Vec<CacheKey> = entries
            .iter()
            .filter(|(key, _)| key.subject == subject)
            .map(|(key, _)| key.clone())
            .collect();
        for key in keys {
            entries.pop(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<CacheKey, CacheEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
