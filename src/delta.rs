//! Schema deltas and version identifiers
//!
//! A [`Delta`] is the unit of schema evolution: the immutable diff between two
//! adjacent versions of a subject, together with the field-level rules that
//! rewrite a record across that edge.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};
use crate::metadata::DeltaMetadata;

/// A record being transformed: field name -> JSON value.
///
/// `serde_json::Map` keeps keys sorted, which gives records a canonical
/// serialization (see [`crate::fingerprint`]).
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Opaque, ordered schema version identifier (e.g. "v1", "2024-03").
///
/// Ordering is lexicographic and drives the resolver's tie-break between
/// equal-length transformation paths. Deserialization routes through
/// [`VersionId::new`], so identifiers read from the wire or the store obey
/// the same rules as ones built in code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct VersionId(String);

impl VersionId {
    /// Create a version identifier. Fails on empty identifiers and on
    /// identifiers that cannot be used as store document names.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(SchemaError::InvalidDelta(
                "version identifier must not be empty".to_string(),
            ));
        }
        if id.contains('/') || id.contains("..") {
            return Err(SchemaError::InvalidDelta(format!(
                "version identifier {id:?} contains path characters"
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for VersionId {
    type Error = SchemaError;

    fn try_from(id: String) -> Result<Self> {
        Self::new(id)
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for VersionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The immutable difference between two adjacent schema versions.
///
/// Registered into a subject's version graph exactly once and never mutated
/// or deleted afterwards; deleting a delta would disconnect history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delta {
    /// Version this delta upgrades from
    pub from_version: VersionId,
    /// Version this delta upgrades to
    pub to_version: VersionId,
    /// Fields added in `to_version`
    #[serde(default)]
    pub added: BTreeSet<String>,
    /// Fields removed in `to_version`
    #[serde(default)]
    pub removed: BTreeSet<String>,
    /// Forward rules: target field in `to_version` -> expression over the
    /// `from_version` record
    #[serde(default)]
    pub transformations: BTreeMap<String, String>,
    /// Inverse rules: target field in `from_version` -> expression over the
    /// `to_version` record. Required for every removed field before the edge
    /// can be walked in reverse.
    #[serde(default)]
    pub inverse_transformations: BTreeMap<String, String>,
    /// Optional registration metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<DeltaMetadata>,
}

impl Delta {
    /// Create a delta between two versions with no field changes.
    pub fn new(from_version: VersionId, to_version: VersionId) -> Self {
        Self {
            from_version,
            to_version,
            added: BTreeSet::new(),
            removed: BTreeSet::new(),
            transformations: BTreeMap::new(),
            inverse_transformations: BTreeMap::new(),
            metadata: None,
        }
    }

    /// Add a field introduced by this delta.
    pub fn add_field(mut self, field: impl Into<String>) -> Self {
        self.added.insert(field.into());
        self
    }

    /// Add a field removed by this delta.
    pub fn remove_field(mut self, field: impl Into<String>) -> Self {
        self.removed.insert(field.into());
        self
    }

    /// Attach a forward transformation rule for a target field.
    pub fn transform(mut self, field: impl Into<String>, rule: impl Into<String>) -> Self {
        self.transformations.insert(field.into(), rule.into());
        self
    }

    /// Attach an inverse transformation rule for a target field.
    pub fn inverse(mut self, field: impl Into<String>, rule: impl Into<String>) -> Self {
        self.inverse_transformations.insert(field.into(), rule.into());
        self
    }

    /// Attach registration metadata.
    pub fn with_metadata(mut self, metadata: DeltaMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Whether this delta can be applied in reverse (downgrade).
    ///
    /// Every removed field must have an inverse rule to reconstruct it;
    /// fields that were merely added are dropped without a rule.
    pub fn is_invertible(&self) -> bool {
        self.removed
            .iter()
            .all(|f| self.inverse_transformations.contains_key(f))
    }

    /// Structural validation, enforced before registration.
    pub fn validate(&self) -> Result<()> {
        if self.from_version == self.to_version {
            return Err(SchemaError::InvalidDelta(format!(
                "from and to version are both {}",
                self.from_version
            )));
        }
        // Forward rules target fields of to_version; a field removed by this
        // delta no longer exists there.
        for field in self.transformations.keys() {
            if self.removed.contains(field) {
                return Err(SchemaError::InvalidDelta(format!(
                    "transformation targets field {field:?} which this delta removes"
                )));
            }
        }
        // Inverse rules target fields of from_version; a field added by this
        // delta does not exist there.
        for field in self.inverse_transformations.keys() {
            if self.added.contains(field) {
                return Err(SchemaError::InvalidDelta(format!(
                    "inverse transformation targets field {field:?} which this delta adds"
                )));
            }
        }
        Ok(())
    }
}
