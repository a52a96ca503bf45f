//! Compatibility classification
//!
//! Derived view over a subject's version graph answering "can a consumer on
//! one version read data produced at another". Maintained incrementally: a
//! registration only touches the version pairs whose path set includes the
//! new edge, so updates stay bounded as graphs grow.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::delta::{Delta, VersionId};

/// Compatibility class between two versions A and B.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Compatibility {
    /// A consumer on B can read data produced at A (chain A -> B resolves)
    Backward,
    /// A consumer on A can read data produced at B (chain B -> A resolves)
    Forward,
    /// Both directions hold
    Full,
    /// Neither direction holds
    None,
}

impl fmt::Display for Compatibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Compatibility::Backward => "BACKWARD",
            Compatibility::Forward => "FORWARD",
            Compatibility::Full => "FULL",
            Compatibility::None => "NONE",
        };
        write!(f, "{s}")
    }
}

/// Incrementally maintained reachability over one subject's graph.
///
/// Two relations are tracked: `upgrade` follows edges forward, `downgrade`
/// follows invertible edges in reverse. A pair is classified from whichever
/// directions offer a resolvable chain. Lifetime is tied to the graph: the
/// matrix is rebuilt whenever the graph is rebuilt, never persisted.
#[derive(Debug, Default)]
pub struct CompatibilityMatrix {
    /// upgrade[a] = versions reachable from a along registered edges
    upgrade: HashMap<VersionId, BTreeSet<VersionId>>,
    /// downgrade[a] = versions reachable from a walking invertible edges in
    /// reverse
    downgrade: HashMap<VersionId, BTreeSet<VersionId>>,
}

impl CompatibilityMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a newly registered delta into the matrix.
    ///
    /// Returns the ordered version pairs whose classification (and therefore
    /// any cached chain) may have changed: every (ancestor-of-from,
    /// descendant-of-to) pair in both orientations. The caller feeds this to
    /// cache invalidation.
    pub fn apply_edge(&mut self, delta: &Delta) -> Vec<(VersionId, VersionId)> {
        let from = &delta.from_version;
        let to = &delta.to_version;

        // Sources: everything that could already reach `from`, plus `from`.
        let mut sources: BTreeSet<VersionId> = self
            .upgrade
            .iter()
            .filter(|(_, reach)| reach.contains(from))
            .map(|(version, _)| version.clone())
            .collect();
        sources.insert(from.clone());

        // Targets: everything `to` could already reach, plus `to`.
        let mut targets: BTreeSet<VersionId> = self
            .upgrade
            .get(to)
            .cloned()
            .unwrap_or_default();
        targets.insert(to.clone());

        for source in &sources {
            let reach = self.upgrade.entry(source.clone()).or_default();
            reach.extend(targets.iter().cloned());
        }
        self.upgrade.entry(to.clone()).or_default();

        if delta.is_invertible() {
            // Mirror image over the reverse relation, gated per-edge so a
            // non-invertible hop never becomes part of a downgrade chain.
            let mut rev_sources: BTreeSet<VersionId> = self
                .downgrade
                .iter()
                .filter(|(_, reach)| reach.contains(to))
                .map(|(version, _)| version.clone())
                .collect();
            rev_sources.insert(to.clone());

            let mut rev_targets: BTreeSet<VersionId> = self
                .downgrade
                .get(from)
                .cloned()
                .unwrap_or_default();
            rev_targets.insert(from.clone());

            for source in &rev_sources {
                let reach = self.downgrade.entry(source.clone()).or_default();
                reach.extend(rev_targets.iter().cloned());
            }
        }

        let mut affected = Vec::with_capacity(sources.len() * targets.len() * 2);
        for a in &sources {
            for b in &targets {
                affected.push((a.clone(), b.clone()));
                affected.push((b.clone(), a.clone()));
            }
        }
        affected
    }

    /// Whether a chain from `a` to `b` resolves in either mode.
    pub fn reachable(&self, a: &VersionId, b: &VersionId) -> bool {
        if a == b {
            return true;
        }
        self.upgrade.get(a).is_some_and(|r| r.contains(b))
            || self.downgrade.get(a).is_some_and(|r| r.contains(b))
    }

    /// Classify an ordered version pair. Both versions must already be known
    /// to the graph; the registry enforces that before consulting the matrix.
    pub fn classify(&self, a: &VersionId, b: &VersionId) -> Compatibility {
        match (self.reachable(a, b), self.reachable(b, a)) {
            (true, true) => Compatibility::Full,
            (true, false) => Compatibility::Backward,
            (false, true) => Compatibility::Forward,
            (false, false) => Compatibility::None,
        }
    }
}
