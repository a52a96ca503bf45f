//! Chain resolution
//!
//! Finds the shortest delta sequence between two versions. Upgrades walk
//! edges in their registered direction; downgrades walk invertible edges in
//! reverse. Equal-length candidates are broken deterministically in favor of
//! the lexicographically smallest sequence of intermediate versions, which a
//! breadth-first search with sorted neighbor expansion yields directly.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::delta::{Delta, VersionId};
use crate::error::{Result, SchemaError};
use crate::graph::VersionGraph;

/// One hop of a resolved chain.
#[derive(Debug, Clone)]
pub struct ChainStep {
    pub delta: Arc<Delta>,
    /// Whether the delta is applied in reverse (downgrade hop)
    pub inverse: bool,
}

impl ChainStep {
    /// Version this step starts from, honoring direction.
    pub fn from(&self) -> &VersionId {
        if self.inverse {
            &self.delta.to_version
        } else {
            &self.delta.from_version
        }
    }

    /// Version this step ends at, honoring direction.
    pub fn to(&self) -> &VersionId {
        if self.inverse {
            &self.delta.from_version
        } else {
            &self.delta.to_version
        }
    }
}

/// Ordered delta walk from a source to a target version.
///
/// Ephemeral: computed on demand and cached; superseded (not mutated) when a
/// later registration creates a shorter path.
#[derive(Debug, Clone)]
pub struct ResolvedChain {
    pub subject: String,
    pub source: VersionId,
    pub target: VersionId,
    pub steps: Vec<ChainStep>,
}

impl ResolvedChain {
    /// Number of hops.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Whether any hop applies a delta in reverse.
    pub fn is_downgrade(&self) -> bool {
        self.steps.iter().any(|s| s.inverse)
    }

    /// The versions visited, source first.
    pub fn route(&self) -> Vec<VersionId> {
        let mut route = vec![self.source.clone()];
        route.extend(self.steps.iter().map(|s| s.to().clone()));
        route
    }
}

/// Resolve the transformation chain from `source` to `target`.
///
/// Tries an upgrade path first; if the target is not a descendant, falls
/// back to a downgrade path over invertible edges. Resolution never mixes
/// the two directions in one chain.
pub fn resolve(
    graph: &VersionGraph,
    subject: &str,
    source: &VersionId,
    target: &VersionId,
) -> Result<ResolvedChain> {
    for version in [source, target] {
        if !graph.has_version(version) {
            return Err(SchemaError::UnknownVersion {
                subject: subject.to_string(),
                version: version.clone(),
            });
        }
    }

    let steps = if source == target {
        Vec::new()
    } else if let Some(steps) = shortest_walk(graph, source, target, false) {
        steps
    } else if let Some(steps) = shortest_walk(graph, source, target, true) {
        steps
    } else {
        return Err(SchemaError::NoPath {
            subject: subject.to_string(),
            from: source.clone(),
            to: target.clone(),
        });
    };

    Ok(ResolvedChain {
        subject: subject.to_string(),
        source: source.clone(),
        target: target.clone(),
        steps,
    })
}

/// BFS from `source` to `target`. Forward mode walks outgoing edges;
/// reverse mode walks incoming edges restricted to invertible deltas.
///
/// Neighbors are expanded in sorted order from a FIFO queue, so the first
/// discovery of any node is via its lexicographically smallest shortest
/// path; recording the first parent therefore realizes the tie-break.
fn shortest_walk(
    graph: &VersionGraph,
    source: &VersionId,
    target: &VersionId,
    reverse: bool,
) -> Option<Vec<ChainStep>> {
    let mut parent: HashMap<VersionId, (VersionId, Arc<Delta>)> = HashMap::new();
    let mut visited: HashSet<VersionId> = HashSet::new();
    let mut queue: VecDeque<VersionId> = VecDeque::new();

    visited.insert(source.clone());
    queue.push_back(source.clone());

    'search: while let Some(current) = queue.pop_front() {
        let mut edges = if reverse {
            graph.incoming(&current)
        } else {
            graph.neighbors(&current)
        };
        if reverse {
            edges.retain(|(_, delta)| delta.is_invertible());
        }
        edges.sort_by(|a, b| a.0.cmp(&b.0));

        for (next, delta) in edges {
            if !visited.insert(next.clone()) {
                continue;
            }
            parent.insert(next.clone(), (current.clone(), delta));
            if next == *target {
                break 'search;
            }
            queue.push_back(next);
        }
    }

    if !parent.contains_key(target) {
        return None;
    }

    let mut steps = Vec::new();
    let mut cursor = target.clone();
    while cursor != *source {
        let (prev, delta) = parent.remove(&cursor)?;
        steps.push(ChainStep {
            delta,
            inverse: reverse,
        });
        cursor = prev;
    }
    steps.reverse();
    Some(steps)
}
