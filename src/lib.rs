//! Delta Schema Registry
//!
//! A schema evolution layer that stores versions as nodes in a directed
//! acyclic graph, connected by deltas: declarative records of which fields
//! were added, removed, and how values are rewritten. Records migrate
//! between any two connected versions by composing the deltas along the
//! shortest path.
//!
//! ## Features
//!
//! - **Version Graph**: Append-only DAG of versions per subject, cycles rejected
//! - **Chain Resolver**: Shortest delta chain between versions, downgrades over invertible deltas
//! - **Compatibility Matrix**: Incremental FULL/BACKWARD/FORWARD/NONE classification
//! - **Sandboxed Transformations**: Rules are pure expressions over record fields, with a builtin allow-list and an evaluation budget
//! - **Chain Cache**: LRU cache of resolved chains with fingerprint-keyed memoization
//!
//! ## Example
//!
//! ```no_run
//! use delta_schemas::{Delta, SchemaRegistry, VersionId};
//! use serde_json::json;
//!
//! # fn main() -> delta_schemas::Result<()> {
//! let registry = SchemaRegistry::in_memory();
//!
//! let v1 = VersionId::new("v1")?;
//! let v2 = VersionId::new("v2")?;
//! let delta = Delta::new(v1.clone(), v2.clone())
//!     .add_field("firstName")
//!     .add_field("lastName")
//!     .remove_field("name")
//!     .transform("firstName", "get(split(name, \" \"), 0)")
//!     .transform("lastName", "get(split(name, \" \"), 1)")
//!     .inverse("name", "concat(firstName, \" \", lastName)");
//! registry.register("user", delta)?;
//!
//! let record = json!({"name": "Ada Lovelace"});
//! let migrated = registry.transform("user", &v1, &v2, record.as_object().unwrap())?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod delta;
pub mod engine;
pub mod error;
pub mod expr;
pub mod fingerprint;
pub mod graph;
pub mod metadata;
pub mod registry;
pub mod store;

pub use cache::TransformationCache;
pub use config::RegistryConfig;
pub use delta::{Delta, Record, VersionId};
pub use engine::{CancelToken, TransformationEngine};
pub use error::{Result, SchemaError};
pub use fingerprint::Fingerprint;
pub use graph::{Compatibility, CompatibilityMatrix, ResolvedChain, VersionGraph};
pub use metadata::DeltaMetadata;
pub use registry::SchemaRegistry;
pub use store::{DeltaStore, FileStore, MemoryStore};
