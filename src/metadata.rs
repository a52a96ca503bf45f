//! Registration metadata attached to deltas

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata recorded alongside a delta at registration time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaMetadata {
    /// When the delta was registered
    pub created_at: DateTime<Utc>,
    /// Who registered it
    pub created_by: String,
    /// Free-form description of the change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Labels for search/operational grouping
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Marks a version whose use is discouraged (the delta itself is
    /// retained; history never shrinks)
    #[serde(default)]
    pub deprecated: bool,
}

impl DeltaMetadata {
    /// Create metadata stamped with the current time.
    pub fn new(created_by: impl Into<String>) -> Self {
        Self {
            created_at: Utc::now(),
            created_by: created_by.into(),
            description: None,
            tags: Vec::new(),
            deprecated: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}
