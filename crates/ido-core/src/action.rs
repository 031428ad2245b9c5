//! Action — one semantic user operation (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of screenshot hashes an Action may reference.
pub const MAX_SCREENSHOT_HASHES: usize = 6;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub title: String,
    pub description: String,
    pub keywords: Vec<String>,
    /// Earliest capture time among `screenshot_hashes`.
    pub timestamp: DateTime<Utc>,
    pub screenshot_hashes: Vec<String>,
    pub aggregated_into_activity_id: Option<String>,
    pub extract_knowledge: Option<bool>,
    pub knowledge_extracted: Option<bool>,
    pub created_at: DateTime<Utc>,
}

impl Action {
    /// Builds an Action, enforcing the dedup + 6-hash cap invariant.
    pub fn new(
        id: String,
        title: String,
        description: String,
        keywords: Vec<String>,
        timestamp: DateTime<Utc>,
        screenshot_hashes: Vec<String>,
    ) -> Self {
        let mut seen = std::collections::HashSet::new();
        let hashes: Vec<String> = screenshot_hashes
            .into_iter()
            .filter(|h| seen.insert(h.clone()))
            .take(MAX_SCREENSHOT_HASHES)
            .collect();

        Self {
            id,
            title,
            description,
            keywords,
            timestamp,
            screenshot_hashes: hashes,
            aggregated_into_activity_id: None,
            extract_knowledge: None,
            knowledge_extracted: None,
            created_at: Utc::now(),
        }
    }
}
