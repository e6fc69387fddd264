//! Trusted-code registry
//!
//! A trusted code pattern is a previously-seen job promoted by an explicit
//! "mark trusted" action. The signature is the primary key and the only
//! lookup key: matching is an exact content-identity lookup, never fuzzy or
//! structural. Any byte-level difference in code, name, description, or tags
//! is a full miss.

use crate::signature::{short, JobContent};
use crate::store::error::{Result, StoreError};
use crate::store::history::HistoryStore;
use crate::store::records::{Collection, RecordStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const COLLECTION: &str = "trusted_code";

/// A job's content promoted to auto-approval, keyed by its signature
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustedCodePattern {
    pub signature: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// The requester of the job this pattern was promoted from
    pub requester_email: String,
    #[serde(default)]
    pub code_files: std::collections::BTreeMap<String, String>,
    pub created_at: Option<DateTime<Utc>>,
    pub trusted_at: DateTime<Utc>,
}

/// Registry of content-addressed trusted code patterns
pub struct TrustedCodeStore {
    collection: Collection,
}

impl TrustedCodeStore {
    pub fn new(store: &RecordStore) -> Self {
        Self {
            collection: store.collection(COLLECTION),
        }
    }

    /// All patterns, most-recently-marked first
    pub fn list(&self) -> Result<Vec<TrustedCodePattern>> {
        let mut patterns: Vec<TrustedCodePattern> = self.collection.read_all()?;
        patterns.sort_by(|a, b| b.trusted_at.cmp(&a.trusted_at));
        Ok(patterns)
    }

    /// Promote a job from history to trusted code. The signature must
    /// reference an existing history record; the pattern is a copy of that
    /// record plus the marked-at timestamp. The signature is never accepted
    /// as caller-supplied content identity - it is only the history key, and
    /// the stored pattern re-derives its key from the copied content.
    pub fn mark(&self, history: &HistoryStore, signature: &str) -> Result<TrustedCodePattern> {
        let record = history.get(signature)?;

        let content = record.content();
        let pattern = TrustedCodePattern {
            signature: content.signature(),
            name: record.name,
            description: record.description,
            tags: record.tags,
            requester_email: record.requester_email,
            code_files: record.code_files,
            created_at: record.created_at,
            trusted_at: Utc::now(),
        };
        self.collection.write(&pattern.signature, &pattern)?;
        info!("marked trusted code pattern {}", short(&pattern.signature));
        Ok(pattern)
    }

    /// Demote a pattern. Unmarking an absent signature logs a warning and
    /// succeeds.
    pub fn unmark(&self, signature: &str) -> Result<()> {
        if !self.collection.remove(signature)? {
            warn!("unmark: {} was not marked trusted", short(signature));
        } else {
            info!("unmarked trusted code pattern {}", short(signature));
        }
        Ok(())
    }

    pub fn contains(&self, signature: &str) -> bool {
        self.collection.exists(signature)
    }

    /// Exact-signature lookup of a job's content. O(1) on content identity;
    /// there is no partial-match policy.
    pub fn matches(&self, content: &JobContent) -> Result<Option<TrustedCodePattern>> {
        let signature = content.signature();
        match self.collection.read(&signature) {
            Ok(pattern) => Ok(Some(pattern)),
            Err(StoreError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.collection.keys()?.len())
    }
}
