//! Job history and the decision audit log
//!
//! History records are candidates for promotion to trusted code: every job
//! this operator approved and saw complete is stored here, keyed by its
//! content signature. Decision records are an append-only audit trail of
//! every first-time disposition the engine makes.

use crate::signature::JobContent;
use crate::store::error::Result;
use crate::store::records::{Collection, RecordStore};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

const JOBS_COLLECTION: &str = "job_history";
const DECISIONS_COLLECTION: &str = "decisions";

/// A completed job, keyed by the content signature at completion time.
///
/// The key is a pure function of the displayed content, so a job re-run with
/// identical content overwrites the same record - last writer wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobHistoryRecord {
    pub signature: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub requester_email: String,
    #[serde(default)]
    pub code_files: std::collections::BTreeMap<String, String>,
    /// Queue-side job state at storage time; always "completed" today
    #[serde(default = "default_status")]
    pub status: String,
    pub created_at: Option<DateTime<Utc>>,
    pub stored_at: DateTime<Utc>,
}

fn default_status() -> String {
    "completed".to_string()
}

impl JobHistoryRecord {
    pub fn content(&self) -> JobContent {
        JobContent {
            name: self.name.clone(),
            description: self.description.clone(),
            tags: self.tags.clone(),
            code_files: self.code_files.clone(),
        }
    }
}

/// Action taken on a job's first disposition in an epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    Approve,
    Ignore,
    FailedApproval,
}

impl std::fmt::Display for DecisionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DecisionAction::Approve => "approve",
            DecisionAction::Ignore => "ignore",
            DecisionAction::FailedApproval => "failed_approval",
        };
        f.write_str(name)
    }
}

/// One append-only audit entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub id: String,
    /// The job this decision targeted (queue identifier or signature)
    pub target: String,
    pub action: DecisionAction,
    pub reason: String,
    #[serde(default)]
    pub metadata: Value,
    pub decided_at: DateTime<Utc>,
}

/// Persistent record of completed jobs and of every decision made
pub struct HistoryStore {
    jobs: Collection,
    decisions: Collection,
}

impl HistoryStore {
    pub fn new(store: &RecordStore) -> Self {
        Self {
            jobs: store.collection(JOBS_COLLECTION),
            decisions: store.collection(DECISIONS_COLLECTION),
        }
    }

    /// Store a completed job, keyed by its content signature. Re-storing an
    /// already-present signature overwrites the record (idempotent, no
    /// duplicate). Returns the signature for correlation.
    pub fn append(
        &self,
        content: &JobContent,
        requester_email: &str,
        created_at: Option<DateTime<Utc>>,
    ) -> Result<String> {
        let signature = content.signature();
        let record = JobHistoryRecord {
            signature: signature.clone(),
            name: content.name.clone(),
            description: content.description.clone(),
            tags: content.tags.clone(),
            requester_email: requester_email.to_string(),
            code_files: content.code_files.clone(),
            status: default_status(),
            created_at,
            stored_at: Utc::now(),
        };
        self.jobs.write(&signature, &record)?;
        debug!("stored job history record {}", crate::signature::short(&signature));
        Ok(signature)
    }

    /// Look up a history record by signature (NotFound when absent)
    pub fn get(&self, signature: &str) -> Result<JobHistoryRecord> {
        self.jobs.read(signature)
    }

    pub fn contains(&self, signature: &str) -> bool {
        self.jobs.exists(signature)
    }

    /// Records ordered most-recently-stored first. Storage-time ordering: a
    /// job re-stored later moves to the front.
    pub fn list(&self, limit: Option<usize>) -> Result<Vec<JobHistoryRecord>> {
        let mut records: Vec<JobHistoryRecord> = self.jobs.read_all()?;
        records.sort_by(|a, b| b.stored_at.cmp(&a.stored_at));
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    /// Append one decision to the audit log. Never overwrites or
    /// deduplicates - avoiding duplicate entries is the engine's job.
    pub fn record_decision(
        &self,
        target: &str,
        action: DecisionAction,
        reason: &str,
        metadata: Value,
    ) -> Result<DecisionRecord> {
        let record = DecisionRecord {
            id: Uuid::now_v7().to_string(),
            target: target.to_string(),
            action,
            reason: reason.to_string(),
            metadata,
            decided_at: Utc::now(),
        };
        self.decisions.write(&record.id, &record)?;
        Ok(record)
    }

    /// Audit entries, newest first
    pub fn decisions(&self, limit: Option<usize>) -> Result<Vec<DecisionRecord>> {
        let mut records: Vec<DecisionRecord> = self.decisions.read_all()?;
        records.sort_by(|a, b| b.decided_at.cmp(&a.decided_at));
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    /// Delete decision records older than `keep_days`. Job history and
    /// trusted-code records are never touched. Returns the count removed.
    pub fn prune(&self, keep_days: i64) -> Result<usize> {
        let cutoff = Utc::now() - Duration::days(keep_days);
        let mut removed = 0;
        for record in self.decisions.read_all::<DecisionRecord>()? {
            if record.decided_at < cutoff && self.decisions.remove(&record.id)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
