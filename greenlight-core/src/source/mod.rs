//! Job Source boundary - the external queue platform
//!
//! The engine consumes two collaborator contracts: a source of pending and
//! completed jobs, and the approval operation. Implementations adapt
//! whatever platform actually holds the jobs; [`fs_queue`] ships a
//! spool-directory adapter.
//!
//! Code extraction is modelled as optional capabilities on [`Job`] rather
//! than one required accessor: real queue platforms expose code in different
//! shapes, and the engine must tolerate whichever is available. See
//! [`extraction`] for the ranked fallback order.

pub mod extraction;
pub mod fs_queue;

use crate::signature::JobContent;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// A job object handed out by the queue platform.
///
/// `id`, `name`, and `requester_email` are always available. Everything
/// else is optional: the three extraction capabilities are probed in order
/// by [`extraction::extract_content`], and a job exposing none of them
/// evaluates with empty code content.
pub trait Job: Send + Sync {
    /// Queue-assigned job identifier (distinct from the content signature)
    fn id(&self) -> String;

    fn name(&self) -> String;

    fn requester_email(&self) -> String;

    fn description(&self) -> Option<String> {
        None
    }

    fn tags(&self) -> Vec<String> {
        Vec::new()
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        None
    }

    /// Bulk accessor: the complete path -> content mapping, if the platform
    /// can produce it in one call
    fn review_files(&self) -> Option<BTreeMap<String, String>> {
        None
    }

    /// Enumerate file paths for per-file reading
    fn file_names(&self) -> Option<Vec<String>> {
        None
    }

    /// Read one file by path; None when unreadable
    fn read_file(&self, _path: &str) -> Option<String> {
        None
    }

    /// Directory holding the job's code tree, for direct reading
    fn code_dir(&self) -> Option<PathBuf> {
        None
    }
}

/// The external queue platform
#[async_trait]
pub trait JobSource: Send + Sync {
    /// Jobs currently awaiting this operator's review
    async fn pending_jobs(&self) -> Result<Vec<Arc<dyn Job>>>;

    /// Jobs completed after being approved by this operator
    async fn completed_jobs(&self) -> Result<Vec<Arc<dyn Job>>>;

    /// Approve a pending job. `Ok(false)` means the platform rejected the
    /// approval (e.g. the job is no longer pending).
    async fn approve(&self, job: &dyn Job, reason: &str) -> Result<bool>;
}

/// A job's extracted content plus the identity fields that are not part of
/// the signature
#[derive(Debug, Clone)]
pub struct JobData {
    pub id: String,
    pub requester_email: String,
    pub created_at: Option<DateTime<Utc>>,
    pub content: JobContent,
}
