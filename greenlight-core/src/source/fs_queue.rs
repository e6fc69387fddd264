//! Spool-directory job source
//!
//! Adapts a filesystem job queue to the [`JobSource`] contract. Layout:
//!
//! ```text
//! <queue>/
//!   pending/<job-id>/job.json      job metadata
//!   pending/<job-id>/code/...      submitted code tree
//!   approved/<job-id>/...          moved here on approval (+ approval.json)
//!   completed/<job-id>/...         moved here by the executor when done
//! ```
//!
//! Approval writes an `approval.json` note into the job directory and moves
//! the directory to `approved/`. The executor (outside this system) picks
//! jobs up from there and relocates them to `completed/` when finished.

use crate::source::{Job, JobSource};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

const PENDING_DIR: &str = "pending";
const APPROVED_DIR: &str = "approved";
const COMPLETED_DIR: &str = "completed";

/// Job metadata as written by the submitting platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobManifest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub requester_email: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Approval note left in the job directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalNote {
    pub approved_by: String,
    pub reason: String,
    pub approved_at: DateTime<Utc>,
}

/// One job backed by a queue subdirectory
pub struct FsQueueJob {
    id: String,
    dir: PathBuf,
    manifest: JobManifest,
}

impl FsQueueJob {
    fn load(dir: &Path) -> Result<Self> {
        let id = dir
            .file_name()
            .context("job directory has no name")?
            .to_string_lossy()
            .into_owned();
        let raw = fs::read_to_string(dir.join("job.json"))
            .with_context(|| format!("reading job manifest in {}", dir.display()))?;
        let manifest: JobManifest = serde_json::from_str(&raw)
            .with_context(|| format!("parsing job manifest for {id}"))?;
        Ok(Self {
            id,
            dir: dir.to_path_buf(),
            manifest,
        })
    }
}

impl Job for FsQueueJob {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn name(&self) -> String {
        self.manifest.name.clone()
    }

    fn requester_email(&self) -> String {
        self.manifest.requester_email.clone()
    }

    fn description(&self) -> Option<String> {
        if self.manifest.description.is_empty() {
            None
        } else {
            Some(self.manifest.description.clone())
        }
    }

    fn tags(&self) -> Vec<String> {
        self.manifest.tags.clone()
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.manifest.created_at
    }

    fn code_dir(&self) -> Option<PathBuf> {
        let code = self.dir.join("code");
        code.is_dir().then_some(code)
    }
}

/// [`JobSource`] over a spool directory tree
pub struct FsQueueSource {
    root: PathBuf,
    operator_email: String,
}

impl FsQueueSource {
    pub fn new(root: impl AsRef<Path>, operator_email: impl Into<String>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            operator_email: operator_email.into(),
        }
    }

    fn scan(&self, subdir: &str) -> Result<Vec<Arc<dyn Job>>> {
        let dir = self.root.join(subdir);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("reading queue directory {}", dir.display()))
            }
        };

        let mut jobs: Vec<Arc<dyn Job>> = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            match FsQueueJob::load(&entry.path()) {
                Ok(job) => jobs.push(Arc::new(job)),
                // a malformed job directory must not hide the rest of the queue
                Err(e) => warn!("skipping malformed job directory: {e:#}"),
            }
        }
        // stable evaluation order across cycles
        jobs.sort_by_key(|j| j.id());
        Ok(jobs)
    }
}

#[async_trait]
impl JobSource for FsQueueSource {
    async fn pending_jobs(&self) -> Result<Vec<Arc<dyn Job>>> {
        self.scan(PENDING_DIR)
    }

    async fn completed_jobs(&self) -> Result<Vec<Arc<dyn Job>>> {
        self.scan(COMPLETED_DIR)
    }

    async fn approve(&self, job: &dyn Job, reason: &str) -> Result<bool> {
        let pending = self.root.join(PENDING_DIR).join(job.id());
        if !pending.is_dir() {
            // raced with an administrator or another reviewer
            return Ok(false);
        }

        let note = ApprovalNote {
            approved_by: self.operator_email.clone(),
            reason: reason.to_string(),
            approved_at: Utc::now(),
        };
        fs::write(
            pending.join("approval.json"),
            serde_json::to_string_pretty(&note)?,
        )
        .with_context(|| format!("writing approval note for {}", job.id()))?;

        let approved = self.root.join(APPROVED_DIR);
        fs::create_dir_all(&approved)?;
        fs::rename(&pending, approved.join(job.id()))
            .with_context(|| format!("moving job {} to approved", job.id()))?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn seed_job(root: &Path, state: &str, id: &str, requester: &str) {
        let dir = root.join(state).join(id);
        fs::create_dir_all(dir.join("code")).unwrap();
        fs::write(
            dir.join("job.json"),
            serde_json::to_string_pretty(&JobManifest {
                name: format!("job {id}"),
                description: String::new(),
                tags: vec![],
                requester_email: requester.to_string(),
                created_at: None,
            })
            .unwrap(),
        )
        .unwrap();
        fs::write(dir.join("code/run.py"), "print(1)").unwrap();
    }

    #[tokio::test]
    async fn test_pending_scan_and_code_extraction() {
        let root = TempDir::new().unwrap();
        seed_job(root.path(), "pending", "j1", "a@x.com");

        let source = FsQueueSource::new(root.path(), "op@x.com");
        let pending = source.pending_jobs().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].requester_email(), "a@x.com");

        let content = crate::source::extraction::extract_content(pending[0].as_ref());
        assert_eq!(content.code_files["run.py"], "print(1)");
    }

    #[tokio::test]
    async fn test_approve_moves_job_and_writes_note() {
        let root = TempDir::new().unwrap();
        seed_job(root.path(), "pending", "j1", "a@x.com");

        let source = FsQueueSource::new(root.path(), "op@x.com");
        let pending = source.pending_jobs().await.unwrap();

        let ok = source
            .approve(pending[0].as_ref(), "trusted sender (a@x.com)")
            .await
            .unwrap();
        assert!(ok);
        assert!(source.pending_jobs().await.unwrap().is_empty());

        let note_path = root.path().join("approved/j1/approval.json");
        let note: ApprovalNote =
            serde_json::from_str(&fs::read_to_string(note_path).unwrap()).unwrap();
        assert_eq!(note.approved_by, "op@x.com");
        assert!(note.reason.contains("trusted sender"));
    }

    #[tokio::test]
    async fn test_approve_vanished_job_reports_failure() {
        let root = TempDir::new().unwrap();
        seed_job(root.path(), "pending", "j1", "a@x.com");

        let source = FsQueueSource::new(root.path(), "op@x.com");
        let pending = source.pending_jobs().await.unwrap();
        fs::remove_dir_all(root.path().join("pending/j1")).unwrap();

        let ok = source.approve(pending[0].as_ref(), "reason").await.unwrap();
        assert!(!ok);
    }

    #[tokio::test]
    async fn test_malformed_job_dir_is_skipped() {
        let root = TempDir::new().unwrap();
        seed_job(root.path(), "pending", "good", "a@x.com");
        fs::create_dir_all(root.path().join("pending/bad")).unwrap();

        let source = FsQueueSource::new(root.path(), "op@x.com");
        let pending = source.pending_jobs().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id(), "good");
    }

    #[tokio::test]
    async fn test_completed_scan() {
        let root = TempDir::new().unwrap();
        seed_job(root.path(), "completed", "done1", "a@x.com");

        let source = FsQueueSource::new(root.path(), "op@x.com");
        let completed = source.completed_jobs().await.unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id(), "done1");
    }
}
