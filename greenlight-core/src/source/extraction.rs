//! Code extraction from job objects
//!
//! Ranked strategies, tried in order, first success wins:
//!
//! 1. bulk review-files accessor
//! 2. file listing + per-file reads
//! 3. direct walk of the job's code directory
//!
//! Each step is independently fallible and non-fatal. The final fallback is
//! empty code content - extraction never produces an error, it degrades.

use crate::signature::JobContent;
use crate::source::{Job, JobData};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;
use walkdir::WalkDir;

/// Extract a job's displayed content for signature calculation and
/// trusted-code matching
pub fn extract_content(job: &dyn Job) -> JobContent {
    JobContent {
        name: job.name(),
        description: job.description().unwrap_or_default(),
        tags: job.tags(),
        code_files: extract_code_files(job),
    }
}

/// Extract content plus the non-signed identity fields
pub fn extract_data(job: &dyn Job) -> JobData {
    JobData {
        id: job.id(),
        requester_email: job.requester_email(),
        created_at: job.created_at(),
        content: extract_content(job),
    }
}

fn extract_code_files(job: &dyn Job) -> BTreeMap<String, String> {
    if let Some(files) = job.review_files() {
        if !files.is_empty() {
            return files;
        }
    }

    if let Some(names) = job.file_names() {
        let mut files = BTreeMap::new();
        for name in names {
            match job.read_file(&name) {
                Some(content) => {
                    files.insert(name, content);
                }
                None => warn!("could not read file {name} from job {}", job.id()),
            }
        }
        if !files.is_empty() {
            return files;
        }
    }

    if let Some(dir) = job.code_dir() {
        let files = read_code_dir(&dir);
        if !files.is_empty() {
            return files;
        }
    }

    // no capability produced anything - evaluate with empty code content
    BTreeMap::new()
}

/// Read every file under `dir`, keyed by path relative to it. Unreadable
/// files are skipped; non-UTF-8 bytes are replaced rather than rejected.
fn read_code_dir(dir: &Path) -> BTreeMap<String, String> {
    let mut files = BTreeMap::new();
    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = match entry.path().strip_prefix(dir) {
            Ok(rel) => rel.to_string_lossy().into_owned(),
            Err(_) => continue,
        };
        match std::fs::read(entry.path()) {
            Ok(bytes) => {
                files.insert(relative, String::from_utf8_lossy(&bytes).into_owned());
            }
            Err(e) => warn!("skipping unreadable code file {relative}: {e}"),
        }
    }
    files
}
