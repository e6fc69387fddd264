//! Content signature calculation - the identity of a code pattern
//!
//! A signature is the SHA-256 digest of a job's normalized metadata and code
//! files, rendered as 64 lowercase hex characters. It is the sole key for
//! trusted-code and job-history records: two jobs with identical displayed
//! content always collide to the same signature.
//!
//! Normalization rules:
//! - `name` and `description` are trimmed
//! - tags are sorted lexicographically
//! - code files are iterated in sorted path order with raw content
//!   (whitespace and newlines in file content are significant)
//!
//! The normalized structure is serialized as compact key-sorted JSON before
//! hashing, so the digest is independent of caller-side map or tag ordering.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// The content of a job as seen by a reviewer: the fields that define its
/// identity for trusted-code matching. Requester and timestamps are
/// deliberately excluded - a trusted pattern matches regardless of sender.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobContent {
    pub name: String,

    /// Absent descriptions hash as the empty string
    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Relative path -> raw file text. May be empty or partial when code
    /// extraction failed upstream.
    #[serde(default)]
    pub code_files: BTreeMap<String, String>,
}

impl JobContent {
    /// Compute the content signature for this job
    pub fn signature(&self) -> String {
        signature(&self.name, &self.description, &self.tags, &self.code_files)
    }
}

/// Compute the signature of a job's content.
///
/// Deterministic: identical logical content always yields the identical
/// digest regardless of calling order, map iteration order, or process.
pub fn signature(
    name: &str,
    description: &str,
    tags: &[String],
    code_files: &BTreeMap<String, String>,
) -> String {
    let mut sorted_tags: Vec<&str> = tags.iter().map(|t| t.as_str()).collect();
    sorted_tags.sort_unstable();

    // serde_json's Map is BTreeMap-backed (preserve_order is off), so nested
    // objects serialize with sorted keys and the encoding is canonical.
    let canonical = serde_json::json!({
        "name": name.trim(),
        "description": description.trim(),
        "tags": sorted_tags,
        "code_files": code_files,
    });

    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Shorten a signature for human-readable log lines and approval reasons
pub fn short(signature: &str) -> &str {
    &signature[..signature.len().min(12)]
}
