//! Trusted-sender allowlist
//!
//! One record per email address. Jobs from these senders are auto-approved
//! unconditionally, so every mutation here is an administrative trust
//! decision; entries are stored owner-only like everything else in the tree.

use crate::store::error::{Result, StoreError};
use crate::store::records::{Collection, RecordStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{info, warn};

const COLLECTION: &str = "allowlist";

/// A single trusted-sender record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllowlistEntry {
    pub email: String,
    pub added_at: DateTime<Utc>,
}

/// Normalize an email for identity comparison: trimmed, ASCII-lowercased
pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// Derive a filesystem-safe record key from a normalized email
fn record_key(email: &str) -> String {
    email
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '.' | '_' | '-' | '@' | '+' => c,
            _ => '_',
        })
        .collect()
}

/// The set of requester identities whose jobs are auto-approved
pub struct Allowlist {
    collection: Collection,
    default_email: String,
}

impl Allowlist {
    /// `default_email` is the administrator-configured seed entry, written
    /// exactly once if the collection is found empty.
    pub fn new(store: &RecordStore, default_email: impl Into<String>) -> Self {
        Self {
            collection: store.collection(COLLECTION),
            default_email: normalize_email(&default_email.into()),
        }
    }

    /// All trusted sender emails, sorted. Lazily seeds the configured
    /// default entry when the collection is empty, persisting the seed.
    pub fn list(&self) -> Result<BTreeSet<String>> {
        if self.collection.is_empty()? {
            info!(
                "allowlist empty - seeding default trusted sender {}",
                self.default_email
            );
            self.add(&self.default_email)?;
        }

        let entries: Vec<AllowlistEntry> = self.collection.read_all()?;
        Ok(entries
            .into_iter()
            .map(|e| normalize_email(&e.email))
            .collect())
    }

    pub fn contains(&self, email: &str) -> bool {
        self.collection.exists(&record_key(&normalize_email(email)))
    }

    /// Add a trusted sender. Adding an existing entry is a no-op.
    pub fn add(&self, email: &str) -> Result<()> {
        let email = normalize_email(email);
        let key = record_key(&email);
        if self.collection.exists(&key) {
            return Ok(());
        }

        self.collection.write(
            &key,
            &AllowlistEntry {
                email: email.clone(),
                added_at: Utc::now(),
            },
        )?;
        info!("added trusted sender {email}");
        Ok(())
    }

    /// Remove a trusted sender. Removing an absent entry logs and succeeds.
    pub fn remove(&self, email: &str) -> Result<()> {
        let email = normalize_email(email);
        if !self.collection.remove(&record_key(&email))? {
            warn!("remove: {email} was not in the allowlist");
        } else {
            info!("removed trusted sender {email}");
        }
        Ok(())
    }

    /// Look up the full record for an email, if present
    pub fn entry(&self, email: &str) -> Result<AllowlistEntry> {
        let email = normalize_email(email);
        self.collection
            .read(&record_key(&email))
            .map_err(|e| match e {
                StoreError::NotFound { .. } => StoreError::NotFound { key: email.clone() },
                other => other,
            })
    }
}
