//! The Greenlight Decision Engine - the reconciliation loop.
//!
//! On a fixed cadence the engine pulls pending jobs from the Job Source,
//! evaluates each against the Trust Store, applies an idempotent decision
//! (approve or ignore) exactly once per job per trust-state epoch, records
//! every first-time disposition to the History Store, and periodically
//! refreshes trust state and captures completed jobs.
//!
//! Maintenance work runs on independent tickers rather than one multiplexed
//! cycle counter:
//!
//! - evaluation: every poll interval (default 1s)
//! - allowlist refresh: default 30s; a changed allowlist starts a new epoch
//! - completed-job capture: default 10s
//! - ignored-cache GC: default 300s
//! - decision-log retention: default daily
//!
//! An epoch ends whenever the allowlist snapshot changes; the `ignored`
//! cache is cleared at the boundary so previously ignored jobs are
//! re-evaluated. No error in a tick body terminates the loop - the failure
//! is logged and the next tick retries.

pub mod decision;

use crate::source::{extraction, Job, JobSource};
use crate::store::allowlist::{normalize_email, Allowlist};
use crate::store::history::{DecisionAction, HistoryStore};
use crate::store::records::RecordStore;
use crate::store::trusted::TrustedCodeStore;
use anyhow::Result;
use chrono::Utc;
use decision::Verdict;
use serde_json::json;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Engine cadences and identity
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// This operator's own email. Labeling only - never a trust input.
    pub operator_email: String,

    /// Seed entry written when the allowlist is found empty
    pub default_trusted_email: String,

    /// Period of the pending-job evaluation cycle
    pub poll_interval: Duration,

    /// How often the allowlist snapshot is reloaded
    pub allowlist_refresh_interval: Duration,

    /// How often completed jobs are captured into history
    pub history_capture_interval: Duration,

    /// How often the ignored cache is garbage-collected
    pub ignored_gc_interval: Duration,

    /// How often decision-log retention runs
    pub retention_interval: Duration,

    /// Decision records older than this many days are pruned
    pub decision_keep_days: i64,
}

impl EngineConfig {
    pub fn new(operator_email: impl Into<String>, default_trusted_email: impl Into<String>) -> Self {
        Self {
            operator_email: operator_email.into(),
            default_trusted_email: default_trusted_email.into(),
            poll_interval: Duration::from_secs(1),
            allowlist_refresh_interval: Duration::from_secs(30),
            history_capture_interval: Duration::from_secs(10),
            ignored_gc_interval: Duration::from_secs(300),
            retention_interval: Duration::from_secs(24 * 60 * 60),
            decision_keep_days: 30,
        }
    }
}

/// Process-local engine state. Not persisted: `processed` is safe to lose
/// because re-capturing a completed job overwrites the same signature-keyed
/// history record, and `ignored` starts empty (the worst case is one
/// duplicate ignore record per job after a restart).
#[derive(Debug, Default)]
pub struct PollingState {
    /// Completed-job identifiers already captured into history
    processed: HashSet<String>,

    /// Job identifiers already logged as ignored in this epoch.
    /// Invalidation triggers: allowlist change (cleared), periodic GC
    /// against the source's current pending set (pruned).
    ignored: HashSet<String>,

    /// Allowlist snapshot used to detect epoch boundaries
    allowlist: BTreeSet<String>,
}

impl PollingState {
    pub fn ignored_count(&self) -> usize {
        self.ignored.len()
    }
}

/// The orchestrator: trust stores + job source + polling state
pub struct DecisionEngine {
    config: EngineConfig,
    source: Arc<dyn JobSource>,
    allowlist: Allowlist,
    trusted: TrustedCodeStore,
    history: HistoryStore,
    state: PollingState,
}

impl DecisionEngine {
    pub fn new(store: &RecordStore, source: Arc<dyn JobSource>, config: EngineConfig) -> Self {
        Self {
            allowlist: Allowlist::new(store, config.default_trusted_email.clone()),
            trusted: TrustedCodeStore::new(store),
            history: HistoryStore::new(store),
            config,
            source,
            state: PollingState::default(),
        }
    }

    pub fn state(&self) -> &PollingState {
        &self.state
    }

    /// Run the reconciliation loop until an interrupt/terminate signal.
    /// Cancellation is cooperative: a cycle in progress completes, and no
    /// cleanup is needed since every persistent write is atomic per record.
    pub async fn run(&mut self) -> Result<()> {
        self.refresh_allowlist()?;
        info!(
            "auto-approval engine running for {} ({} trusted sender(s), polling every {:?})",
            self.config.operator_email,
            self.state.allowlist.len(),
            self.config.poll_interval
        );

        let mut poll = interval(self.config.poll_interval);
        let mut refresh = interval(self.config.allowlist_refresh_interval);
        let mut capture = interval(self.config.history_capture_interval);
        let mut gc = interval(self.config.ignored_gc_interval);
        let mut retention = interval(self.config.retention_interval);
        for ticker in [&mut poll, &mut refresh, &mut capture, &mut gc, &mut retention] {
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown signal received - stopping");
                    return Ok(());
                }
                _ = poll.tick() => {
                    if let Err(e) = self.evaluate_pending().await {
                        error!("evaluation cycle failed: {e:#}");
                    }
                }
                _ = refresh.tick() => {
                    if let Err(e) = self.refresh_allowlist() {
                        error!("allowlist refresh failed: {e:#}");
                    }
                }
                _ = capture.tick() => {
                    if let Err(e) = self.capture_completed().await {
                        warn!("completed-job capture failed: {e:#}");
                    }
                }
                _ = gc.tick() => {
                    if let Err(e) = self.gc_ignored().await {
                        warn!("ignored-cache GC failed: {e:#}");
                    }
                }
                _ = retention.tick() => {
                    if let Err(e) = self.prune_decisions() {
                        warn!("decision retention failed: {e:#}");
                    }
                }
            }
        }
    }

    /// Reload the allowlist from persistent storage. A changed set starts a
    /// new epoch: the snapshot is replaced and the ignored cache cleared,
    /// since a job previously ignored may now qualify.
    pub fn refresh_allowlist(&mut self) -> Result<()> {
        let current = self.allowlist.list()?;
        if current != self.state.allowlist {
            info!(
                "allowlist updated: {:?} -> {:?}",
                self.state.allowlist, current
            );
            self.state.allowlist = current;
            self.state.ignored.clear();
        }
        Ok(())
    }

    /// Capture completed-and-approved jobs into history, once per job
    /// identifier. This is how completed jobs become eligible for promotion
    /// to trusted code.
    pub async fn capture_completed(&mut self) -> Result<()> {
        let completed = self.source.completed_jobs().await?;
        let mut stored = 0;
        for job in completed {
            let id = job.id();
            if self.state.processed.contains(&id) {
                continue;
            }
            let data = extraction::extract_data(job.as_ref());
            match self
                .history
                .append(&data.content, &data.requester_email, data.created_at)
            {
                Ok(signature) => {
                    debug!(
                        "stored completed job '{}' -> {}",
                        data.content.name,
                        crate::signature::short(&signature)
                    );
                    self.state.processed.insert(id);
                    stored += 1;
                }
                Err(e) => warn!("could not store completed job {id} in history: {e}"),
            }
        }
        if stored > 0 {
            info!("stored {stored} new completed job(s) in history");
        }
        Ok(())
    }

    /// Drop ignored-cache entries for jobs no longer pending, so the cache
    /// does not grow unbounded
    pub async fn gc_ignored(&mut self) -> Result<()> {
        let pending = self.source.pending_jobs().await?;
        let live: HashSet<String> = pending.iter().map(|j| j.id()).collect();
        let before = self.state.ignored.len();
        self.state.ignored.retain(|id| live.contains(id));
        let dropped = before - self.state.ignored.len();
        if dropped > 0 {
            debug!("GC dropped {dropped} ignored-job entr(ies)");
        }
        Ok(())
    }

    /// Apply the configured retention policy to the decision log
    pub fn prune_decisions(&self) -> Result<()> {
        let removed = self.history.prune(self.config.decision_keep_days)?;
        if removed > 0 {
            info!(
                "pruned {removed} decision record(s) older than {} days",
                self.config.decision_keep_days
            );
        }
        Ok(())
    }

    /// Evaluate every currently pending job, in source order. A single bad
    /// job never aborts the cycle.
    pub async fn evaluate_pending(&mut self) -> Result<()> {
        let pending = self.source.pending_jobs().await?;
        for job in pending {
            let verdict = self.evaluate(job.as_ref());
            if verdict.approves() {
                self.approve(job.as_ref(), &verdict).await;
            } else {
                self.record_ignore(job.as_ref());
            }
        }
        Ok(())
    }

    /// Allowlist match is checked strictly before trusted-code match: the
    /// allowlist path is authoritative and cheaper.
    fn evaluate(&self, job: &dyn Job) -> Verdict {
        let email = normalize_email(&job.requester_email());
        if self.state.allowlist.contains(&email) {
            return Verdict::TrustedSender { email };
        }

        let content = extraction::extract_content(job);
        match self.trusted.matches(&content) {
            Ok(Some(pattern)) => Verdict::TrustedCode { pattern },
            Ok(None) => Verdict::Untrusted,
            Err(e) => {
                // next cycle retries the lookup; do not approve on a failed read
                warn!("trusted-code lookup failed for job '{}': {e}", job.name());
                Verdict::Untrusted
            }
        }
    }

    /// Invoke the Job Source approval and record the outcome. Failure is
    /// recorded as `failed_approval` and never retried here - the job stays
    /// pending and a later cycle re-evaluates it naturally.
    async fn approve(&mut self, job: &dyn Job, verdict: &Verdict) {
        let label = match verdict.label() {
            Some(label) => label,
            None => return,
        };
        let reason = format!("Auto-approved ({label}) at {}", Utc::now().to_rfc3339());
        let mut metadata = json!({
            "name": job.name(),
            "requester_email": job.requester_email(),
        });
        if let Verdict::TrustedCode { pattern } = verdict {
            metadata["signature"] = json!(pattern.signature);
        }

        let outcome = self.source.approve(job, &reason).await;
        let (action, success) = match outcome {
            Ok(true) => {
                info!(
                    "approved '{}' from {} ({label})",
                    job.name(),
                    job.requester_email()
                );
                (DecisionAction::Approve, true)
            }
            Ok(false) => {
                error!("failed to approve '{}' from {}", job.name(), job.requester_email());
                (DecisionAction::FailedApproval, false)
            }
            Err(e) => {
                error!("error approving '{}': {e:#}", job.name());
                (DecisionAction::FailedApproval, false)
            }
        };
        metadata["success"] = json!(success);

        if let Err(e) = self
            .history
            .record_decision(&job.id(), action, &label, metadata)
        {
            warn!("could not record {action:?} decision for job {}: {e}", job.id());
        }
    }

    /// Log exactly one ignore decision per job per epoch. The identifier is
    /// only cached once the record is durably written, so a persistence
    /// failure is retried next cycle instead of silently dropped.
    fn record_ignore(&mut self, job: &dyn Job) {
        let id = job.id();
        if self.state.ignored.contains(&id) {
            return;
        }

        let reason = format!(
            "sender {} not in allowlist and no trusted code match",
            job.requester_email()
        );
        let metadata = json!({
            "name": job.name(),
            "requester_email": job.requester_email(),
        });
        match self
            .history
            .record_decision(&id, DecisionAction::Ignore, &reason, metadata)
        {
            Ok(_) => {
                debug!("ignoring '{}' from {}", job.name(), job.requester_email());
                self.state.ignored.insert(id);
            }
            Err(e) => warn!("could not record ignore decision for job {id}: {e}"),
        }
    }
}
