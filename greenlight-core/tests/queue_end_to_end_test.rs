//! End-to-end: decision engine over the spool-directory job source

use greenlight_core::engine::{DecisionEngine, EngineConfig};
use greenlight_core::source::fs_queue::{FsQueueSource, JobManifest};
use greenlight_core::store::{Allowlist, DecisionAction, HistoryStore, RecordStore, TrustedCodeStore};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn seed_job(queue: &Path, state: &str, id: &str, requester: &str, code: &[(&str, &str)]) {
    let dir = queue.join(state).join(id);
    fs::create_dir_all(dir.join("code")).unwrap();
    fs::write(
        dir.join("job.json"),
        serde_json::to_string_pretty(&JobManifest {
            name: format!("job {id}"),
            description: "integration fixture".to_string(),
            tags: vec!["test".to_string()],
            requester_email: requester.to_string(),
            created_at: None,
        })
        .unwrap(),
    )
    .unwrap();
    for (path, text) in code {
        fs::write(dir.join("code").join(path), text).unwrap();
    }
}

struct Fixture {
    _data: TempDir,
    _queue: TempDir,
    store: RecordStore,
    engine: DecisionEngine,
}

fn setup(allowlist: &[&str]) -> (Fixture, std::path::PathBuf) {
    let data = TempDir::new().unwrap();
    let queue = TempDir::new().unwrap();
    let queue_root = queue.path().to_path_buf();

    let store = RecordStore::new(data.path());
    let entries = Allowlist::new(&store, "admin@example.org");
    for email in allowlist {
        entries.add(email).unwrap();
    }

    let source = Arc::new(FsQueueSource::new(&queue_root, "operator@example.org"));
    let engine = DecisionEngine::new(
        &store,
        source,
        EngineConfig::new("operator@example.org", "admin@example.org"),
    );
    (
        Fixture {
            _data: data,
            _queue: queue,
            store,
            engine,
        },
        queue_root,
    )
}

#[tokio::test]
async fn test_trusted_sender_job_moves_to_approved() {
    let (mut fx, queue) = setup(&["a@x.com"]);
    seed_job(&queue, "pending", "j1", "a@x.com", &[("run.py", "print(1)")]);

    fx.engine.refresh_allowlist().unwrap();
    fx.engine.evaluate_pending().await.unwrap();

    assert!(!queue.join("pending/j1").exists());
    assert!(queue.join("approved/j1/approval.json").exists());

    let decisions = HistoryStore::new(&fx.store).decisions(None).unwrap();
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].action, DecisionAction::Approve);
}

#[tokio::test]
async fn test_untrusted_job_stays_pending() {
    let (mut fx, queue) = setup(&["a@x.com"]);
    seed_job(&queue, "pending", "j2", "b@x.com", &[("run.py", "print(1)")]);

    fx.engine.refresh_allowlist().unwrap();
    fx.engine.evaluate_pending().await.unwrap();
    fx.engine.evaluate_pending().await.unwrap();

    assert!(queue.join("pending/j2").exists());
    let ignores: Vec<_> = HistoryStore::new(&fx.store)
        .decisions(None)
        .unwrap()
        .into_iter()
        .filter(|d| d.action == DecisionAction::Ignore)
        .collect();
    assert_eq!(ignores.len(), 1);
}

#[tokio::test]
async fn test_completed_job_captured_then_trusted_then_matched() {
    let (mut fx, queue) = setup(&["a@x.com"]);

    // a finished job lands in completed/, is captured, and gets promoted
    seed_job(&queue, "completed", "old", "b@x.com", &[("etl.py", "load()")]);
    fx.engine.refresh_allowlist().unwrap();
    fx.engine.capture_completed().await.unwrap();

    let history = HistoryStore::new(&fx.store);
    let records = history.list(None).unwrap();
    assert_eq!(records.len(), 1);
    TrustedCodeStore::new(&fx.store)
        .mark(&history, &records[0].signature)
        .unwrap();

    // the same content resubmitted by a stranger is auto-approved
    seed_job(&queue, "pending", "resub", "c@elsewhere.net", &[("etl.py", "load()")]);
    let mut manifest: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(queue.join("pending/resub/job.json")).unwrap(),
    )
    .unwrap();
    manifest["name"] = serde_json::json!("job old");
    fs::write(
        queue.join("pending/resub/job.json"),
        serde_json::to_string_pretty(&manifest).unwrap(),
    )
    .unwrap();

    fx.engine.evaluate_pending().await.unwrap();

    assert!(queue.join("approved/resub").exists());
    let approvals: Vec<_> = HistoryStore::new(&fx.store)
        .decisions(None)
        .unwrap()
        .into_iter()
        .filter(|d| d.action == DecisionAction::Approve)
        .collect();
    assert_eq!(approvals.len(), 1);
    assert!(approvals[0].reason.contains("trusted code pattern"));
}
