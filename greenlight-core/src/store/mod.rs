//! Persistent trust and history state
//!
//! Every entity - allowlist entry, trusted-code pattern, history record,
//! decision-log entry - is one JSON file in a per-collection directory, keyed
//! by a stable string (email-derived key for allowlist entries, signature hex
//! for trusted-code and history records, uuid for decision entries). One file
//! per record means each entry carries its own permission bits and can be
//! added or removed without rewriting a shared file; an independent
//! administrative process may mutate these collections while the engine runs.

pub mod allowlist;
pub mod error;
pub mod history;
pub mod records;
pub mod trusted;

pub use allowlist::Allowlist;
pub use error::StoreError;
pub use history::{DecisionAction, DecisionRecord, HistoryStore, JobHistoryRecord};
pub use records::{Collection, RecordStore};
pub use trusted::{TrustedCodePattern, TrustedCodeStore};
