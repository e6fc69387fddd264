//! Evaluation verdicts
//!
//! A [`Verdict`] is the outcome of evaluating one pending job against the
//! current trust state. The allowlist path is authoritative and cheaper, so
//! it is checked strictly before trusted-code matching - a job from a
//! trusted sender is never evaluated for a code-signature match.

use crate::signature::short;
use crate::store::trusted::TrustedCodePattern;

/// Outcome of evaluating a pending job against the trust state
#[derive(Debug, Clone)]
pub enum Verdict {
    /// Requester identity is in the allowlist
    TrustedSender { email: String },

    /// Job content exactly matches a trusted code pattern
    TrustedCode { pattern: TrustedCodePattern },

    /// Neither trust predicate matched
    Untrusted,
}

impl Verdict {
    /// Whether this verdict authorizes auto-approval
    pub fn approves(&self) -> bool {
        !matches!(self, Verdict::Untrusted)
    }

    /// Human-readable trust label for approval reasons and logs.
    /// None for untrusted jobs.
    pub fn label(&self) -> Option<String> {
        match self {
            Verdict::TrustedSender { email } => Some(format!("trusted sender ({email})")),
            Verdict::TrustedCode { pattern } => Some(format!(
                "trusted code pattern ({}...)",
                short(&pattern.signature)
            )),
            Verdict::Untrusted => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn pattern() -> TrustedCodePattern {
        TrustedCodePattern {
            signature: "abcdef0123456789".repeat(4),
            name: "job1".to_string(),
            description: String::new(),
            tags: vec![],
            requester_email: "b@x.com".to_string(),
            code_files: BTreeMap::new(),
            created_at: None,
            trusted_at: Utc::now(),
        }
    }

    #[test]
    fn test_verdict_predicates() {
        assert!(Verdict::TrustedSender {
            email: "a@x.com".to_string()
        }
        .approves());
        assert!(Verdict::TrustedCode { pattern: pattern() }.approves());
        assert!(!Verdict::Untrusted.approves());
    }

    #[test]
    fn test_labels() {
        let sender = Verdict::TrustedSender {
            email: "a@x.com".to_string(),
        };
        assert_eq!(sender.label().unwrap(), "trusted sender (a@x.com)");

        let code = Verdict::TrustedCode { pattern: pattern() };
        let label = code.label().unwrap();
        assert!(label.starts_with("trusted code pattern (abcdef012345"));

        assert!(Verdict::Untrusted.label().is_none());
    }
}
