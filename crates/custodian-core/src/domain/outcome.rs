//! Outcome model: result of executing one task.
//!
//! Expected failure modes are values, not errors. The executor never
//! propagates a per-task failure; it hands an `Outcome` to the controller.

use serde::{Deserialize, Serialize};

/// Classification of an execution result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    /// The side effect is confirmed (or was already in place).
    Success,

    /// Not done this time; safe to retry on a later cycle.
    TransientFailure,
}

/// Why a success counts as a success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuccessDetail {
    /// The executor performed the side effect.
    Applied,

    /// The target was already absent.
    AlreadyAbsent,

    /// The target changed since the task was written; nothing to do.
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub kind: OutcomeKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<SuccessDetail>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Number of store requests made (including retries within `request_tries`).
    pub attempts: u32,
}

impl Outcome {
    pub fn success(detail: SuccessDetail, attempts: u32) -> Self {
        Self {
            kind: OutcomeKind::Success,
            detail: Some(detail),
            reason: None,
            attempts,
        }
    }

    pub fn transient(reason: impl Into<String>, attempts: u32) -> Self {
        Self {
            kind: OutcomeKind::TransientFailure,
            detail: None,
            reason: Some(reason.into()),
            attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        self.kind == OutcomeKind::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_kind_serializes_as_screaming_case() {
        let s = serde_json::to_string(&OutcomeKind::TransientFailure).unwrap();
        assert_eq!(s, "\"TRANSIENT_FAILURE\"");
    }

    #[test]
    fn transient_outcome_omits_detail() {
        let v = serde_json::to_value(Outcome::transient("503 from node", 3)).unwrap();
        assert_eq!(v["kind"], "TRANSIENT_FAILURE");
        assert_eq!(v["reason"], "503 from node");
        assert_eq!(v["attempts"], 3);
        assert!(v.get("detail").is_none());
    }
}
