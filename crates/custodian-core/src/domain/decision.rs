//! Decision model: what happens to a task entry after one execution.
//!
//! Deciders are pure: given the task's age and the outcome, they return the
//! next action. Applying it (deleting the entry, logging) is the
//! controller's job.

use chrono::TimeDelta;

use super::Outcome;

/// The disposition of a task after this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Side effect confirmed; delete the entry.
    Complete,

    /// Too old to keep trying; delete the entry and record it.
    Abandon { age: TimeDelta, reason: String },

    /// Leave the entry untouched; a later cycle sees it again.
    Retry { reason: String },
}

impl Decision {
    /// Whether applying this decision removes the entry from the store.
    pub fn removes_entry(&self) -> bool {
        !matches!(self, Decision::Retry { .. })
    }
}

pub trait Decider: Send + Sync {
    fn decide(&self, age: TimeDelta, outcome: &Outcome) -> Decision;
}

/// Age-bounded retry: keep failing tasks until they are older than
/// `reclaim_age`, then give up on them.
#[derive(Debug, Clone)]
pub struct ReclaimDecider {
    reclaim_age: TimeDelta,
}

impl ReclaimDecider {
    pub fn new(reclaim_age: TimeDelta) -> Self {
        Self { reclaim_age }
    }

    pub fn reclaim_age(&self) -> TimeDelta {
        self.reclaim_age
    }
}

impl Decider for ReclaimDecider {
    fn decide(&self, age: TimeDelta, outcome: &Outcome) -> Decision {
        let reason = outcome
            .reason
            .clone()
            .unwrap_or_else(|| "unknown failure".to_string());
        if outcome.is_success() {
            Decision::Complete
        } else if age > self.reclaim_age {
            Decision::Abandon { age, reason }
        } else {
            Decision::Retry { reason }
        }
    }
}
