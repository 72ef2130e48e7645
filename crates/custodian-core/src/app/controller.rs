//! RetryController - Decision を適用してタスクストアを更新する
//!
//! - Complete / Abandon: エントリを削除し、イベントを出す
//! - Retry: 何もしない（次のサイクルで再び列挙される）
//!
//! 削除に失敗したエントリは Pending のまま残る。副作用は冪等なので、
//! 次のサイクルで再実行されても問題ない。

use std::sync::Arc;

use crate::domain::{
    Decider, Decision, DomainEvent, Outcome, Scope, Task, TaskEntry, TaskParseError, TaskState,
};
use crate::ports::{Clock, EventSink, TaskStore};

pub struct RetryController {
    store: Arc<dyn TaskStore>,
    decider: Arc<dyn Decider>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
}

impl RetryController {
    pub fn new(
        store: Arc<dyn TaskStore>,
        decider: Arc<dyn Decider>,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            decider,
            events,
            clock,
        }
    }

    /// Apply the decision for `task` after one execution.
    pub async fn settle(&self, task: &Task, outcome: &Outcome) -> TaskState {
        let age = task.age(self.clock.now());
        let decision = self.decider.decide(age, outcome);

        if !decision.removes_entry() {
            if let Decision::Retry { reason } = &decision {
                self.events.emit(DomainEvent::TaskDeferred {
                    scope: task.scope.clone(),
                    task: task.id.clone(),
                    reason: reason.clone(),
                });
            }
            return TaskState::Pending;
        }

        if let Err(e) = self.store.delete_task(&task.scope, &task.id).await {
            tracing::warn!(
                scope = %task.scope,
                task = %task.id,
                error = %e,
                "could not remove task entry; it stays pending"
            );
            return TaskState::Pending;
        }

        let state = TaskState::after(&decision);
        let event = match decision {
            Decision::Abandon { age, reason } => DomainEvent::TaskAbandoned {
                scope: task.scope.clone(),
                task: task.id.clone(),
                target: Some(task.target.clone()),
                created_at: task.created_at,
                age,
                reason,
            },
            _ => DomainEvent::TaskSucceeded {
                scope: task.scope.clone(),
                task: task.id.clone(),
                target: task.target.clone(),
                kind: task.kind,
            },
        };
        self.events.emit(event);
        state
    }

    /// An entry that cannot be decoded is never executed. It is removed once
    /// older than reclaim_age so it does not sit in the namespace forever.
    pub async fn settle_malformed(
        &self,
        scope: &Scope,
        entry: &TaskEntry,
        error: &TaskParseError,
    ) -> TaskState {
        let age = self.clock.now() - entry.created_at;
        tracing::error!(%scope, task = %entry.id, %error, "undecodable task entry");

        let outcome = Outcome::transient(error.to_string(), 0);
        let decision = self.decider.decide(age, &outcome);
        if !decision.removes_entry() {
            return TaskState::Pending;
        }
        let reason = match decision {
            Decision::Abandon { reason, .. } => reason,
            _ => error.to_string(),
        };

        if let Err(e) = self.store.delete_task(scope, &entry.id).await {
            tracing::warn!(%scope, task = %entry.id, error = %e, "could not remove task entry; it stays pending");
            return TaskState::Pending;
        }
        self.events.emit(DomainEvent::TaskAbandoned {
            scope: scope.clone(),
            task: entry.id.clone(),
            target: None,
            created_at: entry.created_at,
            age,
            reason,
        });
        TaskState::Abandoned
    }
}
