//! EventSink の実装
//!
//! - TracingEventSink: 本番用。abandonment / deferral は warn で必ず残す
//! - MemoryEventSink: テスト用

use std::sync::{Arc, Mutex};

use crate::domain::DomainEvent;
use crate::ports::EventSink;

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: DomainEvent) {
        match &event {
            DomainEvent::TaskSucceeded {
                scope,
                task,
                target,
                kind,
            } => {
                tracing::debug!(%scope, %task, %target, %kind, "task completed");
            }
            DomainEvent::TaskDeferred {
                scope,
                task,
                reason,
            } => {
                tracing::warn!(%scope, %task, %reason, "task failed; will retry next cycle");
            }
            DomainEvent::TaskAbandoned {
                scope,
                task,
                target,
                created_at,
                age,
                reason,
            } => {
                let target = target
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "-".to_string());
                tracing::warn!(
                    %scope,
                    %task,
                    %target,
                    %created_at,
                    age_secs = age.num_seconds(),
                    %reason,
                    "task abandoned after exceeding reclaim_age"
                );
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryEventSink {
    events: Arc<Mutex<Vec<DomainEvent>>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn abandoned(&self) -> Vec<DomainEvent> {
        self.events()
            .into_iter()
            .filter(|e| matches!(e, DomainEvent::TaskAbandoned { .. }))
            .collect()
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, event: DomainEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}
