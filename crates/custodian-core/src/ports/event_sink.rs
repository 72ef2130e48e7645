//! EventSink port - タスク処遇の記録

use crate::domain::DomainEvent;

/// Receives one event per applied decision. Must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: DomainEvent);
}
