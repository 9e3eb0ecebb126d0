//! Append-only audit trail for ledger mutations.
//!
//! Engines record who did what to which entity after each successful
//! mutation. Recording is best effort: a failing sink is logged and
//! swallowed, never surfaced to the caller.

use std::{collections::VecDeque, sync::Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("audit sink failure: {0}")]
    Sink(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub actor: String,
    /// Dotted action name, e.g. `journal.approved` or `payment.recorded`.
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub details: Value,
    pub recorded_at: OffsetDateTime,
}

pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError>;
}

/// Emits each event as a structured `tracing` event. Infallible.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        tracing::info!(
            actor = %event.actor,
            action = %event.action,
            entity_type = %event.entity_type,
            entity_id = %event.entity_id,
            details = %event.details,
            "audit"
        );
        Ok(())
    }
}

const DEFAULT_RING_CAPACITY: usize = 1024;

/// Collects events in a bounded ring. Used in tests and by embedders that
/// drain the trail themselves; once the ring is full, each new event drops
/// the oldest one.
pub struct MemoryAuditSink {
    events: Mutex<VecDeque<AuditEvent>>,
    capacity: usize,
}

impl Default for MemoryAuditSink {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_RING_CAPACITY)
    }
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Oldest first.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().iter().cloned().collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        let mut events = self.events.lock().unwrap();
        if events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
        Ok(())
    }
}

pub(crate) fn emit(
    sink: &dyn AuditSink,
    actor: &str,
    action: &str,
    entity_type: &str,
    entity_id: String,
    details: Value,
) {
    let event = AuditEvent {
        actor: actor.to_string(),
        action: action.to_string(),
        entity_type: entity_type.to_string(),
        entity_id,
        details,
        recorded_at: OffsetDateTime::now_utc(),
    };
    if let Err(e) = sink.record(event) {
        tracing::warn!(action, error = %e, "Audit sink rejected event");
    }
}
