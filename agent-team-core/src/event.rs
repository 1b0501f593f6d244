//! Coordination event log
//!
//! A bounded, append-only record of lifecycle, assignment and escalation
//! events. It is an observability side channel: nothing reads it back to make
//! decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of events retained
pub const DEFAULT_EVENT_LOG_CAPACITY: usize = 1000;

/// Type of coordination event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CoordinationEventType {
    AgentStarted,
    AgentStopped,
    TaskAssigned,
    TaskCompleted,
    Escalation,
}

impl std::fmt::Display for CoordinationEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoordinationEventType::AgentStarted => write!(f, "agent_started"),
            CoordinationEventType::AgentStopped => write!(f, "agent_stopped"),
            CoordinationEventType::TaskAssigned => write!(f, "task_assigned"),
            CoordinationEventType::TaskCompleted => write!(f, "task_completed"),
            CoordinationEventType::Escalation => write!(f, "escalation"),
        }
    }
}

/// One entry of the event log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoordinationEvent {
    pub event_type: CoordinationEventType,
    pub agent_id: Option<String>,
    pub task_id: Option<String>,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl CoordinationEvent {
    pub fn new(event_type: CoordinationEventType) -> Self {
        Self {
            event_type,
            agent_id: None,
            task_id: None,
            details: serde_json::Value::Null,
            timestamp: Utc::now(),
        }
    }

    pub fn agent<S: Into<String>>(mut self, agent_id: S) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn task<S: Into<String>>(mut self, task_id: S) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Ring buffer of the most recent coordination events
#[derive(Debug, Clone)]
pub struct EventLog {
    events: VecDeque<CoordinationEvent>,
    capacity: usize,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an event, dropping the oldest one on overflow
    pub fn push(&mut self, event: CoordinationEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    /// The most recent `limit` events, oldest first
    pub fn recent(&self, limit: usize) -> Vec<CoordinationEvent> {
        let skip = self.events.len().saturating_sub(limit);
        self.events.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_LOG_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assigned(task: usize) -> CoordinationEvent {
        CoordinationEvent::new(CoordinationEventType::TaskAssigned).task(format!("t{}", task))
    }

    #[test]
    fn test_event_log_keeps_most_recent() {
        let mut log = EventLog::new(3);
        for i in 0..5 {
            log.push(assigned(i));
        }

        assert_eq!(log.len(), 3);
        let events = log.recent(3);
        let ids: Vec<_> = events.iter().filter_map(|e| e.task_id.clone()).collect();
        assert_eq!(ids, vec!["t2", "t3", "t4"]);
    }

    #[test]
    fn test_recent_limits_and_orders() {
        let mut log = EventLog::new(10);
        for i in 0..4 {
            log.push(assigned(i));
        }

        let ids: Vec<_> = log
            .recent(2)
            .into_iter()
            .filter_map(|e| e.task_id)
            .collect();
        assert_eq!(ids, vec!["t2", "t3"]);
        assert_eq!(log.recent(100).len(), 4);
        assert!(log.recent(0).is_empty());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut log = EventLog::new(0);
        log.push(assigned(1));
        log.push(assigned(2));
        assert_eq!(log.capacity(), 1);
        assert_eq!(log.recent(5)[0].task_id.as_deref(), Some("t2"));
    }

    #[test]
    fn test_event_type_display() {
        assert_eq!(
            CoordinationEventType::AgentStopped.to_string(),
            "agent_stopped"
        );
        let json = serde_json::to_value(CoordinationEventType::TaskCompleted).unwrap();
        assert_eq!(json, "task_completed");
    }
}
