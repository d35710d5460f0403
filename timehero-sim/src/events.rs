//! Structured simulation events and the bounded log that stores them.
//!
//! The log is append-only from the engine's point of view; once the
//! configured capacity is reached the oldest entries are evicted first.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

use crate::clock::GameClock;

/// Stable identifier for a single event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId {
    /// Simulated minute the event was emitted on.
    pub tick: u64,
    /// Sequence number within the tick (0-based).
    pub seq: u16,
}

impl EventId {
    #[must_use]
    pub const fn new(tick: u64, seq: u16) -> Self {
        Self { tick, seq }
    }
}

/// Subsystem that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Time,
    Farm,
    Energy,
    Adventure,
    Mining,
    Helper,
    Upgrade,
    Phase,
    Session,
    System,
}

impl EventCategory {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Time => "time",
            Self::Farm => "farm",
            Self::Energy => "energy",
            Self::Adventure => "adventure",
            Self::Mining => "mining",
            Self::Helper => "helper",
            Self::Upgrade => "upgrade",
            Self::Phase => "phase",
            Self::Session => "session",
            Self::System => "system",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity tier for a simulation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSeverity {
    Info,
    Warning,
    Major,
    Error,
}

/// One entry in the event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    /// Simulated clock reading when the event occurred.
    pub at: GameClock,
    pub category: EventCategory,
    pub severity: EventSeverity,
    pub message: String,
    /// Optional structured payload for downstream consumers.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,
}

impl Event {
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.id.tick
    }
}

/// Bounded FIFO of simulation events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLog {
    capacity: usize,
    entries: VecDeque<Event>,
    evicted: u64,
    last_tick: u64,
    next_seq: u16,
}

impl EventLog {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::new(),
            evicted: 0,
            last_tick: 0,
            next_seq: 0,
        }
    }

    /// Append an event without a payload.
    pub fn push(
        &mut self,
        tick: u64,
        at: GameClock,
        category: EventCategory,
        severity: EventSeverity,
        message: impl Into<String>,
    ) -> EventId {
        self.push_with_payload(tick, at, category, severity, message, serde_json::Value::Null)
    }

    /// Append an event carrying a structured payload.
    pub fn push_with_payload(
        &mut self,
        tick: u64,
        at: GameClock,
        category: EventCategory,
        severity: EventSeverity,
        message: impl Into<String>,
        payload: serde_json::Value,
    ) -> EventId {
        if tick != self.last_tick {
            self.last_tick = tick;
            self.next_seq = 0;
        }
        let id = EventId::new(tick, self.next_seq);
        self.next_seq = self.next_seq.saturating_add(1);
        self.entries.push_back(Event {
            id,
            at,
            category,
            severity,
            message: message.into(),
            payload,
        });
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
            self.evicted = self.evicted.saturating_add(1);
        }
        id
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of entries dropped to honor the capacity.
    #[must_use]
    pub const fn evicted(&self) -> u64 {
        self.evicted
    }

    #[must_use]
    pub fn last(&self) -> Option<&Event> {
        self.entries.back()
    }

    /// Count retained events at the given severity.
    #[must_use]
    pub fn count_severity(&self, severity: EventSeverity) -> usize {
        self.entries
            .iter()
            .filter(|event| event.severity == severity)
            .count()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::with_capacity(crate::constants::DEFAULT_MAX_LOG_ENTRIES)
    }
}
