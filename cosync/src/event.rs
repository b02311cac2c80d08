//! Synchronization events and event-info records
//!
//! An [`Event`] is the token an actor offers to the coordinator each round.
//! Actors own their events; constraints and pending proposals hold clones of
//! the same handle, so a status written by a constraint is what the owner sees
//! when it resumes.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Status of an event that is taking part in a round
///
/// An event that is not part of a round (never proposed, or already admitted)
/// has no status at all; see [`Event::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    /// Offered for synchronization in the current round
    Proposed,
    /// Offered earlier and not yet admitted
    Waiting,
    /// Vetoed during the current pass; never survives `post_resolve`
    Disabled,
}

impl EventStatus {
    /// Proposed and waiting events both count as offered
    pub fn is_offered(self) -> bool {
        matches!(self, Self::Proposed | Self::Waiting)
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Proposed => write!(f, "proposed"),
            Self::Waiting => write!(f, "waiting"),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

/// Value carried by an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventValue {
    /// Unresolved / don't-care
    #[default]
    Nondet,
    Concrete(i64),
}

impl EventValue {
    pub fn is_nondet(self) -> bool {
        matches!(self, Self::Nondet)
    }

    pub fn concrete(self) -> Option<i64> {
        match self {
            Self::Nondet => None,
            Self::Concrete(v) => Some(v),
        }
    }
}

impl From<i64> for EventValue {
    fn from(v: i64) -> Self {
        Self::Concrete(v)
    }
}

impl fmt::Display for EventValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nondet => write!(f, "nondet"),
            Self::Concrete(v) => write!(f, "{}", v),
        }
    }
}

/// Unique event identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(Uuid);

impl EventId {
    fn generate() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug)]
struct EventState {
    status: Option<EventStatus>,
    value: EventValue,
}

#[derive(Debug)]
struct EventInner {
    id: EventId,
    name: String,
    state: Mutex<EventState>,
}

/// Shared synchronization token
///
/// Cloning is cheap and every clone refers to the same event.
#[derive(Debug, Clone)]
pub struct Event {
    inner: Arc<EventInner>,
}

impl Event {
    /// Create an idle event with a `Nondet` value
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        debug!(%name, "Event::new: called");
        Self {
            inner: Arc::new(EventInner {
                id: EventId::generate(),
                name,
                state: Mutex::new(EventState {
                    status: None,
                    value: EventValue::Nondet,
                }),
            }),
        }
    }

    pub fn id(&self) -> EventId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Current round status, `None` while idle
    pub fn status(&self) -> Option<EventStatus> {
        self.state().status
    }

    /// True when the event is proposed or waiting
    pub fn is_offered(&self) -> bool {
        self.status().is_some_and(EventStatus::is_offered)
    }

    /// Set the round status
    ///
    /// Only constraints and the coordinator call this, and only while a round
    /// is being resolved. Actors change their offer through the coordinator.
    pub fn set_status(&self, status: Option<EventStatus>) {
        let mut state = self.state();
        if state.status != status {
            debug!(event = %self.inner.name, from = ?state.status, to = ?status, "Event::set_status");
        }
        state.status = status;
    }

    pub fn value(&self) -> EventValue {
        self.state().value
    }

    /// Write the value slot; owners do this before proposing
    pub fn set_value(&self, value: impl Into<EventValue>) {
        self.state().value = value.into();
    }

    /// Reset the value slot to `Nondet`
    pub fn clear_value(&self) {
        self.state().value = EventValue::Nondet;
    }

    /// True if both handles refer to the same event
    pub fn same_as(&self, other: &Event) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn state(&self) -> MutexGuard<'_, EventState> {
        // Event state stays consistent across a panic; every write is a single field store
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        match state.status {
            Some(status) => write!(f, "{}[{}, {}]", self.inner.name, status, state.value),
            None => write!(f, "{}[idle, {}]", self.inner.name, state.value),
        }
    }
}

/// Record carried by adaptor channels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventInfo {
    /// Logical time or sequence marker
    pub tag: u64,

    /// Payload discriminator
    pub kind: String,

    /// Opaque payload
    #[serde(default)]
    pub data: serde_json::Value,
}

impl EventInfo {
    pub fn new(tag: u64, kind: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            tag,
            kind: kind.into(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_event_is_idle_and_nondet() {
        let event = Event::new("fire");
        assert_eq!(event.name(), "fire");
        assert_eq!(event.status(), None);
        assert!(!event.is_offered());
        assert_eq!(event.value(), EventValue::Nondet);
    }

    #[test]
    fn test_clones_share_state() {
        let event = Event::new("fire");
        let alias = event.clone();

        alias.set_status(Some(EventStatus::Waiting));
        alias.set_value(7);

        assert_eq!(event.status(), Some(EventStatus::Waiting));
        assert_eq!(event.value(), EventValue::Concrete(7));
        assert!(event.same_as(&alias));
        assert_eq!(event.id(), alias.id());
    }

    #[test]
    fn test_distinct_events_have_distinct_ids() {
        let a = Event::new("a");
        let b = Event::new("a");
        assert_ne!(a.id(), b.id());
        assert!(!a.same_as(&b));
    }

    #[test]
    fn test_offered_statuses() {
        assert!(EventStatus::Proposed.is_offered());
        assert!(EventStatus::Waiting.is_offered());
        assert!(!EventStatus::Disabled.is_offered());
    }

    #[test]
    fn test_event_value_helpers() {
        assert!(EventValue::Nondet.is_nondet());
        assert_eq!(EventValue::Concrete(3).concrete(), Some(3));
        assert_eq!(EventValue::Nondet.concrete(), None);
        assert_eq!(EventValue::from(9), EventValue::Concrete(9));
    }

    #[test]
    fn test_event_display() {
        let event = Event::new("tick");
        assert_eq!(event.to_string(), "tick[idle, nondet]");
        event.set_status(Some(EventStatus::Proposed));
        event.set_value(4);
        assert_eq!(event.to_string(), "tick[proposed, 4]");
    }

    #[test]
    fn test_event_info_serde() {
        let info = EventInfo::new(12, "token", serde_json::json!({"n": 1}));
        let yaml = serde_yaml::to_string(&info).unwrap();
        let back: EventInfo = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, info);
    }
}
