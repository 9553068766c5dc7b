//! Events: immutable tagged values routed by the dispatcher.

use std::borrow::Cow;
use std::fmt;

use crate::error::CoreError;
use crate::node::NodeId;

/// Closed set of event kinds.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum EventKind {
    Success,
    Failure,
    Completion,
    Timer,
    Null,
    Escalation,
}

impl EventKind {
    pub const fn label(self) -> &'static str {
        match self {
            EventKind::Success => "success",
            EventKind::Failure => "failure",
            EventKind::Completion => "completion",
            EventKind::Timer => "timer",
            EventKind::Null => "null",
            EventKind::Escalation => "escalation",
        }
    }

    /// Success, Failure and Completion end a node's running phase.
    pub const fn is_verdict(self) -> bool {
        matches!(
            self,
            EventKind::Success | EventKind::Failure | EventKind::Completion
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Opaque conflict descriptor reported by the motion collaborator.
///
/// The engine never interprets it; it is forwarded verbatim on escalation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub code: Cow<'static, str>,
    pub detail: Option<String>,
}

impl Conflict {
    pub fn new(code: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code: code.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Optional data carried by an event.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum EventPayload {
    #[default]
    None,
    Conflict(Conflict),
    Error(CoreError),
    Text(String),
}

impl EventPayload {
    pub fn conflict(&self) -> Option<&Conflict> {
        match self {
            EventPayload::Conflict(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, EventPayload::None)
    }
}

/// Something that happened to exactly one node.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    pub source: NodeId,
    pub payload: EventPayload,
    /// Set when an unhandled verdict was re-posted as an escalation.
    pub origin: Option<EventKind>,
}

impl Event {
    pub fn new(kind: EventKind, source: NodeId) -> Self {
        Self {
            kind,
            source,
            payload: EventPayload::None,
            origin: None,
        }
    }

    pub fn with_payload(mut self, payload: EventPayload) -> Self {
        self.payload = payload;
        self
    }

    pub fn success(source: NodeId) -> Self {
        Self::new(EventKind::Success, source)
    }

    pub fn failure(source: NodeId) -> Self {
        Self::new(EventKind::Failure, source)
    }

    pub fn completion(source: NodeId) -> Self {
        Self::new(EventKind::Completion, source)
    }

    pub fn escalation(source: NodeId, conflict: Conflict) -> Self {
        Self::new(EventKind::Escalation, source).with_payload(EventPayload::Conflict(conflict))
    }

    /// Re-tag as an escalation, keeping source and payload untouched.
    pub fn into_escalation(self) -> Self {
        if self.kind == EventKind::Escalation {
            return self;
        }
        Self {
            origin: Some(self.origin.unwrap_or(self.kind)),
            kind: EventKind::Escalation,
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escalating_keeps_payload_and_records_origin() {
        let ev = Event::failure(NodeId::from_index(3))
            .with_payload(EventPayload::Text("lost cube".into()));
        let up = ev.clone().into_escalation();
        assert_eq!(up.kind, EventKind::Escalation);
        assert_eq!(up.origin, Some(EventKind::Failure));
        assert_eq!(up.payload, ev.payload);
        assert_eq!(up.source, ev.source);

        // escalating twice is a no-op
        assert_eq!(up.clone().into_escalation(), up);
    }

    #[test]
    fn verdict_kinds() {
        assert!(EventKind::Completion.is_verdict());
        assert!(!EventKind::Escalation.is_verdict());
        assert!(!EventKind::Timer.is_verdict());
    }
}
