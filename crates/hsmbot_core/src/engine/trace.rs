use std::collections::VecDeque;
use std::time::Duration;

use crate::event::{EventKind, EventPayload};
use crate::transition::TransitionKind;

/// One transition firing, as seen after the fact.
#[derive(Debug, Clone, PartialEq)]
pub struct FiringRecord {
    /// Position in the dispatcher's firing history, assigned on record.
    pub seq: u64,
    /// Dotted path of the owning composite plus the transition name.
    pub transition: String,
    pub kind: TransitionKind,
    pub trigger: EventKind,
    pub sources: Vec<String>,
    pub destinations: Vec<String>,
    pub at: Duration,
}

/// An event that reached the root without a handler.
#[derive(Debug, Clone, PartialEq)]
pub struct RootReport {
    pub kind: EventKind,
    /// The verdict an escalation started out as, if it was re-posted.
    pub origin: Option<EventKind>,
    pub payload: EventPayload,
    /// Path of the node that produced the event.
    pub source: String,
    pub at: Duration,
}

/// Verdict of the root node.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    Failed,
    Completed,
}

impl Outcome {
    pub(crate) fn from_verdict(kind: EventKind) -> Option<Self> {
        match kind {
            EventKind::Success => Some(Outcome::Succeeded),
            EventKind::Failure => Some(Outcome::Failed),
            EventKind::Completion => Some(Outcome::Completed),
            _ => None,
        }
    }
}

/// Bounded ring of recent firings.
#[derive(Debug)]
pub(crate) struct FiringTrace {
    records: VecDeque<FiringRecord>,
    capacity: usize,
    total: u64,
}

impl FiringTrace {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            total: 0,
        }
    }

    pub(crate) fn push(&mut self, mut record: FiringRecord) {
        record.seq = self.total;
        self.total += 1;
        if self.capacity == 0 {
            return;
        }
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &FiringRecord> {
        self.records.iter()
    }

    pub(crate) fn total(&self) -> u64 {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(name: &str) -> FiringRecord {
        FiringRecord {
            seq: 0,
            transition: name.into(),
            kind: TransitionKind::Null,
            trigger: EventKind::Null,
            sources: vec![],
            destinations: vec![],
            at: Duration::ZERO,
        }
    }

    #[test]
    fn trace_keeps_the_newest_records() {
        let mut trace = FiringTrace::new(2);
        for name in ["a", "b", "c"] {
            trace.push(rec(name));
        }
        let kept: Vec<_> = trace.iter().map(|r| r.transition.as_str()).collect();
        assert_eq!(kept, ["b", "c"]);
        assert_eq!(trace.iter().last().map(|r| r.seq), Some(2));
        assert_eq!(trace.total(), 3);
    }
}
