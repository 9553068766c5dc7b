use std::time::Duration;

use crate::node::NodeId;

use super::TransitionId;

/// A timer transition armed by a node's start.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ArmedTimer {
    pub deadline: Duration,
    pub node: NodeId,
    pub epoch: u64,
    pub transition: TransitionId,
    seq: u64,
}

/// Pending timers on the logical clock, expired in (deadline, arm order).
#[derive(Debug, Default)]
pub struct TimerSet {
    armed: Vec<ArmedTimer>,
    next_seq: u64,
}

impl TimerSet {
    pub fn arm(&mut self, node: NodeId, epoch: u64, transition: TransitionId, deadline: Duration) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.armed.push(ArmedTimer {
            deadline,
            node,
            epoch,
            transition,
            seq,
        });
    }

    /// Disarm everything `node` armed. Returns how many were removed.
    pub fn cancel_node(&mut self, node: NodeId) -> usize {
        let before = self.armed.len();
        self.armed.retain(|t| t.node != node);
        before - self.armed.len()
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.armed.iter().map(|t| t.deadline).min()
    }

    /// Remove and return the earliest timer due at or before `now`.
    pub fn pop_due(&mut self, now: Duration) -> Option<ArmedTimer> {
        let (i, _) = self
            .armed
            .iter()
            .enumerate()
            .filter(|(_, t)| t.deadline <= now)
            .min_by_key(|(_, t)| (t.deadline, t.seq))?;
        Some(self.armed.swap_remove(i))
    }

    pub fn armed_for(&self, node: NodeId) -> usize {
        self.armed.iter().filter(|t| t.node == node).count()
    }

    pub fn len(&self) -> usize {
        self.armed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }
}
