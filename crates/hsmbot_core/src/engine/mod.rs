//! hsmbot_core::engine
//!
//! Single-threaded event dispatch over a node arena.
//!
//! Key ideas:
//! - Every event names exactly one source node; routing is keyed by (source, kind)
//! - Queued events are drained to completion before any external call returns
//! - Time is logical: timers only expire when the caller advances the clock
//! - Verdicts with no local handler climb the hierarchy as escalations

mod dispatcher;
mod graph;
mod timer;
mod trace;

pub use dispatcher::Dispatcher;
pub use graph::{NodeInfo, TransitionEdge, TransitionGraph};
pub use timer::{ArmedTimer, TimerSet};
pub use trace::{FiringRecord, Outcome, RootReport};

/// Index of a transition inside its dispatcher.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransitionId(usize);

impl TransitionId {
    pub const fn from_index(index: usize) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0
    }
}
