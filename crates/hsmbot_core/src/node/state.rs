use crate::error::{CoreError, Result};
use crate::event::EventKind;

/// Lifecycle of a state node.
///
/// Active states:
/// - Running: started, no verdict yet
/// - Succeeded, Failed, Completed: verdict posted, waiting for a transition to stop it
///
/// `Idle` is the only inactive state.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum NodeState {
    #[default]
    Idle,
    Running,
    Succeeded,
    Failed,
    Completed,
}

/// Inputs that move a node through its lifecycle.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum NodeSignal {
    Start,
    Succeed,
    Fail,
    Complete,
    Stop,
}

/// Compact ids used in error payloads.
impl NodeState {
    pub const fn id(self) -> u8 {
        match self {
            NodeState::Idle => 0,
            NodeState::Running => 1,
            NodeState::Succeeded => 2,
            NodeState::Failed => 3,
            NodeState::Completed => 4,
        }
    }

    /// True for every state except `Idle`.
    pub const fn is_active(self) -> bool {
        !matches!(self, NodeState::Idle)
    }

    /// True once the node has posted a verdict and awaits its transition.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            NodeState::Succeeded | NodeState::Failed | NodeState::Completed
        )
    }

    pub const fn label(self) -> &'static str {
        match self {
            NodeState::Idle => "Idle",
            NodeState::Running => "Running",
            NodeState::Succeeded => "Succeeded",
            NodeState::Failed => "Failed",
            NodeState::Completed => "Completed",
        }
    }
}

impl NodeSignal {
    pub const fn id(self) -> u8 {
        match self {
            NodeSignal::Start => 1,
            NodeSignal::Succeed => 2,
            NodeSignal::Fail => 3,
            NodeSignal::Complete => 4,
            NodeSignal::Stop => 5,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            NodeSignal::Start => "start",
            NodeSignal::Succeed => "succeed",
            NodeSignal::Fail => "fail",
            NodeSignal::Complete => "complete",
            NodeSignal::Stop => "stop",
        }
    }

    /// The verdict signal an event kind carries, if any.
    pub const fn for_event(kind: EventKind) -> Option<NodeSignal> {
        match kind {
            EventKind::Success => Some(NodeSignal::Succeed),
            EventKind::Failure => Some(NodeSignal::Fail),
            EventKind::Completion => Some(NodeSignal::Complete),
            EventKind::Timer | EventKind::Null | EventKind::Escalation => None,
        }
    }
}

/// Canonical list of all node states.
pub const ALL_NODE_STATES: [NodeState; 5] = [
    NodeState::Idle,
    NodeState::Running,
    NodeState::Succeeded,
    NodeState::Failed,
    NodeState::Completed,
];

/// Apply `via` to `current`.
///
/// This enforces:
/// - a node cannot be started twice without an intervening stop
/// - only a running node may post a verdict, and only one
/// - stop is accepted from every state, including `Idle`
pub fn advance(current: NodeState, via: NodeSignal) -> Result<NodeState> {
    use NodeSignal::*;
    use NodeState::*;

    let next = match (current, via) {
        (Idle, Start) => Running,
        (Running, Succeed) => Succeeded,
        (Running, Fail) => Failed,
        (Running, Complete) => Completed,
        (_, Stop) => Idle,

        _ => {
            return Err(CoreError::invalid_node_transition(current.id(), via.id()));
        }
    };

    Ok(next)
}

/// Signals accepted in `state`.
pub fn available_signals(state: NodeState) -> &'static [NodeSignal] {
    use NodeSignal::*;
    use NodeState::*;

    match state {
        Idle => &[Start, Stop],
        Running => &[Succeed, Fail, Complete, Stop],
        Succeeded | Failed | Completed => &[Stop],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Domain, ErrorKind, Payload};

    #[test]
    fn double_start_is_rejected_with_payload() {
        let e = advance(NodeState::Running, NodeSignal::Start).unwrap_err();
        assert_eq!(e.kind, ErrorKind::InvalidTransition);
        assert_eq!(e.domain, Domain::Node);
        assert_eq!(
            e.payload,
            Payload::NodeTransition {
                from_state: NodeState::Running.id(),
                via: NodeSignal::Start.id(),
            }
        );
    }

    #[test]
    fn stop_is_accepted_everywhere() {
        for state in ALL_NODE_STATES {
            assert_eq!(advance(state, NodeSignal::Stop).unwrap(), NodeState::Idle);
        }
    }

    #[test]
    fn verdicts_only_from_running() {
        assert_eq!(
            advance(NodeState::Running, NodeSignal::Complete).unwrap(),
            NodeState::Completed
        );
        for state in [
            NodeState::Idle,
            NodeState::Succeeded,
            NodeState::Failed,
            NodeState::Completed,
        ] {
            assert!(advance(state, NodeSignal::Succeed).is_err());
        }
    }

    #[test]
    fn available_signals_match_advance() {
        let all = [
            NodeSignal::Start,
            NodeSignal::Succeed,
            NodeSignal::Fail,
            NodeSignal::Complete,
            NodeSignal::Stop,
        ];
        for state in ALL_NODE_STATES {
            for signal in all {
                assert_eq!(
                    available_signals(state).contains(&signal),
                    advance(state, signal).is_ok(),
                    "{state:?} / {signal:?}"
                );
            }
        }
    }
}
