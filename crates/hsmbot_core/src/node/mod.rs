//! State nodes: identity, lifecycle, and the behaviour seam.
//!
//! The dispatcher owns every node in an arena; a node's behaviour only ever
//! sees the node through a `NodeContext` for the duration of `start`, or a
//! `StopContext` for `stop`. Posts made through the context are queued and
//! drained by the dispatcher after the call returns.

mod state;

pub use state::{advance, available_signals, NodeSignal, NodeState, ALL_NODE_STATES};

use std::fmt;
use std::time::Duration;

use crate::error::{CoreError, Domain, ErrorKind, Result};
use crate::event::{Conflict, Event, EventKind, EventPayload};
use crate::services::{Motion, MotionCommand, Services, Target, Vision, WorldModel};

/// Index of a node inside its dispatcher.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub const fn from_index(index: usize) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One run of one node: `epoch` increments every time the node starts.
///
/// Collaborators answer against an activation so that a reply meant for an
/// earlier run can never complete a later one.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Activation {
    pub node: NodeId,
    pub epoch: u64,
}

/// Node-specific behaviour plugged into the engine.
pub trait Behavior: Send {
    /// Short type label for logs and graph dumps.
    fn kind(&self) -> &'static str {
        "StateNode"
    }

    /// Called when the node enters `Running`.
    ///
    /// Returning `Err` is a precondition violation: the dispatcher posts Failure
    /// on the node's behalf, carrying the error as payload.
    fn start(&mut self, cx: &mut NodeContext<'_>) -> Result<()> {
        let _ = cx;
        Ok(())
    }

    /// Called when the node is forced back to `Idle`, after its children stopped.
    fn stop(&mut self, cx: &mut StopContext<'_>) {
        let _ = cx;
    }
}

/// A node without behaviour of its own: used for waits and plain composites.
#[derive(Debug, Default, Clone, Copy)]
pub struct StateNode;

impl Behavior for StateNode {}

/// What a behaviour can see and do while starting.
pub struct NodeContext<'a> {
    activation: Activation,
    parent: Option<NodeId>,
    name: &'a str,
    event: &'a Event,
    now: Duration,
    target: &'a Option<Target>,
    parent_target: Option<Target>,
    services: &'a mut Services,
    posts: Vec<Event>,
    shares: Vec<(String, Target)>,
    release_parent_target: bool,
}

/// Side effects collected from one `start` call.
pub(crate) struct StartOutput {
    pub(crate) posts: Vec<Event>,
    pub(crate) shares: Vec<(String, Target)>,
    pub(crate) release_parent_target: bool,
}

impl<'a> NodeContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        activation: Activation,
        parent: Option<NodeId>,
        name: &'a str,
        event: &'a Event,
        now: Duration,
        target: &'a Option<Target>,
        parent_target: Option<Target>,
        services: &'a mut Services,
    ) -> Self {
        Self {
            activation,
            parent,
            name,
            event,
            now,
            target,
            parent_target,
            services,
            posts: Vec::new(),
            shares: Vec::new(),
            release_parent_target: false,
        }
    }

    pub(crate) fn into_output(self) -> StartOutput {
        StartOutput {
            posts: self.posts,
            shares: self.shares,
            release_parent_target: self.release_parent_target,
        }
    }

    pub fn node(&self) -> NodeId {
        self.activation.node
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn name(&self) -> &str {
        self.name
    }

    /// The event that fired the transition starting this node.
    pub fn event(&self) -> &Event {
        self.event
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    // ---------------- Target ----------------

    /// This node's own target, falling back to the parent's.
    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref().or(self.parent_target.as_ref())
    }

    pub fn require_target(&self) -> Result<&Target> {
        self.target().ok_or_else(|| {
            CoreError::precondition(format!("{} started without a target object", self.name))
        })
    }

    /// Drop the parent's target once this start returns. Siblings started
    /// afterwards no longer inherit it.
    pub fn clear_parent_target(&mut self) {
        self.release_parent_target = true;
    }

    /// Hand `target` to the named child before children start.
    pub fn share_target(&mut self, child: &str, target: Target) {
        self.shares.push((child.to_string(), target));
    }

    // ---------------- Collaborators ----------------

    pub fn motion(&mut self) -> &mut dyn Motion {
        self.services.motion.as_mut()
    }

    pub fn vision(&self) -> &dyn Vision {
        self.services.vision.as_ref()
    }

    pub fn world(&self) -> &dyn WorldModel {
        self.services.world.as_ref()
    }

    pub fn world_mut(&mut self) -> &mut dyn WorldModel {
        self.services.world.as_mut()
    }

    /// Issue a motion request answered later against this activation.
    pub fn submit(&mut self, command: MotionCommand) -> Result<()> {
        let activation = self.activation;
        self.services.motion.submit(activation, command)
    }

    // ---------------- Posting ----------------

    pub fn post(&mut self, kind: EventKind, payload: EventPayload) {
        self.posts
            .push(Event::new(kind, self.activation.node).with_payload(payload));
    }

    pub fn post_success(&mut self) {
        self.post(EventKind::Success, EventPayload::None);
    }

    pub fn post_failure(&mut self) {
        self.post(EventKind::Failure, EventPayload::None);
    }

    pub fn post_failure_with(&mut self, payload: EventPayload) {
        self.post(EventKind::Failure, payload);
    }

    pub fn post_completion(&mut self) {
        self.post(EventKind::Completion, EventPayload::None);
    }

    pub fn post_escalation(&mut self, conflict: Conflict) {
        self.post(EventKind::Escalation, EventPayload::Conflict(conflict));
    }

    /// Post a verdict on behalf of the parent composite.
    pub fn post_for_parent(&mut self, kind: EventKind, payload: EventPayload) -> Result<()> {
        let parent = self.parent.ok_or_else(|| {
            CoreError::error()
                .domain(Domain::Node)
                .kind(ErrorKind::InvalidState)
                .msgf(format_args!("{} has no parent to post for", self.name))
                .build()
        })?;
        self.posts.push(Event::new(kind, parent).with_payload(payload));
        Ok(())
    }
}

/// What a behaviour can see and do while stopping.
pub struct StopContext<'a> {
    activation: Activation,
    services: &'a mut Services,
}

impl<'a> StopContext<'a> {
    pub(crate) fn new(activation: Activation, services: &'a mut Services) -> Self {
        Self {
            activation,
            services,
        }
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    pub fn motion(&mut self) -> &mut dyn Motion {
        self.services.motion.as_mut()
    }

    pub fn world_mut(&mut self) -> &mut dyn WorldModel {
        self.services.world.as_mut()
    }
}
