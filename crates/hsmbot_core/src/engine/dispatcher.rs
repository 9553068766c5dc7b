use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::blueprint::{validate_name, Composite, NodeSpec};
use crate::config::EngineConfig;
use crate::error::{CoreError, Domain, ErrorKind, Payload, Result};
use crate::event::{Event, EventKind, EventPayload};
use crate::logging::log_core_error;
use crate::node::{
    advance, Activation, Behavior, NodeContext, NodeId, NodeSignal, NodeState, StartOutput,
    StopContext,
};
use crate::services::{Services, Target, TargetRef};
use crate::transition::TransitionKind;

use super::graph::{NodeInfo, TransitionEdge, TransitionGraph};
use super::timer::TimerSet;
use super::trace::{FiringRecord, FiringTrace, Outcome, RootReport};
use super::TransitionId;

struct NodeSlot {
    name: String,
    path: String,
    kind: &'static str,
    parent: Option<NodeId>,
    children: BTreeMap<String, NodeId>,
    initial: Option<NodeId>,
    state: NodeState,
    epoch: u64,
    target: Option<Target>,
    behavior: Box<dyn Behavior>,
    /// Transitions this node is a source of.
    outgoing: Vec<TransitionId>,
}

struct TransitionSlot {
    owner: NodeId,
    name: String,
    kind: TransitionKind,
    sources: Vec<NodeId>,
    destinations: Vec<NodeId>,
    /// Join bookkeeping: sources that already posted the trigger.
    arrived: BTreeSet<NodeId>,
}

/// Owns a node hierarchy and routes its events.
///
/// All mutation happens through `&mut self`; each public call drains the
/// event queue before returning, so callers always observe a settled tree.
pub struct Dispatcher {
    nodes: Vec<NodeSlot>,
    transitions: Vec<TransitionSlot>,
    routes: HashMap<(NodeId, EventKind), TransitionId>,
    queue: VecDeque<Event>,
    timers: TimerSet,
    services: Services,
    config: EngineConfig,
    now: Duration,
    trace: FiringTrace,
    reports: Vec<RootReport>,
    outcome: Option<Outcome>,
}

impl Dispatcher {
    pub fn new(root: NodeSpec, services: Services, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        validate_name(&root.name)?;

        let mut dispatcher = Self {
            nodes: Vec::new(),
            transitions: Vec::new(),
            routes: HashMap::new(),
            queue: VecDeque::new(),
            timers: TimerSet::default(),
            services,
            trace: FiringTrace::new(config.trace_capacity),
            config,
            now: Duration::ZERO,
            reports: Vec::new(),
            outcome: None,
        };
        dispatcher.insert(root, None)?;
        debug!(
            nodes = dispatcher.nodes.len(),
            transitions = dispatcher.transitions.len(),
            "dispatcher built"
        );
        Ok(dispatcher)
    }

    fn insert(&mut self, spec: NodeSpec, parent: Option<NodeId>) -> Result<NodeId> {
        let NodeSpec {
            name,
            behavior,
            body,
        } = spec;
        let id = NodeId::from_index(self.nodes.len());
        let path = match parent {
            Some(p) => format!("{}.{}", self.nodes[p.index()].path, name),
            None => name.clone(),
        };
        self.nodes.push(NodeSlot {
            name,
            path,
            kind: behavior.kind(),
            parent,
            children: BTreeMap::new(),
            initial: None,
            state: NodeState::Idle,
            epoch: 0,
            target: None,
            behavior,
            outgoing: Vec::new(),
        });

        if let Some(body) = body {
            self.insert_body(id, body)?;
        }
        Ok(id)
    }

    fn insert_body(&mut self, id: NodeId, body: Composite) -> Result<()> {
        let Composite {
            children,
            transitions,
            initial,
        } = body;

        for (i, child) in children.into_iter().enumerate() {
            let name = child.name.clone();
            let cid = self.insert(child, Some(id))?;
            let slot = &mut self.nodes[id.index()];
            slot.children.insert(name, cid);
            if i == initial {
                slot.initial = Some(cid);
            }
        }

        for t in transitions {
            let tid = TransitionId::from_index(self.transitions.len());
            let sources = self.resolve_children(id, &t.sources)?;
            let destinations = self.resolve_children(id, &t.destinations)?;
            for &s in &sources {
                self.routes.insert((s, t.kind.trigger()), tid);
                self.nodes[s.index()].outgoing.push(tid);
            }
            self.transitions.push(TransitionSlot {
                owner: id,
                name: t.name,
                kind: t.kind,
                sources,
                destinations,
                arrived: BTreeSet::new(),
            });
        }
        Ok(())
    }

    fn resolve_children(&self, parent: NodeId, names: &[String]) -> Result<Vec<NodeId>> {
        let slot = &self.nodes[parent.index()];
        names
            .iter()
            .map(|name| {
                slot.children.get(name).copied().ok_or_else(|| {
                    CoreError::graph(
                        ErrorKind::UnknownNode,
                        name.clone(),
                        format_args!("{} has no child '{name}'", slot.path),
                    )
                })
            })
            .collect()
    }

    // ---------------- Lookup ----------------

    pub fn root(&self) -> NodeId {
        NodeId::from_index(0)
    }

    /// Find a node by path relative to the root, e.g. `goto_cube.looker`.
    /// The empty path is the root itself.
    pub fn find(&self, path: &str) -> Option<NodeId> {
        let mut cursor = self.root();
        if path.is_empty() {
            return Some(cursor);
        }
        for segment in path.split('.') {
            cursor = *self.nodes[cursor.index()].children.get(segment)?;
        }
        Some(cursor)
    }

    pub fn lookup(&self, path: &str) -> Result<NodeId> {
        self.find(path).ok_or_else(|| {
            CoreError::warn()
                .domain(Domain::Engine)
                .kind(ErrorKind::UnknownNode)
                .msgf(format_args!("no node at path '{path}'"))
                .build()
        })
    }

    fn slot(&self, id: NodeId) -> Result<&NodeSlot> {
        self.nodes.get(id.index()).ok_or_else(|| {
            CoreError::warn()
                .domain(Domain::Engine)
                .kind(ErrorKind::UnknownNode)
                .msgf(format_args!("node {id} does not belong to this dispatcher"))
                .build()
        })
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.nodes.get(id.index()).map(|s| s.name.as_str())
    }

    pub fn path(&self, id: NodeId) -> Option<&str> {
        self.nodes.get(id.index()).map(|s| s.path.as_str())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.index()).and_then(|s| s.parent)
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .get(id.index())
            .into_iter()
            .flat_map(|s| s.children.values().copied())
    }

    pub fn state(&self, id: NodeId) -> Option<NodeState> {
        self.nodes.get(id.index()).map(|s| s.state)
    }

    /// State of the node at `path`; `Idle` for unknown paths.
    pub fn state_of(&self, path: &str) -> NodeState {
        self.find(path)
            .and_then(|id| self.state(id))
            .unwrap_or_default()
    }

    pub fn is_running(&self, id: NodeId) -> bool {
        self.state(id) == Some(NodeState::Running)
    }

    /// The current activation of an active node.
    pub fn activation(&self, id: NodeId) -> Option<Activation> {
        let slot = self.nodes.get(id.index())?;
        slot.state.is_active().then_some(Activation {
            node: id,
            epoch: slot.epoch,
        })
    }

    /// How many times the node has been started.
    pub fn starts(&self, id: NodeId) -> u64 {
        self.nodes.get(id.index()).map_or(0, |s| s.epoch)
    }

    pub fn target(&self, id: NodeId) -> Option<&Target> {
        self.nodes.get(id.index()).and_then(|s| s.target.as_ref())
    }

    /// Resolve `target` against the world model and hand it to `id`.
    pub fn bind_target(&mut self, id: NodeId, target: &TargetRef) -> Result<()> {
        self.slot(id)?;
        let resolved = target.resolve(self.services.world.as_ref())?;
        debug!(node = %self.nodes[id.index()].path, object = %resolved.id, "target bound");
        self.nodes[id.index()].target = Some(resolved);
        Ok(())
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn services_mut(&mut self) -> &mut Services {
        &mut self.services
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ---------------- Clock ----------------

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.timers.next_deadline()
    }

    pub fn armed_timers(&self, id: NodeId) -> usize {
        self.timers.armed_for(id)
    }

    pub fn advance(&mut self, dt: Duration) -> Result<()> {
        self.advance_to(self.now + dt)
    }

    /// Move the logical clock to `t`, firing every timer due on the way.
    pub fn advance_to(&mut self, t: Duration) -> Result<()> {
        self.drain()?;
        while let Some(timer) = self.timers.pop_due(t) {
            self.now = self.now.max(timer.deadline);
            let slot = &self.nodes[timer.node.index()];
            if slot.state != NodeState::Running || slot.epoch != timer.epoch {
                continue;
            }
            self.fire(timer.transition, Event::new(EventKind::Timer, timer.node))?;
            self.drain()?;
        }
        self.now = self.now.max(t);
        Ok(())
    }

    // ---------------- Introspection ----------------

    pub fn trace(&self) -> impl Iterator<Item = &FiringRecord> {
        self.trace.iter()
    }

    /// Total number of firings since construction.
    pub fn firings(&self) -> u64 {
        self.trace.total()
    }

    pub fn reports(&self) -> &[RootReport] {
        &self.reports
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    pub fn graph(&self) -> TransitionGraph {
        let nodes = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, slot)| {
                let id = NodeId::from_index(i);
                NodeInfo {
                    id,
                    path: slot.path.clone(),
                    kind: slot.kind,
                    parent: slot.parent,
                    initial: slot
                        .parent
                        .is_some_and(|p| self.nodes[p.index()].initial == Some(id)),
                }
            })
            .collect();
        let transitions = self
            .transitions
            .iter()
            .map(|t| TransitionEdge {
                owner: self.nodes[t.owner.index()].path.clone(),
                name: t.name.clone(),
                kind: t.kind,
                sources: self.names(&t.sources),
                destinations: self.names(&t.destinations),
            })
            .collect();
        TransitionGraph { nodes, transitions }
    }

    fn names(&self, ids: &[NodeId]) -> Vec<String> {
        ids.iter()
            .map(|id| self.nodes[id.index()].name.clone())
            .collect()
    }

    fn paths(&self, ids: &[NodeId]) -> Vec<String> {
        ids.iter()
            .map(|id| self.nodes[id.index()].path.clone())
            .collect()
    }

    // ---------------- External control ----------------

    /// Start the root node.
    pub fn start(&mut self) -> Result<()> {
        let root = self.root();
        self.outcome = None;
        self.start_node(root, &Event::new(EventKind::Null, root))?;
        self.drain()
    }

    /// Stop the whole tree and discard anything still queued.
    pub fn stop(&mut self) {
        self.queue.clear();
        let root = self.root();
        self.stop_node(root);
    }

    /// Post an event on behalf of a running node.
    pub fn post(&mut self, node: NodeId, kind: EventKind, payload: EventPayload) -> Result<()> {
        check_postable(kind)?;
        let slot = self.slot(node)?;
        if slot.state != NodeState::Running {
            return Err(CoreError::warn()
                .domain(Domain::Engine)
                .kind(ErrorKind::InvalidState)
                .msgf(format_args!(
                    "{} is {} and cannot post {kind}",
                    slot.path,
                    slot.state.label()
                ))
                .build());
        }
        self.queue
            .push_back(Event::new(kind, node).with_payload(payload));
        self.drain()
    }

    /// Answer a collaborator request made by `activation`.
    ///
    /// Replies for an activation that has since stopped or restarted are rejected.
    pub fn deliver(
        &mut self,
        activation: Activation,
        kind: EventKind,
        payload: EventPayload,
    ) -> Result<()> {
        check_postable(kind)?;
        let slot = self.slot(activation.node)?;
        if slot.epoch != activation.epoch || slot.state != NodeState::Running {
            return Err(CoreError::debug()
                .domain(Domain::Engine)
                .kind(ErrorKind::StaleActivation)
                .msgf(format_args!(
                    "{} reply for {} epoch {} (current epoch {}, {})",
                    kind,
                    slot.path,
                    activation.epoch,
                    slot.epoch,
                    slot.state.label()
                ))
                .build());
        }
        self.queue
            .push_back(Event::new(kind, activation.node).with_payload(payload));
        self.drain()
    }

    /// Fail a node from outside, then make sure it is stopped.
    pub fn abort(&mut self, node: NodeId, payload: EventPayload) -> Result<()> {
        let slot = self.slot(node)?;
        if !slot.state.is_active() {
            return Err(CoreError::warn()
                .domain(Domain::Engine)
                .kind(ErrorKind::InvalidState)
                .msgf(format_args!("{} is not active", slot.path))
                .build());
        }
        info!(node = %slot.path, "abort");
        if slot.state == NodeState::Running {
            self.queue
                .push_back(Event::failure(node).with_payload(payload));
            self.drain()?;
        }
        self.stop_node(node);
        Ok(())
    }

    // ---------------- Lifecycle ----------------

    fn start_node(&mut self, id: NodeId, event: &Event) -> Result<()> {
        let idx = id.index();
        let next = advance(self.nodes[idx].state, NodeSignal::Start)?;
        let parent = self.nodes[idx].parent;
        let parent_target = parent.and_then(|p| self.nodes[p.index()].target.clone());

        let slot = &mut self.nodes[idx];
        slot.state = next;
        slot.epoch += 1;
        let activation = Activation {
            node: id,
            epoch: slot.epoch,
        };
        let initial = slot.initial;
        debug!(node = %slot.path, epoch = activation.epoch, trigger = %event.kind, "start");

        let now = self.now;
        for &tid in &self.nodes[idx].outgoing {
            if let TransitionKind::Timer(d) = self.transitions[tid.index()].kind {
                self.timers.arm(id, activation.epoch, tid, now.saturating_add(d));
            }
        }

        let slot = &mut self.nodes[idx];
        let mut cx = NodeContext::new(
            activation,
            parent,
            &slot.name,
            event,
            now,
            &slot.target,
            parent_target,
            &mut self.services,
        );
        let result = slot.behavior.start(&mut cx);
        let StartOutput {
            mut posts,
            shares,
            release_parent_target,
        } = cx.into_output();

        if let Some(p) = parent.filter(|_| release_parent_target) {
            debug!(node = %self.nodes[p.index()].path, "target released");
            self.nodes[p.index()].target = None;
        }

        let mut failure = result.err();
        for (child, target) in shares {
            let found = self.nodes[idx].children.get(&child).copied();
            match found {
                Some(cid) => self.nodes[cid.index()].target = Some(target),
                None => {
                    failure.get_or_insert_with(|| {
                        CoreError::graph(
                            ErrorKind::UnknownNode,
                            child.clone(),
                            format_args!(
                                "{} shared its target with unknown child '{child}'",
                                self.nodes[idx].path
                            ),
                        )
                    });
                }
            }
        }

        let mut verdict = posts
            .iter()
            .any(|e| e.source == id && e.kind.is_verdict());
        if let Some(err) = failure {
            log_core_error(&err);
            posts.push(Event::failure(id).with_payload(EventPayload::Error(err)));
            verdict = true;
        }
        self.queue.extend(posts);

        if self.routes.contains_key(&(id, EventKind::Null)) {
            self.queue.push_back(Event::new(EventKind::Null, id));
        }
        match initial {
            Some(child) if !verdict => self.start_node(child, event),
            _ => Ok(()),
        }
    }

    fn stop_node(&mut self, id: NodeId) {
        let idx = id.index();
        if !self.nodes[idx].state.is_active() {
            return;
        }
        let children: Vec<NodeId> = self.nodes[idx].children.values().copied().collect();
        for child in children {
            self.stop_node(child);
        }

        let slot = &mut self.nodes[idx];
        let activation = Activation {
            node: id,
            epoch: slot.epoch,
        };
        slot.behavior
            .stop(&mut StopContext::new(activation, &mut self.services));
        slot.state = NodeState::Idle;
        debug!(node = %slot.path, epoch = activation.epoch, "stop");

        self.timers.cancel_node(id);
        for &tid in &self.nodes[idx].outgoing {
            self.transitions[tid.index()].arrived.remove(&id);
        }
    }

    // ---------------- Routing ----------------

    fn drain(&mut self) -> Result<()> {
        let mut handled = 0usize;
        while let Some(event) = self.queue.pop_front() {
            handled += 1;
            if handled > self.config.max_events_per_drain {
                let pending = self.queue.len() + 1;
                self.queue.clear();
                let err = CoreError::fatal()
                    .domain(Domain::Engine)
                    .kind(ErrorKind::Timeout)
                    .msgf(format_args!(
                        "drain exceeded {} events with {pending} still queued",
                        self.config.max_events_per_drain
                    ))
                    .payload(Payload::Code(self.config.max_events_per_drain as u32))
                    .build();
                log_core_error(&err);
                return Err(err);
            }
            self.route(event)?;
        }
        Ok(())
    }

    fn route(&mut self, event: Event) -> Result<()> {
        let source = event.source;
        let idx = source.index();
        let state = self.nodes[idx].state;

        if event.kind == EventKind::Escalation {
            if !state.is_active() {
                debug!(node = %self.nodes[idx].path, "dropping escalation from stopped node");
                return Ok(());
            }
            let parent = self.nodes[idx].parent;
            return self.escalate(parent, event);
        }

        if state != NodeState::Running {
            debug!(
                node = %self.nodes[idx].path,
                event = %event.kind,
                state = state.label(),
                "dropping event from node that is no longer running"
            );
            return Ok(());
        }

        if let Some(signal) = NodeSignal::for_event(event.kind) {
            self.nodes[idx].state = advance(state, signal)?;
            self.timers.cancel_node(source);
        }

        match self.routes.get(&(source, event.kind)).copied() {
            Some(tid) => self.arrive(tid, event),
            None if !event.kind.is_verdict() => Ok(()),
            None => match self.nodes[idx].parent {
                Some(parent) => {
                    debug!(
                        node = %self.nodes[idx].path,
                        event = %event.kind,
                        "no local handler, escalating"
                    );
                    self.escalate(Some(parent), event.into_escalation())
                }
                None => self.report_root(event),
            },
        }
    }

    /// Offer `event` to the escalation transitions sourced at `from`, then at
    /// each ancestor in turn.
    fn escalate(&mut self, from: Option<NodeId>, event: Event) -> Result<()> {
        let mut cursor = from;
        while let Some(node) = cursor {
            let slot = &self.nodes[node.index()];
            if slot.parent.is_none() {
                break;
            }
            if slot.state.is_active() {
                if let Some(tid) = self.routes.get(&(node, EventKind::Escalation)).copied() {
                    return self.fire(tid, event);
                }
            }
            cursor = slot.parent;
        }
        self.report_root(event)
    }

    fn report_root(&mut self, event: Event) -> Result<()> {
        let report = RootReport {
            kind: event.kind,
            origin: event.origin,
            payload: event.payload,
            source: self.nodes[event.source.index()].path.clone(),
            at: self.now,
        };

        if report.kind == EventKind::Escalation {
            if !self.config.root_accepts_escalations {
                let err = CoreError::fatal()
                    .domain(Domain::Engine)
                    .kind(ErrorKind::Unhandled)
                    .msgf(format_args!(
                        "escalation from {} reached the root unhandled",
                        report.source
                    ))
                    .payload(Payload::Node {
                        name: report.source.clone().into(),
                    })
                    .build();
                log_core_error(&err);
                self.reports.push(report);
                return Err(err);
            }
            warn!(
                source = %report.source,
                origin = ?report.origin,
                payload = ?report.payload,
                "escalation reached the root"
            );
            self.reports.push(report);
            return Ok(());
        }

        self.outcome = Outcome::from_verdict(report.kind);
        info!(root = %self.nodes[0].path, outcome = ?self.outcome, "root finished");
        self.reports.push(report);
        let root = self.root();
        self.stop_node(root);
        Ok(())
    }

    fn arrive(&mut self, tid: TransitionId, event: Event) -> Result<()> {
        let t = &mut self.transitions[tid.index()];
        t.arrived.insert(event.source);
        if t.sources.iter().all(|s| t.arrived.contains(s)) {
            return self.fire(tid, event);
        }
        debug!(
            transition = %t.name,
            arrived = t.arrived.len(),
            needed = t.sources.len(),
            "join waiting"
        );
        Ok(())
    }

    fn fire(&mut self, tid: TransitionId, event: Event) -> Result<()> {
        let (sources, destinations, kind, transition) = {
            let t = &mut self.transitions[tid.index()];
            t.arrived.clear();
            (
                t.sources.clone(),
                t.destinations.clone(),
                t.kind,
                format!("{}.{}", self.nodes[t.owner.index()].path, t.name),
            )
        };
        let record = FiringRecord {
            seq: 0,
            transition,
            kind,
            trigger: event.kind,
            sources: self.paths(&sources),
            destinations: self.paths(&destinations),
            at: self.now,
        };
        info!(
            transition = %record.transition,
            trigger = %event.kind,
            "{} {} {}",
            record.sources.join(","),
            record.kind,
            record.destinations.join(",")
        );
        self.trace.push(record);

        for &s in &sources {
            self.stop_node(s);
        }
        for &d in &destinations {
            match self.start_node(d, &event) {
                Ok(()) => {}
                Err(e) if e.domain == Domain::Node && e.kind == ErrorKind::InvalidTransition => {
                    debug!(node = %self.nodes[d.index()].path, "destination already active, not restarted");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

fn check_postable(kind: EventKind) -> Result<()> {
    if matches!(kind, EventKind::Timer | EventKind::Null) {
        return Err(CoreError::warn()
            .domain(Domain::Engine)
            .kind(ErrorKind::InvalidArgument)
            .msgf(format_args!("{kind} events are generated by the engine only"))
            .build());
    }
    Ok(())
}
