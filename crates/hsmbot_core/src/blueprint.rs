//! Declarative construction of node hierarchies.
//!
//! A `Composite` is the body of a composite node: its children, the
//! transitions wiring them, and which child starts first. Bodies are validated
//! once in `CompositeBuilder::build`; the dispatcher only ever sees valid ones.
//!
//! ```text
//! Composite::builder()
//!     .node("look", LookAround)
//!     .node("grab", Grab)
//!     .on_completion(&["look"], &["grab"])
//!     .build()?
//! ```

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;

use crate::error::{CoreError, ErrorKind, Result};
use crate::event::EventKind;
use crate::node::{Behavior, StateNode};
use crate::transition::TransitionKind;

/// A named node with its behaviour and, for composites, a body.
pub struct NodeSpec {
    pub(crate) name: String,
    pub(crate) behavior: Box<dyn Behavior>,
    pub(crate) body: Option<Composite>,
}

impl NodeSpec {
    pub fn leaf(name: impl Into<String>, behavior: impl Behavior + 'static) -> Self {
        Self {
            name: name.into(),
            behavior: Box::new(behavior),
            body: None,
        }
    }

    pub fn composite(
        name: impl Into<String>,
        behavior: impl Behavior + 'static,
        body: Composite,
    ) -> Self {
        Self {
            name: name.into(),
            behavior: Box::new(behavior),
            body: Some(body),
        }
    }

    /// A composite with no behaviour of its own.
    pub fn group(name: impl Into<String>, body: Composite) -> Self {
        Self::composite(name, StateNode, body)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_composite(&self) -> bool {
        self.body.is_some()
    }
}

impl fmt::Debug for NodeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeSpec")
            .field("name", &self.name)
            .field("kind", &self.behavior.kind())
            .field("body", &self.body)
            .finish()
    }
}

/// A transition between siblings, by name.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionSpec {
    pub name: String,
    pub kind: TransitionKind,
    pub sources: Vec<String>,
    pub destinations: Vec<String>,
}

/// Validated body of a composite node.
#[derive(Debug)]
pub struct Composite {
    pub(crate) children: Vec<NodeSpec>,
    pub(crate) transitions: Vec<TransitionSpec>,
    pub(crate) initial: usize,
}

impl Composite {
    pub fn builder() -> CompositeBuilder {
        CompositeBuilder::default()
    }

    pub fn children(&self) -> impl Iterator<Item = &NodeSpec> {
        self.children.iter()
    }

    pub fn transitions(&self) -> &[TransitionSpec] {
        &self.transitions
    }

    pub fn initial(&self) -> &str {
        &self.children[self.initial].name
    }
}

#[derive(Default)]
pub struct CompositeBuilder {
    children: Vec<NodeSpec>,
    transitions: Vec<TransitionSpec>,
    initial: Option<String>,
    // first wiring error found while adding transitions, reported by `build`
    rejected: Option<CoreError>,
}

impl CompositeBuilder {
    pub fn child(mut self, spec: NodeSpec) -> Self {
        self.children.push(spec);
        self
    }

    pub fn node(self, name: impl Into<String>, behavior: impl Behavior + 'static) -> Self {
        self.child(NodeSpec::leaf(name, behavior))
    }

    pub fn composite(
        self,
        name: impl Into<String>,
        behavior: impl Behavior + 'static,
        body: Composite,
    ) -> Self {
        self.child(NodeSpec::composite(name, behavior, body))
    }

    /// Child started when the composite starts (defaults to the first child).
    pub fn initial(mut self, name: impl Into<String>) -> Self {
        self.initial = Some(name.into());
        self
    }

    pub fn named_transition(
        mut self,
        name: impl Into<String>,
        kind: TransitionKind,
        sources: &[&str],
        destinations: &[&str],
    ) -> Self {
        self.transitions.push(TransitionSpec {
            name: name.into(),
            kind,
            sources: sources.iter().map(|s| s.to_string()).collect(),
            destinations: destinations.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    /// Add a transition named after its kind, e.g. `completiontrans3`.
    pub fn transition(self, kind: TransitionKind, sources: &[&str], destinations: &[&str]) -> Self {
        let name = format!("{}trans{}", kind.trigger().label(), self.transitions.len() + 1);
        self.named_transition(name, kind, sources, destinations)
    }

    pub fn on_completion(self, sources: &[&str], destinations: &[&str]) -> Self {
        self.transition(TransitionKind::Completion, sources, destinations)
    }

    pub fn on_success(self, sources: &[&str], destinations: &[&str]) -> Self {
        self.transition(TransitionKind::Success, sources, destinations)
    }

    pub fn on_failure(self, sources: &[&str], destinations: &[&str]) -> Self {
        self.transition(TransitionKind::Failure, sources, destinations)
    }

    pub fn on_timer(mut self, secs: f64, source: &str, destinations: &[&str]) -> Self {
        match TransitionKind::timer_secs(secs) {
            Ok(kind) => self.transition(kind, &[source], destinations),
            Err(e) => {
                self.rejected.get_or_insert_with(|| {
                    CoreError::graph(
                        ErrorKind::InvalidArgument,
                        source.to_string(),
                        format_args!("timer from '{source}': {}", e.message),
                    )
                });
                self
            }
        }
    }

    pub fn on_null(self, source: &str, destinations: &[&str]) -> Self {
        self.transition(TransitionKind::Null, &[source], destinations)
    }

    pub fn on_escalation(self, source: &str, destinations: &[&str]) -> Self {
        self.transition(TransitionKind::Escalation, &[source], destinations)
    }

    /// Validate names, wiring and connectivity.
    pub fn build(self) -> Result<Composite> {
        if let Some(e) = self.rejected {
            return Err(e);
        }
        if self.children.is_empty() {
            return Err(CoreError::graph(
                ErrorKind::InvalidArgument,
                "",
                format_args!("composite has no children"),
            ));
        }

        let mut index: HashMap<&str, usize> = HashMap::new();
        for (i, child) in self.children.iter().enumerate() {
            validate_name(&child.name)?;
            if index.insert(child.name.as_str(), i).is_some() {
                return Err(CoreError::graph(
                    ErrorKind::DuplicateName,
                    child.name.clone(),
                    format_args!("duplicate node name '{}'", child.name),
                ));
            }
        }

        let initial = match &self.initial {
            Some(name) => *index.get(name.as_str()).ok_or_else(|| {
                CoreError::graph(
                    ErrorKind::UnknownNode,
                    name.clone(),
                    format_args!("initial node '{name}' is not a child"),
                )
            })?,
            None => 0,
        };

        let mut transition_names = BTreeSet::new();
        let mut triggers: HashMap<(usize, EventKind), &str> = HashMap::new();
        let mut edges: Vec<(Vec<usize>, Vec<usize>)> = Vec::with_capacity(self.transitions.len());

        for t in &self.transitions {
            if !transition_names.insert(t.name.as_str()) {
                return Err(CoreError::graph(
                    ErrorKind::DuplicateName,
                    t.name.clone(),
                    format_args!("duplicate transition name '{}'", t.name),
                ));
            }
            if t.sources.is_empty() || t.destinations.is_empty() {
                return Err(CoreError::graph(
                    ErrorKind::InvalidArgument,
                    t.name.clone(),
                    format_args!("transition '{}' needs at least one source and one destination", t.name),
                ));
            }
            if t.sources.len() > 1 && !t.kind.allows_join() {
                return Err(CoreError::graph(
                    ErrorKind::InvalidArgument,
                    t.name.clone(),
                    format_args!("{} transition '{}' must have exactly one source", t.kind, t.name),
                ));
            }
            if let TransitionKind::Timer(d) = t.kind {
                if d.is_zero() {
                    return Err(CoreError::graph(
                        ErrorKind::InvalidArgument,
                        t.name.clone(),
                        format_args!("timer transition '{}' has zero duration", t.name),
                    ));
                }
            }

            let resolve = |names: &[String]| -> Result<Vec<usize>> {
                let mut out = Vec::with_capacity(names.len());
                for name in names {
                    let i = *index.get(name.as_str()).ok_or_else(|| {
                        CoreError::graph(
                            ErrorKind::UnknownNode,
                            name.clone(),
                            format_args!("transition '{}' names unknown node '{name}'", t.name),
                        )
                    })?;
                    if out.contains(&i) {
                        return Err(CoreError::graph(
                            ErrorKind::DuplicateName,
                            name.clone(),
                            format_args!("transition '{}' lists '{name}' twice", t.name),
                        ));
                    }
                    out.push(i);
                }
                Ok(out)
            };
            let sources = resolve(&t.sources)?;
            let destinations = resolve(&t.destinations)?;

            for &s in &sources {
                if t.kind == TransitionKind::Escalation && !self.children[s].is_composite() {
                    return Err(CoreError::graph(
                        ErrorKind::Unreachable,
                        self.children[s].name.clone(),
                        format_args!(
                            "escalation transition '{}' is sourced at leaf '{}' and can never fire",
                            t.name, self.children[s].name
                        ),
                    ));
                }
                if let Some(other) = triggers.insert((s, t.kind.trigger()), t.name.as_str()) {
                    return Err(CoreError::graph(
                        ErrorKind::AmbiguousTransition,
                        self.children[s].name.clone(),
                        format_args!(
                            "'{}' has two {} transitions: '{other}' and '{}'",
                            self.children[s].name,
                            t.kind.trigger(),
                            t.name
                        ),
                    ));
                }
            }
            edges.push((sources, destinations));
        }

        // Everything must be reachable from the initial child.
        let mut seen = vec![false; self.children.len()];
        let mut frontier = VecDeque::from([initial]);
        seen[initial] = true;
        while let Some(n) = frontier.pop_front() {
            for (sources, destinations) in &edges {
                if !sources.contains(&n) {
                    continue;
                }
                for &d in destinations {
                    if !seen[d] {
                        seen[d] = true;
                        frontier.push_back(d);
                    }
                }
            }
        }
        if let Some(orphan) = seen.iter().position(|s| !s) {
            let name = &self.children[orphan].name;
            return Err(CoreError::graph(
                ErrorKind::Unreachable,
                name.clone(),
                format_args!("node '{name}' is not reachable from '{}'", self.children[initial].name),
            ));
        }

        Ok(Composite {
            children: self.children,
            transitions: self.transitions,
            initial,
        })
    }
}

/// Node names are path segments.
pub(crate) fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('.') {
        return Err(CoreError::graph(
            ErrorKind::InvalidArgument,
            name.to_string(),
            format_args!("invalid node name '{name}' (empty or contains '.')"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Domain, Payload};

    fn two_step() -> CompositeBuilder {
        Composite::builder()
            .node("a", StateNode)
            .node("b", StateNode)
            .on_completion(&["a"], &["b"])
    }

    #[test]
    fn valid_body_builds_with_generated_names() {
        let body = two_step().build().unwrap();
        assert_eq!(body.initial(), "a");
        assert_eq!(body.transitions()[0].name, "completiontrans1");
    }

    #[test]
    fn duplicate_sibling_names_are_rejected() {
        let e = two_step().node("a", StateNode).build().unwrap_err();
        assert_eq!(e.kind, ErrorKind::DuplicateName);
    }

    #[test]
    fn unknown_names_are_rejected() {
        let e = two_step().on_failure(&["a"], &["nowhere"]).build().unwrap_err();
        assert_eq!(e.kind, ErrorKind::UnknownNode);

        let e = two_step().initial("ghost").build().unwrap_err();
        assert_eq!(e.kind, ErrorKind::UnknownNode);
    }

    #[test]
    fn same_source_and_trigger_twice_is_ambiguous() {
        let e = two_step()
            .node("c", StateNode)
            .on_completion(&["a"], &["c"])
            .build()
            .unwrap_err();
        assert_eq!(e.kind, ErrorKind::AmbiguousTransition);
    }

    #[test]
    fn joins_count_toward_ambiguity() {
        let e = Composite::builder()
            .node("a", StateNode)
            .node("b", StateNode)
            .node("c", StateNode)
            .initial("a")
            .on_null("a", &["b", "c"])
            .on_completion(&["b", "c"], &["a"])
            .on_completion(&["c"], &["b"])
            .build()
            .unwrap_err();
        assert_eq!(e.kind, ErrorKind::AmbiguousTransition);
    }

    #[test]
    fn single_source_kinds_reject_joins() {
        let e = Composite::builder()
            .node("a", StateNode)
            .node("b", StateNode)
            .node("c", StateNode)
            .on_null("a", &["b"])
            .transition(TransitionKind::timer_secs(1.0).unwrap(), &["a", "b"], &["c"])
            .build()
            .unwrap_err();
        assert_eq!(e.kind, ErrorKind::InvalidArgument);
    }

    #[test]
    fn zero_timer_is_rejected() {
        let e = Composite::builder()
            .node("a", StateNode)
            .node("b", StateNode)
            .on_timer(0.0, "a", &["b"])
            .build()
            .unwrap_err();
        assert_eq!(e.kind, ErrorKind::InvalidArgument);
    }

    #[test]
    fn unrepresentable_timers_are_rejected_at_build() {
        for secs in [-1.0, f64::NAN, f64::INFINITY, 1e30] {
            let e = Composite::builder()
                .node("a", StateNode)
                .node("b", StateNode)
                .on_timer(secs, "a", &["b"])
                .build()
                .unwrap_err();
            assert_eq!(e.kind, ErrorKind::InvalidArgument, "{secs}");
            assert_eq!(e.domain, Domain::Graph);
            assert_eq!(e.payload, Payload::Node { name: "a".into() });
        }
    }

    #[test]
    fn unreachable_nodes_are_rejected() {
        let e = two_step().node("island", StateNode).build().unwrap_err();
        assert_eq!(e.kind, ErrorKind::Unreachable);
    }

    #[test]
    fn escalation_from_leaf_can_never_fire() {
        let e = two_step().on_escalation("a", &["b"]).build().unwrap_err();
        assert_eq!(e.kind, ErrorKind::Unreachable);

        let inner = Composite::builder().node("x", StateNode).build().unwrap();
        two_step()
            .child(NodeSpec::group("sub", inner))
            .on_escalation("b", &["sub"])
            .build()
            .unwrap_err();
    }

    #[test]
    fn escalation_from_composite_is_accepted() {
        let inner = Composite::builder().node("x", StateNode).build().unwrap();
        Composite::builder()
            .child(NodeSpec::group("sub", inner))
            .node("handler", StateNode)
            .on_escalation("sub", &["handler"])
            .build()
            .unwrap();
    }

    #[test]
    fn dotted_names_are_rejected() {
        let e = Composite::builder()
            .node("a.b", StateNode)
            .build()
            .unwrap_err();
        assert_eq!(e.kind, ErrorKind::InvalidArgument);
    }
}
