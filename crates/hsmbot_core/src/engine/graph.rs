use std::fmt::Write as _;

use crate::node::NodeId;
use crate::transition::TransitionKind;

/// Static shape of a dispatcher's hierarchy, for introspection and dumps.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionGraph {
    pub nodes: Vec<NodeInfo>,
    pub transitions: Vec<TransitionEdge>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub id: NodeId,
    pub path: String,
    pub kind: &'static str,
    pub parent: Option<NodeId>,
    /// True when the parent starts this node first.
    pub initial: bool,
}

/// Directed transition edge between sibling nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionEdge {
    /// Path of the composite that owns the transition.
    pub owner: String,
    pub name: String,
    pub kind: TransitionKind,
    pub sources: Vec<String>,
    pub destinations: Vec<String>,
}

impl TransitionGraph {
    pub fn node(&self, path: &str) -> Option<&NodeInfo> {
        self.nodes.iter().find(|n| n.path == path)
    }

    /// Transitions declared inside the composite at `owner`.
    pub fn edges_of<'a>(&'a self, owner: &'a str) -> impl Iterator<Item = &'a TransitionEdge> {
        self.transitions.iter().filter(move |t| t.owner == owner)
    }

    /// One line per transition, in the arrow notation: `a,b =C=> c`.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let mut owner = "";
        for t in &self.transitions {
            if t.owner != owner {
                owner = &t.owner;
                let _ = writeln!(out, "[{owner}]");
            }
            let _ = writeln!(
                out,
                "  {} {} {}",
                t.sources.join(","),
                t.kind,
                t.destinations.join(",")
            );
        }
        out
    }
}
