//! Packed derivation forest.
//!
//! Nodes and edges live in an append-only arena owned by one sentence's
//! chart and are addressed by index. Nothing is freed while the forest is
//! alive: a node superseded by a cheaper equivalent is only flagged dead, so
//! edges elsewhere that still point at it stay valid for k-best traversal.
//! Indices are never reused, so they need no generation tag.

use crate::ff::DpState;
use crate::rule::Rule;
use crate::vocab::SymbolId;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;

/// Half-open input range `[start, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end);
        Span { start, end }
    }

    pub fn width(&self) -> usize {
        self.end - self.start
    }

    /// Check if `other` lies inside this span.
    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(u32);

impl EdgeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Antecedent list of an edge; the base formalism has at most two.
pub type Antecedents = SmallVec<[NodeId; 2]>;

/// Dynamic-programming identity of a node within its span.
///
/// Holds one slot per registered feature function, in registration order;
/// slots of stateless functions are always `None`. Two derivations with
/// equal signatures score identically in every larger derivation and are
/// merged into one node.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Signature {
    lhs: SymbolId,
    states: Box<[Option<DpState>]>,
}

impl Signature {
    pub fn new(lhs: SymbolId, states: Box<[Option<DpState>]>) -> Self {
        Signature { lhs, states }
    }

    pub fn lhs(&self) -> SymbolId {
        self.lhs
    }

    /// State contributed by the feature function at `component`.
    pub fn state(&self, component: usize) -> Option<&DpState> {
        self.states.get(component).and_then(Option::as_ref)
    }
}

/// One rule application: a rule over an ordered list of antecedent nodes.
/// Goal edges carry no rule.
#[derive(Clone, Debug)]
pub struct Edge {
    rule: Option<Arc<Rule>>,
    best_cost: f64,
    transition_cost: f64,
    antecedents: Antecedents,
}

impl Edge {
    pub fn new(
        rule: Option<Arc<Rule>>,
        best_cost: f64,
        transition_cost: f64,
        antecedents: Antecedents,
    ) -> Self {
        Edge {
            rule,
            best_cost,
            transition_cost,
            antecedents,
        }
    }

    pub fn rule(&self) -> Option<&Arc<Rule>> {
        self.rule.as_ref()
    }

    /// Finalized cost: antecedents' best costs plus this step.
    pub fn best_cost(&self) -> f64 {
        self.best_cost
    }

    /// Weighted cost of this step alone.
    pub fn transition_cost(&self) -> f64 {
        self.transition_cost
    }

    pub fn antecedents(&self) -> &[NodeId] {
        &self.antecedents
    }
}

/// A forest vertex: all derivations of one `(span, lhs, signature)`.
#[derive(Clone, Debug)]
pub struct Node {
    span: Span,
    signature: Signature,
    est_cost: f64,
    best_cost: f64,
    best_edge: EdgeId,
    /// Alternatives in discovery order; includes `best_edge`.
    edges: Vec<EdgeId>,
    dead: bool,
}

impl Node {
    pub fn span(&self) -> Span {
        self.span
    }

    pub fn lhs(&self) -> SymbolId {
        self.signature.lhs
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn state(&self, component: usize) -> Option<&DpState> {
        self.signature.state(component)
    }

    /// Estimated cost the node was admitted with; orders it in its cell.
    pub fn est_cost(&self) -> f64 {
        self.est_cost
    }

    /// Finalized cost of the best edge.
    pub fn best_cost(&self) -> f64 {
        self.best_cost
    }

    pub fn best_edge(&self) -> EdgeId {
        self.best_edge
    }

    pub fn edges(&self) -> &[EdgeId] {
        &self.edges
    }

    /// Check if a cheaper equivalent node superseded this one.
    pub fn is_dead(&self) -> bool {
        self.dead
    }
}

/// Arena of nodes and edges for one sentence.
#[derive(Clone, Debug, Default)]
pub struct Forest {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl Forest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_edge(&mut self, edge: Edge) -> EdgeId {
        let id = EdgeId(self.edges.len() as u32);
        self.edges.push(edge);
        id
    }

    /// Allocate a node for `edge` with estimated cost `est_cost`.
    ///
    /// `alternatives` are earlier edges of the same signature; `edge` is
    /// appended after them. The best edge is the one with the lowest
    /// finalized cost, `edge` on ties.
    pub fn add_node(
        &mut self,
        span: Span,
        signature: Signature,
        est_cost: f64,
        edge: EdgeId,
        alternatives: &[EdgeId],
    ) -> NodeId {
        let mut best_edge = edge;
        let mut best_cost = self.edges[edge.index()].best_cost;
        for &alt in alternatives {
            let cost = self.edges[alt.index()].best_cost;
            if cost < best_cost {
                best_edge = alt;
                best_cost = cost;
            }
        }
        let mut edges = Vec::with_capacity(alternatives.len() + 1);
        edges.extend_from_slice(alternatives);
        edges.push(edge);

        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            span,
            signature,
            est_cost,
            best_cost,
            best_edge,
            edges,
            dead: false,
        });
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id.index()]
    }

    /// Record another derivation of `node`. A strictly cheaper edge becomes
    /// the best edge; the estimate, which orders the node in its cell, is
    /// left alone.
    pub(crate) fn push_alternative(&mut self, node: NodeId, edge: EdgeId) {
        let cost = self.edges[edge.index()].best_cost;
        let n = &mut self.nodes[node.index()];
        n.edges.push(edge);
        if cost < n.best_cost {
            n.best_cost = cost;
            n.best_edge = edge;
        }
    }

    /// Make `edge` the best derivation of `node` if it is strictly cheaper.
    /// Only used for the goal node, which is never combined further.
    pub(crate) fn push_and_promote(&mut self, node: NodeId, edge: EdgeId) -> bool {
        let cost = self.edges[edge.index()].best_cost;
        let n = &mut self.nodes[node.index()];
        n.edges.push(edge);
        if cost < n.best_cost {
            n.est_cost += cost - n.best_cost;
            n.best_cost = cost;
            n.best_edge = edge;
            true
        } else {
            false
        }
    }

    pub(crate) fn mark_dead(&mut self, node: NodeId) {
        self.nodes[node.index()].dead = true;
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }
}
