//! Read-only view of a decoded forest.

use crate::chart::ChartStats;
use crate::forest::{Edge, EdgeId, Forest, Node, NodeId};
use crate::rule::Rule;
use crate::weights::WeightVector;
use std::sync::Arc;

/// The forest of one decoded sentence, rooted at its goal node.
#[derive(Debug, Clone)]
pub struct HyperGraph {
    forest: Forest,
    goal: NodeId,
    stats: ChartStats,
    sentence_len: usize,
}

impl HyperGraph {
    pub(crate) fn new(forest: Forest, goal: NodeId, stats: ChartStats, sentence_len: usize) -> Self {
        HyperGraph {
            forest,
            goal,
            stats,
            sentence_len,
        }
    }

    pub fn goal_id(&self) -> NodeId {
        self.goal
    }

    pub fn goal(&self) -> &Node {
        self.forest.node(self.goal)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        self.forest.node(id)
    }

    pub fn edge(&self, id: EdgeId) -> &Edge {
        self.forest.edge(id)
    }

    pub fn forest(&self) -> &Forest {
        &self.forest
    }

    pub fn stats(&self) -> &ChartStats {
        &self.stats
    }

    pub fn sentence_len(&self) -> usize {
        self.sentence_len
    }

    /// Finalized cost of the best complete derivation.
    pub fn best_cost(&self) -> f64 {
        self.goal().best_cost()
    }

    /// Visit the best derivation in pre-order: each node with its best edge,
    /// then its antecedents left to right.
    pub fn walk_best(&self, mut visit: impl FnMut(NodeId, &Edge)) {
        let mut stack = vec![self.goal];
        while let Some(id) = stack.pop() {
            let edge = self.edge(self.node(id).best_edge());
            visit(id, edge);
            stack.extend(edge.antecedents().iter().rev());
        }
    }

    /// Rules of the best derivation in pre-order.
    pub fn best_rules(&self) -> Vec<Arc<Rule>> {
        let mut rules = Vec::new();
        self.walk_best(|_, edge| {
            if let Some(rule) = edge.rule() {
                rules.push(Arc::clone(rule));
            }
        });
        rules
    }

    /// Sum of the rule features along the best derivation.
    pub fn viterbi_features(&self) -> WeightVector {
        let mut total = WeightVector::new();
        self.walk_best(|_, edge| {
            if let Some(rule) = edge.rule() {
                total.add(&rule.features);
            }
        });
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forest::{Signature, Span};
    use crate::testing::{axiom, binary_rule};
    use crate::vocab::{SymbolId, Vocabulary};
    use smallvec::smallvec;

    /// goal <- S[0,2] <- (X[0,1], X[1,2])
    fn small_graph() -> HyperGraph {
        let mut vocab = Vocabulary::new();
        let a = axiom(&mut vocab, "X", "a", 1.0);
        let b = axiom(&mut vocab, "X", "b", 2.0);
        let glue = binary_rule(&mut vocab, "S", "X", "X", 0.5);
        let sig = |lhs: SymbolId| Signature::new(lhs, Vec::new().into_boxed_slice());

        let mut forest = Forest::new();
        let ea = forest.add_edge(Edge::new(Some(Arc::clone(&a)), 1.0, 1.0, smallvec![]));
        let na = forest.add_node(Span::new(0, 1), sig(a.lhs), 1.0, ea, &[]);
        let eb = forest.add_edge(Edge::new(Some(Arc::clone(&b)), 2.0, 2.0, smallvec![]));
        let nb = forest.add_node(Span::new(1, 2), sig(b.lhs), 2.0, eb, &[]);
        let es = forest.add_edge(Edge::new(Some(Arc::clone(&glue)), 3.5, 0.5, smallvec![na, nb]));
        let ns = forest.add_node(Span::new(0, 2), sig(glue.lhs), 3.5, es, &[]);
        let eg = forest.add_edge(Edge::new(None, 3.5, 0.0, smallvec![ns]));
        let goal = forest.add_node(Span::new(0, 2), sig(glue.lhs), 3.5, eg, &[]);

        HyperGraph::new(forest, goal, ChartStats::default(), 2)
    }

    #[test]
    fn test_walk_best_pre_order() {
        let graph = small_graph();
        let mut spans = Vec::new();
        graph.walk_best(|id, _| spans.push(graph.node(id).span()));

        assert_eq!(
            spans,
            vec![Span::new(0, 2), Span::new(0, 2), Span::new(0, 1), Span::new(1, 2)]
        );
        assert_eq!(graph.best_cost(), 3.5);
        assert_eq!(graph.sentence_len(), 2);
    }

    #[test]
    fn test_best_rules_and_features() {
        let graph = small_graph();
        let costs: Vec<f64> = graph
            .best_rules()
            .iter()
            .map(|r| r.features.get("cost"))
            .collect();
        assert_eq!(costs, vec![0.5, 1.0, 2.0]);
        assert_eq!(graph.viterbi_features().get("cost"), 3.5);
    }
}
