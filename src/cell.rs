//! Per-span working set of forest nodes.
//!
//! A cell prices rule applications, merges derivations that share a
//! signature, and keeps at most `beam_width` live nodes whose estimated cost
//! stays below a cutoff of `best + relative_threshold`. Eviction order is a
//! worst-first heap whose entries for superseded nodes are discarded lazily.

use crate::chart::ChartStats;
use crate::config::DecoderConfig;
use crate::error::DecodeError;
use crate::ff::{DpState, FeatureFunctions};
use crate::forest::{Antecedents, Edge, Forest, NodeId, Signature, Span};
use crate::rule::Rule;
use crate::vocab::SymbolId;
use ordered_float::OrderedFloat;
use rustc_hash::FxHashMap;
use smallvec::{smallvec, SmallVec};
use std::collections::BinaryHeap;
use std::sync::Arc;

/// Cost at or above which nothing is ever admitted.
pub const INFEASIBLE_COST: f64 = 99999.0;

/// Margin added when the cutoff snaps to the worst retained node.
pub const EPSILON: f64 = 1e-6;

/// Largest arity `combine_exhaustively` enumerates.
pub const MAX_EXHAUSTIVE_ARITY: usize = 2;

/// Beam settings a cell enforces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PruningBounds {
    pub beam_width: usize,
    pub relative_threshold: f64,
    pub fuzz1: f64,
    pub fuzz2: f64,
}

impl From<&DecoderConfig> for PruningBounds {
    fn from(config: &DecoderConfig) -> Self {
        PruningBounds {
            beam_width: config.beam_width,
            relative_threshold: config.relative_threshold,
            fuzz1: config.fuzz1,
            fuzz2: config.fuzz2,
        }
    }
}

impl Default for PruningBounds {
    fn default() -> Self {
        PruningBounds::from(&DecoderConfig::default())
    }
}

/// The live nodes of one cell sharing a left-hand symbol, ascending by
/// estimated cost.
#[derive(Debug, Clone, PartialEq)]
pub struct SuperItem {
    pub lhs: SymbolId,
    pub nodes: Vec<NodeId>,
}

/// Cost breakdown and states of one priced combination.
#[derive(Debug, Clone, PartialEq)]
pub struct Priced {
    /// Finalized cost plus weighted future-cost estimates.
    pub est_cost: f64,
    /// Antecedents' best costs plus the weighted transition cost.
    pub finalized_cost: f64,
    /// Weighted cost of this step alone.
    pub transition_cost: f64,
    pub(crate) states: Box<[Option<DpState>]>,
}

/// What `admit` did with a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// At or above the cutoff; nothing was stored.
    Pruned,
    /// First node with this signature.
    Added(NodeId),
    /// Appended to an existing node as an alternative.
    Merged(NodeId),
    /// Cheaper than the existing node, which is now dead.
    Replaced { old: NodeId, new: NodeId },
}

/// Mutable state shared by every cell of one chart.
pub struct CellContext<'a> {
    pub forest: &'a mut Forest,
    pub models: &'a FeatureFunctions,
    pub stats: &'a mut ChartStats,
}

/// Eviction-heap entry; the max-heap pops the worst estimate first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct HeapEntry {
    cost: OrderedFloat<f64>,
    node: NodeId,
}

#[derive(Debug, Clone, Default)]
struct SortedView {
    nodes: Vec<NodeId>,
    super_items: Vec<SuperItem>,
}

/// Combination and pruning engine for one span.
#[derive(Debug, Clone)]
pub struct Cell {
    span: Span,
    bounds: PruningBounds,
    best_cost: f64,
    cutoff: f64,
    table: FxHashMap<Signature, NodeId>,
    heap: BinaryHeap<HeapEntry>,
    /// Heap entries whose node has been superseded.
    dead: usize,
    sorted: Option<SortedView>,
}

impl Cell {
    pub fn new(span: Span, bounds: PruningBounds) -> Self {
        Cell {
            span,
            bounds,
            best_cost: INFEASIBLE_COST,
            cutoff: INFEASIBLE_COST,
            table: FxHashMap::default(),
            heap: BinaryHeap::new(),
            dead: 0,
            sorted: None,
        }
    }

    pub fn span(&self) -> Span {
        self.span
    }

    pub fn bounds(&self) -> &PruningBounds {
        &self.bounds
    }

    /// Lowest estimated cost admitted so far.
    pub fn best_cost(&self) -> f64 {
        self.best_cost
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Live node with this signature, if any.
    pub fn get(&self, signature: &Signature) -> Option<NodeId> {
        self.table.get(signature).copied()
    }

    /// Price `rule` over `antecedents` without touching the cell.
    pub fn price_combination(
        &self,
        ctx: &mut CellContext<'_>,
        rule: &Rule,
        antecedents: &[NodeId],
        lattice_cost: f64,
    ) -> Result<Priced, DecodeError> {
        if antecedents.len() != rule.arity() {
            return Err(DecodeError::AntecedentMismatch {
                expected: rule.arity(),
                actual: antecedents.len(),
            });
        }
        ctx.stats.priced += 1;

        let forest: &Forest = ctx.forest;
        let mut finalized = antecedents
            .iter()
            .map(|&a| forest.node(a).best_cost())
            .sum::<f64>();
        let mut transition = lattice_cost;
        let mut future = 0.0;
        let mut states: Vec<Option<DpState>> = Vec::with_capacity(ctx.models.len());

        for (component, (function, weight)) in ctx.models.iter().enumerate() {
            let inputs: SmallVec<[Option<&DpState>; 2]> = antecedents
                .iter()
                .map(|&a| forest.node(a).state(component))
                .collect();
            let result = function.transition(rule, &inputs, self.span);
            transition += weight * result.cost;
            future += weight * result.future_estimate;

            if function.is_stateful() {
                match result.state {
                    Some(state) => states.push(Some(state)),
                    None => {
                        return Err(DecodeError::MissingState {
                            component: function.name().to_string(),
                            lhs: rule.lhs,
                        })
                    }
                }
            } else {
                states.push(None);
            }
        }

        finalized += transition;
        Ok(Priced {
            est_cost: finalized + future,
            finalized_cost: finalized,
            transition_cost: transition,
            states: states.into_boxed_slice(),
        })
    }

    /// Try to insert a priced combination.
    pub fn admit(
        &mut self,
        ctx: &mut CellContext<'_>,
        rule: Arc<Rule>,
        priced: Priced,
        antecedents: Antecedents,
    ) -> Admission {
        let est_cost = priced.est_cost;
        if est_cost >= self.cutoff {
            ctx.stats.prepruned += 1;
            log::trace!(
                "{}: prepruned candidate at {:.3} (cutoff {:.3})",
                self.span,
                est_cost,
                self.cutoff
            );
            return Admission::Pruned;
        }

        let signature = Signature::new(rule.lhs, priced.states);
        let edge = ctx.forest.add_edge(Edge::new(
            Some(rule),
            priced.finalized_cost,
            priced.transition_cost,
            antecedents,
        ));

        let admission = match self.table.get(&signature).copied() {
            Some(old) => {
                ctx.stats.merged += 1;
                if est_cost < ctx.forest.node(old).est_cost() {
                    ctx.forest.mark_dead(old);
                    self.dead += 1;
                    let alternatives = ctx.forest.node(old).edges().to_vec();
                    let new =
                        ctx.forest
                            .add_node(self.span, signature.clone(), est_cost, edge, &alternatives);
                    self.insert_node(signature, new, est_cost);
                    Admission::Replaced { old, new }
                } else {
                    ctx.forest.push_alternative(old, edge);
                    Admission::Merged(old)
                }
            }
            None => {
                ctx.stats.added += 1;
                let node = ctx
                    .forest
                    .add_node(self.span, signature.clone(), est_cost, edge, &[]);
                self.insert_node(signature, node, est_cost);
                Admission::Added(node)
            }
        };

        self.cutoff = self
            .cutoff
            .min(self.best_cost + self.bounds.relative_threshold)
            .min(INFEASIBLE_COST);
        self.enforce_bounds(ctx);
        admission
    }

    fn insert_node(&mut self, signature: Signature, node: NodeId, est_cost: f64) {
        self.table.insert(signature, node);
        self.heap.push(HeapEntry {
            cost: OrderedFloat(est_cost),
            node,
        });
        self.sorted = None;
        if est_cost < self.best_cost {
            self.best_cost = est_cost;
        }
    }

    /// Evict worst nodes until the beam and the cutoff both hold.
    pub fn enforce_bounds(&mut self, ctx: &mut CellContext<'_>) {
        if self.heap.len() == self.dead {
            self.heap.clear();
            self.dead = 0;
            return;
        }

        while let Some(&top) = self.heap.peek() {
            if ctx.forest.node(top.node).is_dead() {
                self.heap.pop();
                self.dead -= 1;
                ctx.stats.dead_reclaimed += 1;
                continue;
            }
            let live = self.heap.len() - self.dead;
            if live <= self.bounds.beam_width && top.cost.0 < self.cutoff {
                if live == self.bounds.beam_width {
                    self.cutoff = self.cutoff.min(top.cost.0 + EPSILON);
                }
                break;
            }

            self.heap.pop();
            let signature = ctx.forest.node(top.node).signature();
            self.table.remove(signature);
            self.sorted = None;
            ctx.stats.pruned += 1;
            log::trace!("{}: evicted node at {:.3}", self.span, top.cost.0);
        }
        debug_assert_eq!(self.table.len(), self.heap.len() - self.dead);
    }

    /// Price a rule with no antecedents and try to insert it.
    pub fn seed_axiom(
        &mut self,
        ctx: &mut CellContext<'_>,
        rule: &Arc<Rule>,
        lattice_cost: f64,
    ) -> Result<Admission, DecodeError> {
        let priced = self.price_combination(ctx, rule, &[], lattice_cost)?;
        Ok(self.admit(ctx, Arc::clone(rule), priced, SmallVec::new()))
    }

    /// Price every rule against every combination of antecedents.
    pub fn combine_exhaustively(
        &mut self,
        ctx: &mut CellContext<'_>,
        super_items: &[&SuperItem],
        rules: &[Arc<Rule>],
        arity: usize,
        lattice_cost: f64,
    ) -> Result<(), DecodeError> {
        if arity > MAX_EXHAUSTIVE_ARITY {
            return Err(DecodeError::UnsupportedArity {
                arity,
                max: MAX_EXHAUSTIVE_ARITY,
            });
        }
        if super_items.len() != arity {
            return Err(DecodeError::AntecedentMismatch {
                expected: arity,
                actual: super_items.len(),
            });
        }

        for rule in rules {
            match super_items {
                [] => {
                    self.seed_axiom(ctx, rule, lattice_cost)?;
                }
                [first] => {
                    for &a in &first.nodes {
                        self.combine(ctx, rule, smallvec![a], lattice_cost)?;
                    }
                }
                [first, second] => {
                    for &a in &first.nodes {
                        for &b in &second.nodes {
                            self.combine(ctx, rule, smallvec![a, b], lattice_cost)?;
                        }
                    }
                }
                _ => {
                    return Err(DecodeError::UnsupportedArity {
                        arity,
                        max: MAX_EXHAUSTIVE_ARITY,
                    })
                }
            }
        }
        Ok(())
    }

    fn combine(
        &mut self,
        ctx: &mut CellContext<'_>,
        rule: &Arc<Rule>,
        antecedents: Antecedents,
        lattice_cost: f64,
    ) -> Result<Admission, DecodeError> {
        let priced = self.price_combination(ctx, rule, &antecedents, lattice_cost)?;
        Ok(self.admit(ctx, Arc::clone(rule), priced, antecedents))
    }

    /// Fold every `goal_symbol` node of `source` into this cell's single
    /// goal node, charging each component's finalization cost. The cell
    /// must be empty; a second call fails with `GoalNotUnique`.
    pub fn finalize_goal(
        &mut self,
        ctx: &mut CellContext<'_>,
        source: &mut Cell,
        goal_symbol: SymbolId,
    ) -> Result<NodeId, DecodeError> {
        if !self.table.is_empty() {
            return Err(DecodeError::GoalNotUnique(self.table.len() + 1));
        }
        let forest: &Forest = ctx.forest;
        let candidates: Vec<NodeId> = source
            .sorted_nodes(forest)
            .iter()
            .copied()
            .filter(|&n| forest.node(n).lhs() == goal_symbol)
            .collect();

        let mut goal: Option<NodeId> = None;
        for candidate in candidates {
            let node = ctx.forest.node(candidate);
            let cost = node.best_cost();
            let final_cost: f64 = ctx
                .models
                .iter()
                .enumerate()
                .map(|(i, (function, weight))| weight * function.finalize(node.state(i)))
                .sum();
            log::debug!(
                "Goal candidate, total_cost: {:.3}; ant_cost: {:.3}; final_tran: {:.3}",
                cost + final_cost,
                cost,
                final_cost
            );

            let edge = ctx.forest.add_edge(Edge::new(
                None,
                cost + final_cost,
                final_cost,
                smallvec![candidate],
            ));
            match goal {
                Some(g) => {
                    ctx.forest.push_and_promote(g, edge);
                }
                None => {
                    let signature = Signature::new(goal_symbol, Vec::new().into_boxed_slice());
                    let g = ctx
                        .forest
                        .add_node(self.span, signature.clone(), cost + final_cost, edge, &[]);
                    self.insert_node(signature, g, cost + final_cost);
                    goal = Some(g);
                }
            }
        }

        let goal = goal.ok_or(DecodeError::NoGoalDerivation)?;
        if self.table.len() != 1 {
            return Err(DecodeError::GoalNotUnique(self.table.len()));
        }
        let best = ctx.forest.node(goal).best_cost();
        self.best_cost = best;
        log::info!("Goal node, best cost is {:.3}", best);
        Ok(goal)
    }

    fn ensure_sorted(&mut self, forest: &Forest) {
        if self.sorted.is_some() {
            return;
        }
        let mut nodes: Vec<NodeId> = self.table.values().copied().collect();
        nodes.sort_by_key(|&n| (OrderedFloat(forest.node(n).est_cost()), n));

        let mut groups: FxHashMap<SymbolId, Vec<NodeId>> = FxHashMap::default();
        for &n in &nodes {
            groups.entry(forest.node(n).lhs()).or_default().push(n);
        }
        let mut super_items: Vec<SuperItem> = groups
            .into_iter()
            .map(|(lhs, nodes)| SuperItem { lhs, nodes })
            .collect();
        super_items.sort_by_key(|s| s.lhs);

        self.sorted = Some(SortedView { nodes, super_items });
    }

    /// Live nodes ascending by estimated cost; rebuilt after any change.
    pub fn sorted_nodes(&mut self, forest: &Forest) -> &[NodeId] {
        self.ensure_sorted(forest);
        match &self.sorted {
            Some(view) => &view.nodes,
            None => &[],
        }
    }

    /// Non-empty super-items ordered by symbol.
    pub fn sorted_super_items(&mut self, forest: &Forest) -> &[SuperItem] {
        self.ensure_sorted(forest);
        match &self.sorted {
            Some(view) => &view.super_items,
            None => &[],
        }
    }

    /// Super-item for `lhs` as of the last sort. Returns `None` if the
    /// cell changed since; call `sorted_super_items` first.
    pub fn super_item(&self, lhs: SymbolId) -> Option<&SuperItem> {
        let view = self.sorted.as_ref()?;
        view.super_items
            .binary_search_by_key(&lhs, |s| s.lhs)
            .ok()
            .map(|i| &view.super_items[i])
    }
}
