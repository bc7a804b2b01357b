//! Cube pruning over the rule × antecedent rank lattice.
//!
//! Axis 0 ranks the rules of one application (sorted by static cost) and
//! axis `k > 0` ranks the nodes of the `k`-th antecedent super-item (sorted
//! by estimated cost). Search starts at the all-zero corner and expands a
//! popped state by bumping one axis at a time, so only the cheap corner of
//! the cube is ever priced.

use crate::cell::{Cell, CellContext, Priced, SuperItem};
use crate::error::DecodeError;
use crate::forest::Antecedents;
use crate::rule::Rule;
use ordered_float::OrderedFloat;
use priority_queue::PriorityQueue;
use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use std::cmp::Reverse;
use std::sync::Arc;

/// Position in the cube: one 0-based rank per axis.
type Ranks = SmallVec<[u32; 4]>;

/// Frontier priority: cheapest estimate first, then discovery order.
type FrontierKey = Reverse<(OrderedFloat<f64>, usize)>;

struct Candidate {
    ranks: Ranks,
    rule: Arc<Rule>,
    antecedents: Antecedents,
    priced: Priced,
}

impl Cell {
    /// Best-first combination of `rules` with `super_items`, stopping once
    /// the cheapest pending state is at least `cutoff + fuzz1`.
    pub fn combine_with_cube_pruning(
        &mut self,
        ctx: &mut CellContext<'_>,
        super_items: &[&SuperItem],
        rules: &[Arc<Rule>],
        lattice_cost: f64,
    ) -> Result<(), DecodeError> {
        if rules.is_empty() || super_items.iter().any(|s| s.nodes.is_empty()) {
            return Ok(());
        }
        let axis_len = |axis: usize| -> usize {
            if axis == 0 {
                rules.len()
            } else {
                super_items[axis - 1].nodes.len()
            }
        };
        let fuzz1 = self.bounds().fuzz1;
        let fuzz2 = self.bounds().fuzz2;

        let mut pending: Vec<Option<Candidate>> = Vec::new();
        let mut frontier: PriorityQueue<usize, FrontierKey> = PriorityQueue::new();
        let mut visited: FxHashSet<Ranks> = FxHashSet::default();

        let seed: Ranks = SmallVec::from_elem(0, 1 + super_items.len());
        visited.insert(seed.clone());
        let candidate = self.candidate(ctx, seed, super_items, rules, lattice_cost)?;
        frontier.push(0, Reverse((OrderedFloat(candidate.priced.est_cost), 0)));
        pending.push(Some(candidate));

        while let Some((index, _)) = frontier.pop() {
            let Some(current) = pending[index].take() else {
                continue;
            };
            let est_cost = current.priced.est_cost;
            self.admit(ctx, current.rule, current.priced, current.antecedents);

            if est_cost >= self.cutoff() + fuzz1 {
                ctx.stats.prepruned_fuzz1 += frontier.len();
                log::trace!(
                    "{}: cube stopped at {:.3}, dropping {} pending states",
                    self.span(),
                    est_cost,
                    frontier.len()
                );
                break;
            }

            for axis in 0..current.ranks.len() {
                let mut next = current.ranks.clone();
                next[axis] += 1;
                if next[axis] as usize >= axis_len(axis) || !visited.insert(next.clone()) {
                    continue;
                }
                let neighbor = self.candidate(ctx, next, super_items, rules, lattice_cost)?;
                let neighbor_cost = neighbor.priced.est_cost;
                if neighbor_cost < self.cutoff() + fuzz2 {
                    let id = pending.len();
                    frontier.push(id, Reverse((OrderedFloat(neighbor_cost), id)));
                    pending.push(Some(neighbor));
                } else {
                    ctx.stats.prepruned_fuzz2 += 1;
                }
            }
        }
        Ok(())
    }

    fn candidate(
        &self,
        ctx: &mut CellContext<'_>,
        ranks: Ranks,
        super_items: &[&SuperItem],
        rules: &[Arc<Rule>],
        lattice_cost: f64,
    ) -> Result<Candidate, DecodeError> {
        let rule = Arc::clone(&rules[ranks[0] as usize]);
        let antecedents: Antecedents = super_items
            .iter()
            .zip(&ranks[1..])
            .map(|(item, &rank)| item.nodes[rank as usize])
            .collect();
        let priced = self.price_combination(ctx, &rule, &antecedents, lattice_cost)?;
        Ok(Candidate {
            ranks,
            rule,
            antecedents,
            priced,
        })
    }
}
