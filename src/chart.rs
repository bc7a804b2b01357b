//! Bottom-up chart over one sentence.
//!
//! Spans are completed in order of increasing width, so every antecedent a
//! span needs lives in a finished, sorted cell. A span's cell is built
//! outside the grid and only inserted once it is complete; finished cells are
//! never mutated again.

use crate::cell::{Cell, CellContext, PruningBounds, SuperItem};
use crate::config::DecoderConfig;
use crate::error::DecodeError;
use crate::ff::FeatureFunctions;
use crate::forest::{Forest, Span};
use crate::grammar::{Grammar, RuleApplication};
use crate::hypergraph::HyperGraph;
use crate::vocab::SymbolId;
use rustc_hash::FxHashMap;
use serde::Serialize;
use smallvec::SmallVec;
use std::fmt;

/// Counters collected while building one chart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChartStats {
    /// Combinations priced.
    pub priced: usize,
    /// Nodes created for a new signature.
    pub added: usize,
    /// Candidates that hit an existing signature.
    pub merged: usize,
    /// Live nodes evicted by the beam or the cutoff.
    pub pruned: usize,
    /// Candidates rejected at the cutoff.
    pub prepruned: usize,
    /// Cube states dropped when the search stopped early.
    pub prepruned_fuzz1: usize,
    /// Cube neighbors never queued.
    pub prepruned_fuzz2: usize,
    /// Stale heap entries discarded during eviction.
    pub dead_reclaimed: usize,
}

impl ChartStats {
    /// Add another chart's counters to these.
    pub fn absorb(&mut self, other: &ChartStats) {
        self.priced += other.priced;
        self.added += other.added;
        self.merged += other.merged;
        self.pruned += other.pruned;
        self.prepruned += other.prepruned;
        self.prepruned_fuzz1 += other.prepruned_fuzz1;
        self.prepruned_fuzz2 += other.prepruned_fuzz2;
        self.dead_reclaimed += other.dead_reclaimed;
    }
}

impl fmt::Display for ChartStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "priced={} added={} merged={} pruned={} prepruned={} fuzz1={} fuzz2={} dead={}",
            self.priced,
            self.added,
            self.merged,
            self.pruned,
            self.prepruned,
            self.prepruned_fuzz1,
            self.prepruned_fuzz2,
            self.dead_reclaimed
        )
    }
}

/// Chart under construction for one sentence.
pub struct Chart<'a, G: Grammar + ?Sized> {
    sentence: &'a [SymbolId],
    grammar: &'a G,
    models: &'a FeatureFunctions,
    config: &'a DecoderConfig,
    goal_symbol: SymbolId,
    bounds: PruningBounds,
    cells: FxHashMap<Span, Cell>,
    forest: Forest,
    stats: ChartStats,
}

impl<'a, G: Grammar + ?Sized> Chart<'a, G> {
    pub fn new(
        sentence: &'a [SymbolId],
        grammar: &'a G,
        models: &'a FeatureFunctions,
        config: &'a DecoderConfig,
        goal_symbol: SymbolId,
    ) -> Self {
        Chart {
            sentence,
            grammar,
            models,
            config,
            goal_symbol,
            bounds: PruningBounds::from(config),
            cells: FxHashMap::default(),
            forest: Forest::new(),
            stats: ChartStats::default(),
        }
    }

    /// Complete every span, then collapse the full span into the goal.
    pub fn expand(mut self) -> Result<HyperGraph, DecodeError> {
        let n = self.sentence.len();
        for width in 1..=n {
            for start in 0..=n - width {
                self.complete_span(Span::new(start, start + width))?;
            }
        }

        let full = Span::new(0, n);
        let mut top = self
            .cells
            .remove(&full)
            .ok_or(DecodeError::NoGoalDerivation)?;
        let mut goal_cell = Cell::new(full, self.bounds);
        let mut ctx = CellContext {
            forest: &mut self.forest,
            models: self.models,
            stats: &mut self.stats,
        };
        let goal = goal_cell.finalize_goal(&mut ctx, &mut top, self.goal_symbol)?;
        log::debug!("Chart stats: {}", self.stats);
        Ok(HyperGraph::new(self.forest, goal, self.stats, n))
    }

    fn complete_span(&mut self, span: Span) -> Result<(), DecodeError> {
        let mut cell = Cell::new(span, self.bounds);
        let grammar = self.grammar;
        let (unary, applications): (Vec<RuleApplication<'a>>, Vec<RuleApplication<'a>>) = grammar
            .applications(span, self.sentence)
            .into_iter()
            .partition(|app| app.is_unary_over(span));

        for app in &applications {
            self.apply(&mut cell, app, &[])?;
        }
        if !unary.is_empty() {
            let snapshot = cell.sorted_super_items(&self.forest).to_vec();
            for app in &unary {
                self.apply(&mut cell, app, &snapshot)?;
            }
        }

        let forest = &self.forest;
        let size = cell.sorted_nodes(forest).len();
        if size > 0 {
            let super_items = cell.sorted_super_items(forest).len();
            log::debug!(
                "{}: {} nodes, {} super-items, best {:.3}, cutoff {:.3}",
                span,
                size,
                super_items,
                cell.best_cost(),
                cell.cutoff()
            );
            self.cells.insert(span, cell);
        }
        Ok(())
    }

    /// Combine one application into `cell`. Antecedents over the cell's own
    /// span come from `snapshot`; the rest from finished cells.
    fn apply(
        &mut self,
        cell: &mut Cell,
        app: &RuleApplication<'_>,
        snapshot: &[SuperItem],
    ) -> Result<(), DecodeError> {
        let span = cell.span();
        let mut items: SmallVec<[&SuperItem; 2]> = SmallVec::new();
        for &(slot, symbol) in &app.antecedents {
            let item = if slot == span {
                snapshot.iter().find(|s| s.lhs == symbol)
            } else {
                self.cells.get(&slot).and_then(|c| c.super_item(symbol))
            };
            match item {
                Some(item) => items.push(item),
                None => return Ok(()),
            }
        }

        let mut ctx = CellContext {
            forest: &mut self.forest,
            models: self.models,
            stats: &mut self.stats,
        };
        if items.is_empty() {
            for rule in app.rules.iter() {
                cell.seed_axiom(&mut ctx, rule, app.lattice_cost)?;
            }
        } else if self.config.use_cube_pruning {
            cell.combine_with_cube_pruning(&mut ctx, &items, &app.rules, app.lattice_cost)?;
        } else {
            cell.combine_exhaustively(&mut ctx, &items, &app.rules, app.arity(), app.lattice_cost)?;
        }
        Ok(())
    }
}
