//! Shared fixtures for unit tests.

use crate::cell::CellContext;
use crate::chart::ChartStats;
use crate::ff::{DpState, FeatureFunction, FeatureFunctions, Transition};
use crate::forest::{Forest, Span};
use crate::rule::{Rule, SourceToken, TargetToken};
use crate::vocab::Vocabulary;
use crate::weights::{DenseId, FeatureRegistry, WeightVector};
use std::sync::Arc;

/// Stateless: cost is the rule's `cost` feature.
pub(crate) struct RuleCost {
    dense_id: DenseId,
}

impl RuleCost {
    pub(crate) fn new(registry: &mut FeatureRegistry) -> Self {
        RuleCost {
            dense_id: registry.register_dense("rule_cost").unwrap(),
        }
    }
}

impl FeatureFunction for RuleCost {
    fn name(&self) -> &str {
        "rule_cost"
    }

    fn dense_id(&self) -> DenseId {
        self.dense_id
    }

    fn transition(&self, rule: &Rule, _antecedents: &[Option<&DpState>], _span: Span) -> Transition {
        Transition::stateless(rule.features.get("cost"))
    }

    fn estimate_rule(&self, rule: &Rule) -> f64 {
        rule.features.get("cost")
    }
}

/// Stateful: the state is the first target word of the yield. Costs
/// nothing, but estimates 0.25 for every node so estimates and finalized
/// costs differ.
pub(crate) struct FirstWord {
    dense_id: DenseId,
}

impl FirstWord {
    pub(crate) const ESTIMATE: f64 = 0.25;

    pub(crate) fn new(registry: &mut FeatureRegistry) -> Self {
        FirstWord {
            dense_id: registry.register_dense("first_word").unwrap(),
        }
    }
}

impl FeatureFunction for FirstWord {
    fn name(&self) -> &str {
        "first_word"
    }

    fn dense_id(&self) -> DenseId {
        self.dense_id
    }

    fn is_stateful(&self) -> bool {
        true
    }

    fn transition(&self, rule: &Rule, antecedents: &[Option<&DpState>], _span: Span) -> Transition {
        let state = match rule.target.first() {
            Some(TargetToken::Word(w)) => DpState::new([w.as_u32()]),
            Some(TargetToken::Slot(k)) => antecedents
                .get(*k)
                .copied()
                .flatten()
                .cloned()
                .unwrap_or_else(|| DpState::new([])),
            None => DpState::new([]),
        };
        Transition::stateful(0.0, Self::ESTIMATE, state)
    }
}

/// Claims to be stateful but never returns a state.
pub(crate) struct Forgetful {
    dense_id: DenseId,
}

impl Forgetful {
    pub(crate) fn new(registry: &mut FeatureRegistry) -> Self {
        Forgetful {
            dense_id: registry.register_dense("forgetful").unwrap(),
        }
    }
}

impl FeatureFunction for Forgetful {
    fn name(&self) -> &str {
        "forgetful"
    }

    fn dense_id(&self) -> DenseId {
        self.dense_id
    }

    fn is_stateful(&self) -> bool {
        true
    }

    fn transition(&self, _rule: &Rule, _antecedents: &[Option<&DpState>], _span: Span) -> Transition {
        Transition::stateless(0.0)
    }
}

/// Stateful with one constant state, so every node of a symbol merges.
/// Costs the rule's `cost` feature and estimates its `fut` feature.
pub(crate) struct RuleFuture {
    dense_id: DenseId,
}

impl RuleFuture {
    pub(crate) fn new(registry: &mut FeatureRegistry) -> Self {
        RuleFuture {
            dense_id: registry.register_dense("rule_future").unwrap(),
        }
    }
}

impl FeatureFunction for RuleFuture {
    fn name(&self) -> &str {
        "rule_future"
    }

    fn dense_id(&self) -> DenseId {
        self.dense_id
    }

    fn is_stateful(&self) -> bool {
        true
    }

    fn transition(&self, rule: &Rule, _antecedents: &[Option<&DpState>], _span: Span) -> Transition {
        Transition::stateful(rule.features.get("cost"), rule.features.get("fut"), DpState::new([7]))
    }
}

/// `RuleCost` and `FirstWord` at weight 1.
pub(crate) fn standard_models() -> FeatureFunctions {
    let mut registry = FeatureRegistry::new();
    let cost = RuleCost::new(&mut registry);
    let first = FirstWord::new(&mut registry);
    FeatureFunctions::new(registry)
        .with(cost, 1.0)
        .with(first, 1.0)
}

pub(crate) struct Fixture {
    pub vocab: Vocabulary,
    pub forest: Forest,
    pub models: FeatureFunctions,
    pub stats: ChartStats,
}

impl Fixture {
    fn with_models(models: FeatureFunctions) -> Self {
        Fixture {
            vocab: Vocabulary::new(),
            forest: Forest::new(),
            models,
            stats: ChartStats::default(),
        }
    }

    pub(crate) fn new() -> Self {
        Self::with_models(standard_models())
    }

    /// Only `RuleCost`.
    pub(crate) fn stateless() -> Self {
        let mut registry = FeatureRegistry::new();
        let cost = RuleCost::new(&mut registry);
        Self::with_models(FeatureFunctions::new(registry).with(cost, 1.0))
    }

    /// `RuleCost` followed by `Forgetful`.
    pub(crate) fn with_forgetful() -> Self {
        let mut registry = FeatureRegistry::new();
        let cost = RuleCost::new(&mut registry);
        let forgetful = Forgetful::new(&mut registry);
        Self::with_models(
            FeatureFunctions::new(registry)
                .with(cost, 1.0)
                .with(forgetful, 1.0),
        )
    }

    /// Only `RuleFuture`.
    pub(crate) fn with_rule_future() -> Self {
        let mut registry = FeatureRegistry::new();
        let future = RuleFuture::new(&mut registry);
        Self::with_models(FeatureFunctions::new(registry).with(future, 1.0))
    }

    pub(crate) fn context(&mut self) -> CellContext<'_> {
        CellContext {
            forest: &mut self.forest,
            models: &self.models,
            stats: &mut self.stats,
        }
    }
}

/// `[lhs] ||| word ||| word` with feature `cost`.
pub(crate) fn axiom(vocab: &mut Vocabulary, lhs: &str, word: &str, cost: f64) -> Arc<Rule> {
    let lhs = vocab.intern(lhs);
    let word = vocab.intern(word);
    Arc::new(Rule::lexical(lhs, word, word, WeightVector::single("cost", cost)))
}

/// `[lhs] ||| word ||| word` with features `cost` and `fut`.
pub(crate) fn axiom_with_future(
    vocab: &mut Vocabulary,
    lhs: &str,
    word: &str,
    cost: f64,
    future: f64,
) -> Arc<Rule> {
    let lhs = vocab.intern(lhs);
    let word = vocab.intern(word);
    let mut features = WeightVector::single("cost", cost);
    features.set("fut", future);
    Arc::new(Rule::lexical(lhs, word, word, features))
}

/// `[lhs] ||| [left,1] [right,2] ||| [1] [2]` with feature `cost`.
pub(crate) fn binary_rule(
    vocab: &mut Vocabulary,
    lhs: &str,
    left: &str,
    right: &str,
    cost: f64,
) -> Arc<Rule> {
    let lhs = vocab.intern(lhs);
    let left = vocab.intern(left);
    let right = vocab.intern(right);
    Arc::new(Rule::new(
        lhs,
        vec![SourceToken::Nonterminal(left), SourceToken::Nonterminal(right)],
        vec![TargetToken::Slot(0), TargetToken::Slot(1)],
        WeightVector::single("cost", cost),
    ))
}

/// `[lhs] ||| [left,1] [right,2] ||| [2] [1]` with feature `cost`.
pub(crate) fn inverted_rule(
    vocab: &mut Vocabulary,
    lhs: &str,
    left: &str,
    right: &str,
    cost: f64,
) -> Arc<Rule> {
    let lhs = vocab.intern(lhs);
    let left = vocab.intern(left);
    let right = vocab.intern(right);
    Arc::new(Rule::new(
        lhs,
        vec![SourceToken::Nonterminal(left), SourceToken::Nonterminal(right)],
        vec![TargetToken::Slot(1), TargetToken::Slot(0)],
        WeightVector::single("cost", cost),
    ))
}
