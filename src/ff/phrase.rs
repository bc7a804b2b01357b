//! Stateless feature functions.

use super::{DpState, FeatureFunction, Transition};
use crate::error::ConfigError;
use crate::forest::Span;
use crate::rule::Rule;
use crate::weights::{DenseId, FeatureRegistry};

/// One column of the translation-model scores stored on each rule, read
/// from the rule feature `tm_{owner}_{column}`.
#[derive(Debug, Clone)]
pub struct PhraseModel {
    name: String,
    dense_id: DenseId,
}

impl PhraseModel {
    pub fn new(registry: &mut FeatureRegistry, owner: &str, column: usize) -> Result<Self, ConfigError> {
        let name = format!("tm_{}_{}", owner, column);
        let dense_id = registry.register_dense(&name)?;
        Ok(PhraseModel { name, dense_id })
    }

    fn cost(&self, rule: &Rule) -> f64 {
        rule.features.get(&self.name)
    }
}

impl FeatureFunction for PhraseModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn dense_id(&self) -> DenseId {
        self.dense_id
    }

    fn transition(&self, rule: &Rule, _antecedents: &[Option<&DpState>], _span: Span) -> Transition {
        Transition::stateless(self.cost(rule))
    }

    fn estimate_rule(&self, rule: &Rule) -> f64 {
        self.cost(rule)
    }
}

/// Cost per target word (`log10(e)` by default, i.e. one nat in log10 units).
#[derive(Debug, Clone)]
pub struct WordPenalty {
    dense_id: DenseId,
    per_word: f64,
}

impl WordPenalty {
    pub const NAME: &'static str = "WordPenalty";

    pub fn new(registry: &mut FeatureRegistry) -> Result<Self, ConfigError> {
        Self::with_cost(registry, std::f64::consts::LOG10_E)
    }

    pub fn with_cost(registry: &mut FeatureRegistry, per_word: f64) -> Result<Self, ConfigError> {
        let dense_id = registry.register_dense(Self::NAME)?;
        Ok(WordPenalty { dense_id, per_word })
    }

    fn cost(&self, rule: &Rule) -> f64 {
        self.per_word * rule.target_words() as f64
    }
}

impl FeatureFunction for WordPenalty {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn dense_id(&self) -> DenseId {
        self.dense_id
    }

    fn transition(&self, rule: &Rule, _antecedents: &[Option<&DpState>], _span: Span) -> Transition {
        Transition::stateless(self.cost(rule))
    }

    fn estimate_rule(&self, rule: &Rule) -> f64 {
        self.cost(rule)
    }
}

/// Unit cost for every rule whose arity lies in `[min_arity, max_arity]`.
#[derive(Debug, Clone)]
pub struct ArityPenalty {
    name: String,
    dense_id: DenseId,
    min_arity: usize,
    max_arity: usize,
}

impl ArityPenalty {
    pub fn new(
        registry: &mut FeatureRegistry,
        min_arity: usize,
        max_arity: usize,
    ) -> Result<Self, ConfigError> {
        let name = format!("ArityPenalty_{}_{}", min_arity, max_arity);
        let dense_id = registry.register_dense(&name)?;
        Ok(ArityPenalty {
            name,
            dense_id,
            min_arity,
            max_arity,
        })
    }

    fn cost(&self, rule: &Rule) -> f64 {
        if (self.min_arity..=self.max_arity).contains(&rule.arity()) {
            1.0
        } else {
            0.0
        }
    }
}

impl FeatureFunction for ArityPenalty {
    fn name(&self) -> &str {
        &self.name
    }

    fn dense_id(&self) -> DenseId {
        self.dense_id
    }

    fn transition(&self, rule: &Rule, _antecedents: &[Option<&DpState>], _span: Span) -> Transition {
        Transition::stateless(self.cost(rule))
    }

    fn estimate_rule(&self, rule: &Rule) -> f64 {
        self.cost(rule)
    }
}
