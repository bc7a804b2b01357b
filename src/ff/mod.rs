//! Feature functions: the scoring components the chart consults to price
//! every rule application.
//!
//! A feature function is either stateless (its cost depends only on the
//! rule and span) or stateful (it also reads the dynamic-programming state
//! it left on each antecedent and returns a new state for the result).
//! Stateful states become part of a node's signature, so a stateful
//! function must return `Some` state for every transition.
//!
//! Implementations must be pure functions of their inputs; two nodes with
//! equal signatures have to be interchangeable in every later combination.

pub mod lm;
pub mod phrase;

pub use lm::{LanguageModel, LanguageModelFeature, NgramTable};
pub use phrase::{ArityPenalty, PhraseModel, WordPenalty};

use crate::error::ConfigError;
use crate::forest::Span;
use crate::rule::Rule;
use crate::weights::{DenseId, FeatureRegistry, WeightVector};
use smallvec::SmallVec;

/// Opaque per-node state of a stateful feature function.
///
/// The chart only hashes and compares it; its layout belongs to the
/// function that produced it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DpState(SmallVec<[u32; 8]>);

impl DpState {
    pub fn new(data: impl IntoIterator<Item = u32>) -> Self {
        DpState(data.into_iter().collect())
    }

    pub fn data(&self) -> &[u32] {
        &self.0
    }
}

/// Result of applying a rule, before weighting.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    /// Cost of this step.
    pub cost: f64,
    /// Heuristic estimate of cost that will only be known later.
    pub future_estimate: f64,
    /// New state; required for stateful functions.
    pub state: Option<DpState>,
}

impl Transition {
    pub fn stateless(cost: f64) -> Self {
        Transition {
            cost,
            future_estimate: 0.0,
            state: None,
        }
    }

    pub fn stateful(cost: f64, future_estimate: f64, state: DpState) -> Self {
        Transition {
            cost,
            future_estimate,
            state: Some(state),
        }
    }
}

/// A scoring component.
pub trait FeatureFunction: Send + Sync {
    /// Name of the dense feature this function registered.
    fn name(&self) -> &str;

    /// Slot holding this function's weight.
    fn dense_id(&self) -> DenseId;

    fn is_stateful(&self) -> bool {
        false
    }

    /// Score `rule` over `span`. `antecedents[k]` is this function's state
    /// on the `k`-th antecedent node (always `None` for stateless ones).
    fn transition(&self, rule: &Rule, antecedents: &[Option<&DpState>], span: Span) -> Transition;

    /// Extra cost charged once when a complete derivation reaches the goal,
    /// e.g. sentence-boundary language-model cost.
    fn finalize(&self, _state: Option<&DpState>) -> f64 {
        0.0
    }

    /// Context-free estimate used to sort rules for cube pruning.
    fn estimate_rule(&self, _rule: &Rule) -> f64 {
        0.0
    }
}

/// Ordered set of feature functions with one weight each.
///
/// Weights live in the dense slots of a `WeightVector`, indexed by the slot
/// each function registered.
pub struct FeatureFunctions {
    functions: Vec<Box<dyn FeatureFunction>>,
    weights: WeightVector,
    registry: FeatureRegistry,
}

impl FeatureFunctions {
    /// Wrap the registry the functions were constructed with.
    pub fn new(registry: FeatureRegistry) -> Self {
        FeatureFunctions {
            functions: Vec::new(),
            weights: WeightVector::new(),
            registry,
        }
    }

    /// Append a function with its initial weight.
    pub fn push(&mut self, function: Box<dyn FeatureFunction>, weight: f64) {
        self.weights.set_dense(function.dense_id(), weight);
        self.functions.push(function);
    }

    /// Builder-style `push`.
    pub fn with(mut self, function: impl FeatureFunction + 'static, weight: f64) -> Self {
        self.push(Box::new(function), weight);
        self
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&dyn FeatureFunction> {
        self.functions.get(index).map(|f| f.as_ref())
    }

    /// Iterate `(function, weight)` in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&dyn FeatureFunction, f64)> + '_ {
        self.functions
            .iter()
            .map(move |f| (f.as_ref(), self.weights.get_dense(f.dense_id())))
    }

    pub fn weight(&self, index: usize) -> Option<f64> {
        self.functions
            .get(index)
            .map(|f| self.weights.get_dense(f.dense_id()))
    }

    pub fn set_weight(&mut self, index: usize, weight: f64) -> Result<(), ConfigError> {
        let id = self
            .functions
            .get(index)
            .map(|f| f.dense_id())
            .ok_or(ConfigError::WeightCountMismatch {
                expected: self.functions.len(),
                actual: index + 1,
            })?;
        self.weights.set_dense(id, weight);
        Ok(())
    }

    /// Weights in registration order.
    pub fn weights(&self) -> Vec<f64> {
        self.iter().map(|(_, w)| w).collect()
    }

    /// Replace every weight; `weights` must have one entry per function.
    pub fn set_weights(&mut self, weights: &[f64]) -> Result<(), ConfigError> {
        if weights.len() != self.functions.len() {
            return Err(ConfigError::WeightCountMismatch {
                expected: self.functions.len(),
                actual: weights.len(),
            });
        }
        for (f, &w) in self.functions.iter().zip(weights) {
            let old = self.weights.get_dense(f.dense_id());
            self.weights.set_dense(f.dense_id(), w);
            log::info!("Feature function {}: weight changed from {} to {}", f.name(), old, w);
        }
        Ok(())
    }

    /// Take weights by feature name; functions not named in `named` keep
    /// their current weight. Returns how many weights were updated.
    pub fn load_named_weights(&mut self, named: &WeightVector) -> usize {
        let mut updated = 0;
        for f in &self.functions {
            if named.contains(f.name()) {
                self.weights.set_dense(f.dense_id(), named.get(f.name()));
                updated += 1;
            }
        }
        updated
    }

    pub fn weight_vector(&self) -> &WeightVector {
        &self.weights
    }

    pub fn registry(&self) -> &FeatureRegistry {
        &self.registry
    }

    /// Weighted context-free cost of a rule, used to order rule bins.
    pub fn estimate_rule_cost(&self, rule: &Rule) -> f64 {
        self.iter().map(|(f, w)| w * f.estimate_rule(rule)).sum()
    }
}
