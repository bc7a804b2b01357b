//! Error types for decoder setup and decoding.
//!
//! Configuration problems are reported before any sentence is decoded.
//! Decode errors are contract violations inside the chart; they abort the
//! current sentence because the forest would otherwise be silently wrong.
//! Candidates rejected by pruning are not errors (see `ChartStats`).

use crate::vocab::SymbolId;
use thiserror::Error;

/// Errors raised while assembling a decoder.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("got {actual} weights for {expected} feature functions")]
    WeightCountMismatch { expected: usize, actual: usize },
    #[error("beam width must be at least 1")]
    InvalidBeamWidth,
    #[error("relative threshold must be non-negative, got {0}")]
    InvalidThreshold(f64),
    #[error("cube pruning slack fuzz1 ({fuzz1}) must not exceed fuzz2 ({fuzz2})")]
    FuzzOrder { fuzz1: f64, fuzz2: f64 },
    #[error("goal symbol {0:?} is not in the vocabulary")]
    UnknownGoalSymbol(String),
    #[error("no feature functions registered")]
    NoFeatureFunctions,
    #[error("dense feature {0:?} registered twice")]
    DuplicateFeature(String),
    #[error("invalid feature value {0:?}")]
    InvalidFeatureValue(String),
}

/// Errors that abort the decode of one sentence.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("stateful feature function {component} returned no state for a rule with lhs {lhs:?}")]
    MissingState { component: String, lhs: SymbolId },
    #[error("no goal-symbol derivation covers the input")]
    NoGoalDerivation,
    #[error("goal cell holds {0} nodes, expected exactly one")]
    GoalNotUnique(usize),
    #[error("cannot combine rules of arity {arity} exhaustively (at most {max})")]
    UnsupportedArity { arity: usize, max: usize },
    #[error("rules expect {expected} antecedent groups, got {actual}")]
    AntecedentMismatch { expected: usize, actual: usize },
}
