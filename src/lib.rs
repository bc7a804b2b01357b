//! hiero-chart: bottom-up chart decoding over synchronous grammars.
//!
//! This crate provides:
//! - Weight vectors with a dense feature registry
//! - Pluggable stateless and stateful feature functions
//! - A packed derivation forest in an append-only arena
//! - Per-span cells with signature merging, beam and threshold pruning
//! - Cube pruning over the rule × antecedent rank lattice
//! - A chart driver and a thread-safe decoder facade

pub mod cell;
pub mod chart;
pub mod config;
pub mod cube;
pub mod decoder;
pub mod error;
pub mod ff;
pub mod forest;
pub mod grammar;
pub mod hypergraph;
pub mod rule;
pub mod vocab;
pub mod weights;

#[cfg(test)]
mod testing;
#[cfg(test)]
mod tests;

// Re-exports for convenience
pub use cell::{Admission, Cell, CellContext, PruningBounds, SuperItem};
pub use chart::{Chart, ChartStats};
pub use config::{DecoderConfig, DecoderConfigBuilder};
pub use decoder::Decoder;
pub use error::{ConfigError, DecodeError};
pub use ff::{
    ArityPenalty, DpState, FeatureFunction, FeatureFunctions, LanguageModel, LanguageModelFeature,
    NgramTable, PhraseModel, Transition, WordPenalty,
};
pub use forest::{Edge, EdgeId, Forest, Node, NodeId, Signature, Span};
pub use grammar::{Grammar, MemoryGrammar, RuleApplication};
pub use hypergraph::HyperGraph;
pub use rule::{Rule, SourceToken, TargetToken};
pub use vocab::{SymbolId, Vocabulary};
pub use weights::{DenseId, FeatureRegistry, WeightVector};
