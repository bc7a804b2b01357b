//! Decoder facade.
//!
//! A `Decoder` owns everything that is shared, read-only, across
//! sentences: the grammar, the scoring components with their weights, and
//! the configuration. Each `decode` call builds its own chart and forest, so
//! sentences can be decoded in parallel; changing weights takes `&mut self`
//! and therefore cannot overlap a decode.

use crate::chart::Chart;
use crate::config::DecoderConfig;
use crate::error::{ConfigError, DecodeError};
use crate::ff::FeatureFunctions;
use crate::grammar::Grammar;
use crate::hypergraph::HyperGraph;
use crate::vocab::{SymbolId, Vocabulary};
use rayon::prelude::*;

pub struct Decoder<G: Grammar> {
    grammar: G,
    models: FeatureFunctions,
    config: DecoderConfig,
    goal_symbol: SymbolId,
}

impl<G: Grammar> Decoder<G> {
    /// Validate the setup and sort the grammar under the initial weights.
    pub fn new(
        mut grammar: G,
        models: FeatureFunctions,
        vocab: &Vocabulary,
        config: DecoderConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if models.is_empty() {
            return Err(ConfigError::NoFeatureFunctions);
        }
        let goal_symbol = vocab
            .get(&config.goal_symbol)
            .ok_or_else(|| ConfigError::UnknownGoalSymbol(config.goal_symbol.clone()))?;
        grammar.sort_rules(&models);
        log::info!(
            "Decoder ready: {} feature functions, beam {}, cube pruning {}",
            models.len(),
            config.beam_width,
            config.use_cube_pruning
        );
        Ok(Decoder {
            grammar,
            models,
            config,
            goal_symbol,
        })
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn models(&self) -> &FeatureFunctions {
        &self.models
    }

    pub fn grammar(&self) -> &G {
        &self.grammar
    }

    /// Build the forest for one sentence.
    pub fn decode(&self, sentence: &[SymbolId]) -> Result<HyperGraph, DecodeError> {
        let graph = Chart::new(
            sentence,
            &self.grammar,
            &self.models,
            &self.config,
            self.goal_symbol,
        )
        .expand()?;
        log::info!(
            "Decoded {} words, best cost {:.3}",
            sentence.len(),
            graph.best_cost()
        );
        Ok(graph)
    }

    /// Decode independent sentences in parallel, preserving input order.
    pub fn decode_batch(&self, sentences: &[Vec<SymbolId>]) -> Vec<Result<HyperGraph, DecodeError>> {
        sentences
            .par_iter()
            .map(|sentence| self.decode(sentence))
            .collect()
    }

    /// Replace every component weight, in registration order, and re-sort
    /// the grammar.
    pub fn change_weights(&mut self, weights: &[f64]) -> Result<(), ConfigError> {
        self.models.set_weights(weights)?;
        self.grammar.sort_rules(&self.models);
        Ok(())
    }
}
