//! Decoder configuration.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Beam and search settings shared by every cell of a decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Maximum number of live nodes per cell.
    pub beam_width: usize,
    /// Width of the admission window above the best cost in a cell.
    pub relative_threshold: f64,
    /// Cube pruning stops once the cheapest pending state is this far past
    /// the cutoff.
    pub fuzz1: f64,
    /// Neighbors this far past the cutoff are not queued.
    pub fuzz2: f64,
    /// Nonterminal whose full-span nodes are collapsed into the goal.
    pub goal_symbol: String,
    /// Combine with cube pruning; otherwise enumerate every combination.
    pub use_cube_pruning: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        DecoderConfig {
            beam_width: 30,
            relative_threshold: 10.0,
            fuzz1: 0.1,
            fuzz2: 0.2,
            goal_symbol: "S".to_string(),
            use_cube_pruning: true,
        }
    }
}

impl DecoderConfig {
    /// Settings that disable every bound, useful for checking search
    /// approximations against full enumeration.
    pub fn unbounded() -> Self {
        DecoderConfig {
            beam_width: usize::MAX,
            relative_threshold: f64::INFINITY,
            fuzz1: f64::INFINITY,
            fuzz2: f64::INFINITY,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.beam_width == 0 {
            return Err(ConfigError::InvalidBeamWidth);
        }
        if self.relative_threshold.is_nan() || self.relative_threshold < 0.0 {
            return Err(ConfigError::InvalidThreshold(self.relative_threshold));
        }
        if self.fuzz1.is_nan() || self.fuzz2.is_nan() || self.fuzz1 > self.fuzz2 {
            return Err(ConfigError::FuzzOrder {
                fuzz1: self.fuzz1,
                fuzz2: self.fuzz2,
            });
        }
        if self.goal_symbol.is_empty() {
            return Err(ConfigError::UnknownGoalSymbol(self.goal_symbol.clone()));
        }
        Ok(())
    }
}

/// Builder for [`DecoderConfig`].
#[derive(Debug, Clone, Default)]
pub struct DecoderConfigBuilder {
    config: DecoderConfig,
}

impl DecoderConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn beam_width(mut self, n: usize) -> Self {
        self.config.beam_width = n;
        self
    }

    pub fn relative_threshold(mut self, threshold: f64) -> Self {
        self.config.relative_threshold = threshold;
        self
    }

    pub fn fuzz(mut self, fuzz1: f64, fuzz2: f64) -> Self {
        self.config.fuzz1 = fuzz1;
        self.config.fuzz2 = fuzz2;
        self
    }

    pub fn goal_symbol(mut self, symbol: &str) -> Self {
        self.config.goal_symbol = symbol.to_string();
        self
    }

    pub fn use_cube_pruning(mut self, on: bool) -> Self {
        self.config.use_cube_pruning = on;
        self
    }

    pub fn build(self) -> Result<DecoderConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
