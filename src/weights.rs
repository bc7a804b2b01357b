//! Named weight / feature-value vectors.
//!
//! A `WeightVector` is used both for model weights and for the feature
//! values carried by rules. Sparse features are addressed by name; dense
//! features live in positional slots whose indices are handed out once by a
//! `FeatureRegistry` during initialization and never change afterwards.

use crate::error::ConfigError;
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;

/// Positional slot of a dense feature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DenseId(usize);

impl DenseId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Assigns dense slots to feature names.
///
/// Every feature function registers its dense features here when it is
/// constructed; the registry is then handed to `FeatureFunctions`.
#[derive(Debug, Default, Clone)]
pub struct FeatureRegistry {
    names: Vec<String>,
    index: FxHashMap<String, DenseId>,
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one dense feature and return its slot.
    pub fn register_dense(&mut self, name: &str) -> Result<DenseId, ConfigError> {
        if self.index.contains_key(name) {
            return Err(ConfigError::DuplicateFeature(name.to_string()));
        }
        let id = DenseId(self.names.len());
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), id);
        log::debug!("Assigning index {} to feature {}", id.0, name);
        Ok(id)
    }

    /// Register several dense features; returns the slot of the first one.
    /// The rest follow contiguously. Nothing is registered if any name is
    /// already taken or repeated.
    pub fn register_dense_many(&mut self, names: &[&str]) -> Result<DenseId, ConfigError> {
        let mut seen: FxHashSet<&str> = FxHashSet::default();
        for &name in names {
            if self.index.contains_key(name) || !seen.insert(name) {
                return Err(ConfigError::DuplicateFeature(name.to_string()));
            }
        }
        let first = DenseId(self.names.len());
        for name in names {
            self.register_dense(name)?;
        }
        Ok(first)
    }

    pub fn index_of(&self, name: &str) -> Option<DenseId> {
        self.index.get(name).copied()
    }

    pub fn is_dense(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn name(&self, id: DenseId) -> Option<&str> {
        self.names.get(id.0).map(String::as_str)
    }

    /// Dense feature names in slot order.
    pub fn dense_names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Sparse named features plus dense positional slots.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct WeightVector {
    dense: Vec<f64>,
    sparse: FxHashMap<String, f64>,
}

impl WeightVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A vector holding a single sparse feature.
    pub fn single(name: &str, value: f64) -> Self {
        let mut v = Self::new();
        v.set(name, value);
        v
    }

    /// Parse `[name=]value` tokens.
    ///
    /// Unlabeled values are named `{prefix}{k}` where `k` counts the
    /// unlabeled tokens seen so far, and their sign is flipped so that
    /// grammar scores (log probabilities) become costs. Labeled values are
    /// kept as written.
    pub fn from_feature_string(features: &str, prefix: &str) -> Result<Self, ConfigError> {
        let mut v = Self::new();
        let mut unlabeled = 0;
        for token in features.split_whitespace() {
            match token.split_once('=') {
                Some((name, value)) => {
                    let value: f64 = value
                        .parse()
                        .map_err(|_| ConfigError::InvalidFeatureValue(token.to_string()))?;
                    v.set(name, value);
                }
                None => {
                    let value: f64 = token
                        .parse()
                        .map_err(|_| ConfigError::InvalidFeatureValue(token.to_string()))?;
                    v.set(&format!("{}{}", prefix, unlabeled), -value);
                    unlabeled += 1;
                }
            }
        }
        Ok(v)
    }

    /// Value of a sparse feature, 0.0 if absent.
    pub fn get(&self, name: &str) -> f64 {
        self.sparse.get(name).copied().unwrap_or(0.0)
    }

    /// Value of a dense slot, 0.0 if never set.
    pub fn get_dense(&self, id: DenseId) -> f64 {
        self.dense.get(id.0).copied().unwrap_or(0.0)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sparse.contains_key(name)
    }

    pub fn set(&mut self, name: &str, value: f64) {
        self.sparse.insert(name.to_string(), value);
    }

    pub fn set_dense(&mut self, id: DenseId, value: f64) {
        self.grow(id);
        self.dense[id.0] = value;
    }

    pub fn increment(&mut self, name: &str, value: f64) {
        *self.sparse.entry(name.to_string()).or_insert(0.0) += value;
    }

    pub fn increment_dense(&mut self, id: DenseId, value: f64) {
        self.grow(id);
        self.dense[id.0] += value;
    }

    fn grow(&mut self, id: DenseId) {
        if self.dense.len() <= id.0 {
            self.dense.resize(id.0 + 1, 0.0);
        }
    }

    /// Set union; values present in both are summed.
    pub fn add(&mut self, other: &WeightVector) {
        for (name, value) in &other.sparse {
            self.increment(name, *value);
        }
        for (i, value) in other.dense.iter().enumerate() {
            self.increment_dense(DenseId(i), *value);
        }
    }

    /// Subtract `other`; keys missing here start at 0.0.
    pub fn subtract(&mut self, other: &WeightVector) {
        for (name, value) in &other.sparse {
            self.increment(name, -*value);
        }
        for (i, value) in other.dense.iter().enumerate() {
            self.increment_dense(DenseId(i), -*value);
        }
    }

    pub fn scale(&mut self, factor: f64) {
        for value in self.sparse.values_mut() {
            *value *= factor;
        }
        for value in &mut self.dense {
            *value *= factor;
        }
    }

    /// Inner product over shared sparse keys and shared dense slots.
    pub fn inner_product(&self, other: &WeightVector) -> f64 {
        let sparse: f64 = self
            .sparse
            .iter()
            .filter_map(|(name, value)| other.sparse.get(name).map(|o| value * o))
            .sum();
        let dense: f64 = self
            .dense
            .iter()
            .zip(other.dense.iter())
            .map(|(a, b)| a * b)
            .sum();
        sparse + dense
    }

    /// Copy sparse values whose names are registered dense features into
    /// their slots.
    pub fn densify(&mut self, registry: &FeatureRegistry) {
        for (i, name) in registry.dense_names().iter().enumerate() {
            if let Some(&value) = self.sparse.get(name) {
                self.set_dense(DenseId(i), value);
            }
        }
    }

    /// Number of sparse entries plus nonzero dense slots.
    pub fn len(&self) -> usize {
        self.sparse.len() + self.dense.iter().filter(|v| **v != 0.0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dense_len(&self) -> usize {
        self.dense.len()
    }

    /// Sparse entries sorted by name.
    pub fn iter_sorted(&self) -> Vec<(&str, f64)> {
        let mut entries: Vec<(&str, f64)> =
            self.sparse.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }

    /// Render dense features by registered name in slot order, followed by
    /// the remaining sparse features sorted by name.
    pub fn format_with(&self, registry: &FeatureRegistry) -> String {
        let mut parts = Vec::new();
        for (i, name) in registry.dense_names().iter().enumerate() {
            parts.push(format!("{}={:.3}", name, self.get_dense(DenseId(i))));
        }
        for (name, value) in self.iter_sorted() {
            if !registry.is_dense(name) {
                parts.push(format!("{}={:.3}", name, value));
            }
        }
        parts.join(" ")
    }
}

impl fmt::Display for WeightVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (i, value) in self.dense.iter().enumerate() {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "#{}={:.3}", i, value)?;
            first = false;
        }
        for (name, value) in self.iter_sorted() {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "{}={:.3}", name, value)?;
            first = false;
        }
        Ok(())
    }
}
