//! N-gram language model feature.
//!
//! The state of a node is the first and last `order - 1` target words of
//! its yield. Words near the left edge cannot be scored until their full
//! history is known, so their lower-order cost only enters the future-cost
//! estimate; they are scored for real once a parent supplies the history, or
//! against `<s>` when the derivation is finalized.

use super::{DpState, FeatureFunction, Transition};
use crate::error::ConfigError;
use crate::forest::Span;
use crate::rule::{Rule, TargetToken};
use crate::vocab::{SymbolId, Vocabulary};
use crate::weights::{DenseId, FeatureRegistry};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

pub const BOS: &str = "<s>";
pub const EOS: &str = "</s>";

/// Backend contract: cost (negative log probability) of the last word of
/// `ngram` given the words before it.
pub trait LanguageModel: Send + Sync {
    fn order(&self) -> usize;

    fn ngram_cost(&self, ngram: &[SymbolId]) -> f64;
}

/// In-memory back-off n-gram table.
#[derive(Debug, Clone)]
pub struct NgramTable {
    order: usize,
    costs: FxHashMap<Vec<SymbolId>, f64>,
    backoffs: FxHashMap<Vec<SymbolId>, f64>,
    oov_cost: f64,
}

impl NgramTable {
    pub fn new(order: usize, oov_cost: f64) -> Self {
        NgramTable {
            order: order.max(1),
            costs: FxHashMap::default(),
            backoffs: FxHashMap::default(),
            oov_cost,
        }
    }

    pub fn insert(&mut self, ngram: &[SymbolId], cost: f64) {
        self.costs.insert(ngram.to_vec(), cost);
    }

    pub fn insert_backoff(&mut self, context: &[SymbolId], cost: f64) {
        self.backoffs.insert(context.to_vec(), cost);
    }
}

impl LanguageModel for NgramTable {
    fn order(&self) -> usize {
        self.order
    }

    fn ngram_cost(&self, ngram: &[SymbolId]) -> f64 {
        let mut ngram = if ngram.len() > self.order {
            &ngram[ngram.len() - self.order..]
        } else {
            ngram
        };
        let mut backoff = 0.0;
        loop {
            if let Some(cost) = self.costs.get(ngram) {
                return backoff + cost;
            }
            if ngram.len() <= 1 {
                return backoff + self.oov_cost;
            }
            backoff += self
                .backoffs
                .get(&ngram[..ngram.len() - 1])
                .copied()
                .unwrap_or(0.0);
            ngram = &ngram[1..];
        }
    }
}

type Words = SmallVec<[SymbolId; 4]>;

/// Decoded form of the LM `DpState`.
#[derive(Debug, Default, PartialEq)]
struct Context {
    left: Words,
    right: Words,
    /// Yield is longer than `order - 1`, so `left` and `right` are
    /// separated by words that were already scored.
    long: bool,
}

impl Context {
    // Layout: [left_len, long, left.., right..]
    fn encode(&self) -> DpState {
        let header = [self.left.len() as u32, self.long as u32];
        DpState::new(
            header
                .into_iter()
                .chain(self.left.iter().map(|w| w.as_u32()))
                .chain(self.right.iter().map(|w| w.as_u32())),
        )
    }

    fn decode(state: &DpState) -> Self {
        let data = state.data();
        if data.len() < 2 {
            return Context::default();
        }
        let left_len = (data[0] as usize).min(data.len() - 2);
        let (left, right) = data[2..].split_at(left_len);
        Context {
            left: left.iter().copied().map(SymbolId::from_u32).collect(),
            right: right.iter().copied().map(SymbolId::from_u32).collect(),
            long: data[1] != 0,
        }
    }
}

/// Running scorer over one target yield.
struct Scan<'a, L: ?Sized> {
    lm: &'a L,
    context_len: usize,
    history: SmallVec<[SymbolId; 8]>,
    left: Words,
    seen: usize,
    long: bool,
    cost: f64,
    future: f64,
}

impl<'a, L: LanguageModel + ?Sized> Scan<'a, L> {
    fn new(lm: &'a L, history: &[SymbolId]) -> Self {
        let context_len = lm.order().saturating_sub(1);
        let mut scan = Scan {
            lm,
            context_len,
            history: SmallVec::new(),
            left: Words::new(),
            seen: 0,
            long: false,
            cost: 0.0,
            future: 0.0,
        };
        scan.set_history(history);
        scan
    }

    fn set_history(&mut self, words: &[SymbolId]) {
        let skip = words.len().saturating_sub(self.context_len);
        self.history.clear();
        self.history.extend_from_slice(&words[skip..]);
    }

    fn push(&mut self, word: SymbolId) {
        let mut ngram: SmallVec<[SymbolId; 8]> = self.history.clone();
        ngram.push(word);
        let cost = self.lm.ngram_cost(&ngram);
        if self.history.len() == self.context_len {
            self.cost += cost;
        } else {
            self.future += cost;
        }

        if self.left.len() < self.context_len {
            self.left.push(word);
        }
        self.history.push(word);
        if self.history.len() > self.context_len {
            self.history.remove(0);
        }
        self.seen += 1;
        if self.seen > self.context_len {
            self.long = true;
        }
    }

    fn absorb(&mut self, child: &Context) {
        for &word in &child.left {
            self.push(word);
        }
        if child.long {
            self.set_history(&child.right);
            self.long = true;
        }
    }

    fn context(&self) -> Context {
        Context {
            left: self.left.clone(),
            right: self.history.iter().copied().collect(),
            long: self.long,
        }
    }
}

/// Stateful n-gram language model feature.
pub struct LanguageModelFeature<L> {
    name: String,
    dense_id: DenseId,
    lm: L,
    bos: SymbolId,
    eos: SymbolId,
}

impl<L: LanguageModel> LanguageModelFeature<L> {
    pub fn new(
        registry: &mut FeatureRegistry,
        vocab: &mut Vocabulary,
        name: &str,
        lm: L,
    ) -> Result<Self, ConfigError> {
        let dense_id = registry.register_dense(name)?;
        Ok(LanguageModelFeature {
            name: name.to_string(),
            dense_id,
            lm,
            bos: vocab.intern(BOS),
            eos: vocab.intern(EOS),
        })
    }

    pub fn model(&self) -> &L {
        &self.lm
    }
}

impl<L: LanguageModel> FeatureFunction for LanguageModelFeature<L> {
    fn name(&self) -> &str {
        &self.name
    }

    fn dense_id(&self) -> DenseId {
        self.dense_id
    }

    fn is_stateful(&self) -> bool {
        true
    }

    fn transition(&self, rule: &Rule, antecedents: &[Option<&DpState>], _span: Span) -> Transition {
        let mut scan = Scan::new(&self.lm, &[]);
        for token in &rule.target {
            match token {
                TargetToken::Word(w) => scan.push(*w),
                TargetToken::Slot(k) => {
                    let child = antecedents
                        .get(*k)
                        .copied()
                        .flatten()
                        .map(Context::decode)
                        .unwrap_or_default();
                    scan.absorb(&child);
                }
            }
        }
        Transition::stateful(scan.cost, scan.future, scan.context().encode())
    }

    fn finalize(&self, state: Option<&DpState>) -> f64 {
        let context = state.map(Context::decode).unwrap_or_default();
        let mut scan = Scan::new(&self.lm, &[self.bos]);
        for &word in &context.left {
            scan.push(word);
        }
        if context.long {
            scan.set_history(&context.right);
        }
        scan.push(self.eos);
        scan.cost + scan.future
    }
}
