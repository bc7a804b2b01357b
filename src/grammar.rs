//! Grammar provider.
//!
//! The chart asks a grammar for every way its rules apply to a span. Rules
//! that share a source pattern are grouped into one bin and offered
//! together, sorted by estimated static cost, so cube pruning can walk them
//! as one axis.

use crate::ff::FeatureFunctions;
use crate::forest::Span;
use crate::rule::{Rule, SourceToken};
use crate::vocab::SymbolId;
use crate::weights::WeightVector;
use ordered_float::OrderedFloat;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::borrow::Cow;
use std::sync::Arc;

/// Sub-span and nonterminal each antecedent slot must cover.
pub type AntecedentSlots = SmallVec<[(Span, SymbolId); 2]>;

/// One way a bin of rules applies to a span.
#[derive(Debug, Clone)]
pub struct RuleApplication<'g> {
    /// Rules sharing one source pattern, ascending by estimated cost.
    pub rules: Cow<'g, [Arc<Rule>]>,
    /// Required antecedents in slot order.
    pub antecedents: AntecedentSlots,
    /// Unweighted cost added to every edge built from this application.
    pub lattice_cost: f64,
}

impl RuleApplication<'_> {
    pub fn arity(&self) -> usize {
        self.antecedents.len()
    }

    /// Check if some antecedent covers `span` itself.
    pub fn is_unary_over(&self, span: Span) -> bool {
        self.antecedents.iter().any(|(s, _)| *s == span)
    }
}

pub trait Grammar: Send + Sync {
    /// Every application of the grammar's rules to `span` of `sentence`.
    fn applications<'g>(&'g self, span: Span, sentence: &[SymbolId]) -> Vec<RuleApplication<'g>>;

    /// Re-sort rule bins under the current weights.
    fn sort_rules(&mut self, models: &FeatureFunctions);
}

#[derive(Debug, Clone)]
struct RuleBin {
    pattern: Vec<SourceToken>,
    rules: Vec<Arc<Rule>>,
    glue: bool,
}

/// In-memory grammar matched directly against the sentence.
#[derive(Debug, Clone)]
pub struct MemoryGrammar {
    bins: Vec<RuleBin>,
    index: FxHashMap<(Vec<SourceToken>, bool), usize>,
    span_limit: usize,
    oov: Option<(SymbolId, WeightVector)>,
    num_rules: usize,
}

impl Default for MemoryGrammar {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SPAN_LIMIT)
    }
}

impl MemoryGrammar {
    pub const DEFAULT_SPAN_LIMIT: usize = 10;

    /// Non-glue rules only apply to spans at most `span_limit` wide.
    pub fn new(span_limit: usize) -> Self {
        MemoryGrammar {
            bins: Vec::new(),
            index: FxHashMap::default(),
            span_limit,
            oov: None,
            num_rules: 0,
        }
    }

    /// Pass words no lexical rule covers through as `[lhs] ||| w ||| w`.
    pub fn with_oov_rules(mut self, lhs: SymbolId, features: WeightVector) -> Self {
        self.oov = Some((lhs, features));
        self
    }

    pub fn add_rule(&mut self, rule: Rule) {
        self.insert(rule, false);
    }

    /// Add a rule that only applies at the sentence start, at any width.
    pub fn add_glue_rule(&mut self, rule: Rule) {
        self.insert(rule, true);
    }

    fn insert(&mut self, rule: Rule, glue: bool) {
        let key = (rule.source.clone(), glue);
        let bin = match self.index.get(&key) {
            Some(&bin) => bin,
            None => {
                self.bins.push(RuleBin {
                    pattern: rule.source.clone(),
                    rules: Vec::new(),
                    glue,
                });
                self.index.insert(key, self.bins.len() - 1);
                self.bins.len() - 1
            }
        };
        self.bins[bin].rules.push(Arc::new(rule));
        self.num_rules += 1;
    }

    pub fn span_limit(&self) -> usize {
        self.span_limit
    }

    /// Number of rules, excluding generated pass-through rules.
    pub fn len(&self) -> usize {
        self.num_rules
    }

    pub fn is_empty(&self) -> bool {
        self.num_rules == 0
    }

    fn covers_word(&self, word: SymbolId) -> bool {
        self.bins
            .iter()
            .any(|bin| !bin.glue && bin.pattern[..] == [SourceToken::Word(word)])
    }
}

impl Grammar for MemoryGrammar {
    fn applications<'g>(&'g self, span: Span, sentence: &[SymbolId]) -> Vec<RuleApplication<'g>> {
        let mut out = Vec::new();
        if span.end > sentence.len() || span.width() == 0 {
            return out;
        }

        for bin in &self.bins {
            if bin.glue && span.start != 0 {
                continue;
            }
            if !bin.glue && span.width() > self.span_limit {
                continue;
            }
            let mut matches = Vec::new();
            match_pattern(
                &bin.pattern,
                sentence,
                span.start,
                span.end,
                &mut SmallVec::new(),
                &mut matches,
            );
            for antecedents in matches {
                out.push(RuleApplication {
                    rules: Cow::Borrowed(bin.rules.as_slice()),
                    antecedents,
                    lattice_cost: 0.0,
                });
            }
        }

        if let Some((lhs, features)) = &self.oov {
            let word = sentence[span.start];
            if span.width() == 1 && !self.covers_word(word) {
                let rule = Rule::lexical(*lhs, word, word, features.clone());
                out.push(RuleApplication {
                    rules: Cow::Owned(vec![Arc::new(rule)]),
                    antecedents: SmallVec::new(),
                    lattice_cost: 0.0,
                });
            }
        }
        out
    }

    fn sort_rules(&mut self, models: &FeatureFunctions) {
        for bin in &mut self.bins {
            bin.rules
                .sort_by_cached_key(|rule| OrderedFloat(models.estimate_rule_cost(rule)));
        }
    }
}

/// Collect every assignment of sub-spans to the nonterminals of `pattern`
/// such that it covers `[pos, end)` exactly.
fn match_pattern(
    pattern: &[SourceToken],
    sentence: &[SymbolId],
    pos: usize,
    end: usize,
    slots: &mut AntecedentSlots,
    out: &mut Vec<AntecedentSlots>,
) {
    let Some((first, rest)) = pattern.split_first() else {
        if pos == end {
            out.push(slots.clone());
        }
        return;
    };
    if end - pos < pattern.len() {
        return;
    }
    match first {
        SourceToken::Word(w) => {
            if sentence[pos] == *w {
                match_pattern(rest, sentence, pos + 1, end, slots, out);
            }
        }
        SourceToken::Nonterminal(x) => {
            // Every later token needs at least one position.
            for split in pos + 1..=end - rest.len() {
                slots.push((Span::new(pos, split), *x));
                match_pattern(rest, sentence, split, end, slots, out);
                slots.pop();
            }
        }
    }
}
