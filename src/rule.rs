//! Synchronous grammar rules.
//!
//! A rule rewrites a left-hand nonterminal into a source pattern (words and
//! nonterminal slots) and a target sequence that refers back to the source
//! slots by position. Its arity is the number of source nonterminals.

use crate::vocab::{SymbolId, Vocabulary};
use crate::weights::WeightVector;
use std::fmt;

/// One element of a rule's source side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SourceToken {
    Word(SymbolId),
    Nonterminal(SymbolId),
}

/// One element of a rule's target side. `Slot(k)` is replaced by the
/// yield of the `k`-th antecedent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TargetToken {
    Word(SymbolId),
    Slot(usize),
}

/// A synchronous rule: `[lhs] ||| source ||| target` with feature values.
#[derive(Clone, Debug, PartialEq)]
pub struct Rule {
    pub lhs: SymbolId,
    pub source: Vec<SourceToken>,
    pub target: Vec<TargetToken>,
    pub features: WeightVector,
    arity: usize,
}

impl Rule {
    pub fn new(
        lhs: SymbolId,
        source: Vec<SourceToken>,
        target: Vec<TargetToken>,
        features: WeightVector,
    ) -> Self {
        let arity = source
            .iter()
            .filter(|t| matches!(t, SourceToken::Nonterminal(_)))
            .count();
        Rule {
            lhs,
            source,
            target,
            features,
            arity,
        }
    }

    /// A rule translating one word into another.
    pub fn lexical(lhs: SymbolId, source: SymbolId, target: SymbolId, features: WeightVector) -> Self {
        Rule::new(
            lhs,
            vec![SourceToken::Word(source)],
            vec![TargetToken::Word(target)],
            features,
        )
    }

    /// Number of nonterminal slots.
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Check if the rule has no nonterminals.
    pub fn is_axiom(&self) -> bool {
        self.arity == 0
    }

    /// Nonterminal symbols of the source side, in slot order.
    pub fn nonterminals(&self) -> impl Iterator<Item = SymbolId> + '_ {
        self.source.iter().filter_map(|t| match t {
            SourceToken::Nonterminal(x) => Some(*x),
            SourceToken::Word(_) => None,
        })
    }

    /// Number of target-side words.
    pub fn target_words(&self) -> usize {
        self.target
            .iter()
            .filter(|t| matches!(t, TargetToken::Word(_)))
            .count()
    }

    /// Render the rule with symbol names.
    pub fn display<'a>(&'a self, vocab: &'a Vocabulary) -> RuleDisplay<'a> {
        RuleDisplay { rule: self, vocab }
    }
}

/// `Display` adapter produced by [`Rule::display`].
pub struct RuleDisplay<'a> {
    rule: &'a Rule,
    vocab: &'a Vocabulary,
}

impl RuleDisplay<'_> {
    fn name(&self, id: SymbolId) -> String {
        match self.vocab.resolve(id) {
            Some(s) => s.to_string(),
            None => id.to_string(),
        }
    }
}

impl fmt::Display for RuleDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] |||", self.name(self.rule.lhs))?;
        let mut slot = 0;
        for token in &self.rule.source {
            match token {
                SourceToken::Word(w) => write!(f, " {}", self.name(*w))?,
                SourceToken::Nonterminal(x) => {
                    slot += 1;
                    write!(f, " [{},{}]", self.name(*x), slot)?;
                }
            }
        }
        write!(f, " |||")?;
        for token in &self.rule.target {
            match token {
                TargetToken::Word(w) => write!(f, " {}", self.name(*w))?,
                TargetToken::Slot(k) => write!(f, " [{}]", k + 1)?,
            }
        }
        if !self.rule.features.is_empty() {
            write!(f, " ||| {}", self.rule.features)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_arity() {
        let mut vocab = Vocabulary::new();
        let x = vocab.intern("X");
        let de = vocab.intern("de");

        let rule = Rule::new(
            x,
            vec![
                SourceToken::Nonterminal(x),
                SourceToken::Word(de),
                SourceToken::Nonterminal(x),
            ],
            vec![TargetToken::Slot(1), TargetToken::Slot(0)],
            WeightVector::new(),
        );

        assert_eq!(rule.arity(), 2);
        assert!(!rule.is_axiom());
        assert_eq!(rule.target_words(), 0);
        assert_eq!(rule.nonterminals().collect::<Vec<_>>(), vec![x, x]);
    }

    #[test]
    fn test_lexical_rule() {
        let mut vocab = Vocabulary::new();
        let x = vocab.intern("X");
        let src = vocab.intern("maison");
        let tgt = vocab.intern("house");

        let rule = Rule::lexical(x, src, tgt, WeightVector::single("tm_pt_0", 0.5));
        assert!(rule.is_axiom());
        assert_eq!(rule.target_words(), 1);
    }

    #[test]
    fn test_rule_display() {
        let mut vocab = Vocabulary::new();
        let x = vocab.intern("X");
        let de = vocab.intern("de");
        let of = vocab.intern("of");

        let rule = Rule::new(
            x,
            vec![
                SourceToken::Nonterminal(x),
                SourceToken::Word(de),
                SourceToken::Nonterminal(x),
            ],
            vec![TargetToken::Slot(1), TargetToken::Word(of), TargetToken::Slot(0)],
            WeightVector::single("p", 1.0),
        );

        assert_eq!(
            rule.display(&vocab).to_string(),
            "[X] ||| [X,1] de [X,2] ||| [2] of [1] ||| p=1.000"
        );
    }
}
