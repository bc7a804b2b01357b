//! End-to-end decoding scenarios and cell properties.

use crate::cell::{Cell, PruningBounds, SuperItem};
use crate::config::DecoderConfig;
use crate::decoder::Decoder;
use crate::error::DecodeError;
use crate::ff::lm::{BOS, EOS};
use crate::ff::{FeatureFunctions, LanguageModelFeature, NgramTable, PhraseModel, WordPenalty};
use crate::forest::{Signature, Span};
use crate::grammar::MemoryGrammar;
use crate::rule::{Rule, SourceToken, TargetToken};
use crate::testing::{axiom, binary_rule, inverted_rule, Fixture, Forgetful, RuleCost};
use crate::vocab::{SymbolId, Vocabulary};
use crate::weights::{FeatureRegistry, WeightVector};
use proptest::prelude::*;
use rustc_hash::FxHashMap;

/// French-to-English toy with one reordering rule and a bigram LM that
/// prefers "blue house".
fn reordering_decoder(vocab: &mut Vocabulary, config: DecoderConfig) -> Decoder<MemoryGrammar> {
    let s = vocab.intern("S");
    let x = vocab.intern("X");
    let words: Vec<SymbolId> = ["maison", "bleue", "house", "blue"]
        .iter()
        .map(|w| vocab.intern(w))
        .collect();
    let (maison, bleue, house, blue) = (words[0], words[1], words[2], words[3]);

    let tm = |cost: f64| WeightVector::single("tm_pt_0", cost);
    let pair = vec![SourceToken::Nonterminal(x), SourceToken::Nonterminal(x)];
    let mut grammar = MemoryGrammar::default();
    grammar.add_rule(Rule::lexical(x, maison, house, tm(0.5)));
    grammar.add_rule(Rule::lexical(x, bleue, blue, tm(0.5)));
    grammar.add_rule(Rule::new(
        x,
        pair.clone(),
        vec![TargetToken::Slot(0), TargetToken::Slot(1)],
        tm(0.0),
    ));
    grammar.add_rule(Rule::new(
        x,
        pair,
        vec![TargetToken::Slot(1), TargetToken::Slot(0)],
        tm(0.3),
    ));
    grammar.add_glue_rule(Rule::new(
        s,
        vec![SourceToken::Nonterminal(x)],
        vec![TargetToken::Slot(0)],
        WeightVector::new(),
    ));
    grammar.add_glue_rule(Rule::new(
        s,
        vec![SourceToken::Nonterminal(s), SourceToken::Nonterminal(x)],
        vec![TargetToken::Slot(0), TargetToken::Slot(1)],
        WeightVector::new(),
    ));

    let bos = vocab.intern(BOS);
    let eos = vocab.intern(EOS);
    let mut lm = NgramTable::new(2, 10.0);
    for (ngram, cost) in [
        (vec![house], 1.0),
        (vec![blue], 1.0),
        (vec![eos], 1.0),
        (vec![bos, blue], 0.1),
        (vec![blue, house], 0.1),
        (vec![house, eos], 0.1),
        (vec![bos, house], 1.0),
        (vec![house, blue], 2.0),
        (vec![blue, eos], 2.0),
    ] {
        lm.insert(&ngram, cost);
    }

    let mut registry = FeatureRegistry::new();
    let pt = PhraseModel::new(&mut registry, "pt", 0).unwrap();
    let wp = WordPenalty::new(&mut registry).unwrap();
    let lm = LanguageModelFeature::new(&mut registry, vocab, "lm_0", lm).unwrap();
    let models = FeatureFunctions::new(registry)
        .with(pt, 1.0)
        .with(wp, 1.0)
        .with(lm, 1.0);

    Decoder::new(grammar, models, vocab, config).unwrap()
}

/// Spans and rules of the best derivation, for structural comparison.
fn best_structure(graph: &crate::hypergraph::HyperGraph) -> Vec<(Span, Option<Rule>)> {
    let mut out = Vec::new();
    graph.walk_best(|id, edge| {
        out.push((graph.node(id).span(), edge.rule().map(|r| (**r).clone())));
    });
    out
}

#[test_log::test]
fn test_language_model_picks_reordering() {
    let mut vocab = Vocabulary::new();
    let decoder = reordering_decoder(&mut vocab, DecoderConfig::default());
    let sentence = vocab.intern_sentence("maison bleue");

    let graph = decoder.decode(&sentence).unwrap();
    let inverted = graph
        .best_rules()
        .iter()
        .any(|r| r.target == [TargetToken::Slot(1), TargetToken::Slot(0)]);
    assert!(inverted);

    // tm 0.5 + 0.5 + 0.3, LM <s> blue, blue house, house </s>, two words.
    let expected = 1.3 + 0.3 + 2.0 * std::f64::consts::LOG10_E;
    assert!((graph.best_cost() - expected).abs() < 1e-9);
    let features = graph.viterbi_features();
    assert!((features.get("tm_pt_0") - 1.3).abs() < 1e-12);
}

#[test_log::test]
fn test_decode_is_deterministic() {
    let mut vocab = Vocabulary::new();
    let decoder = reordering_decoder(&mut vocab, DecoderConfig::default());
    let sentence = vocab.intern_sentence("maison bleue maison");

    let first = decoder.decode(&sentence).unwrap();
    let second = decoder.decode(&sentence).unwrap();
    assert_eq!(first.best_cost(), second.best_cost());
    assert_eq!(best_structure(&first), best_structure(&second));

    let batch = decoder.decode_batch(&[sentence.clone(), sentence]);
    for graph in batch {
        let graph = graph.unwrap();
        assert_eq!(graph.best_cost(), first.best_cost());
        assert_eq!(best_structure(&graph), best_structure(&first));
    }
}

#[test]
fn test_cube_and_exhaustive_agree_end_to_end() {
    let mut vocab = Vocabulary::new();
    let decoder = reordering_decoder(&mut vocab, DecoderConfig::unbounded());
    let sentence = vocab.intern_sentence("bleue maison bleue");
    let cube = decoder.decode(&sentence).unwrap();

    let mut vocab = Vocabulary::new();
    let config = DecoderConfig {
        use_cube_pruning: false,
        ..DecoderConfig::unbounded()
    };
    let exhaustive = reordering_decoder(&mut vocab, config);
    let sentence = vocab.intern_sentence("bleue maison bleue");
    let full = exhaustive.decode(&sentence).unwrap();

    assert!((cube.best_cost() - full.best_cost()).abs() < 1e-9);
}

#[test]
fn test_missing_state_aborts_decode() {
    let mut vocab = Vocabulary::new();
    let s = vocab.intern("S");
    let a = vocab.intern("a");
    let mut grammar = MemoryGrammar::default();
    grammar.add_rule(Rule::lexical(s, a, a, WeightVector::single("cost", 1.0)));

    let mut registry = FeatureRegistry::new();
    let cost = RuleCost::new(&mut registry);
    let forgetful = Forgetful::new(&mut registry);
    let models = FeatureFunctions::new(registry)
        .with(cost, 1.0)
        .with(forgetful, 1.0);
    let decoder = Decoder::new(grammar, models, &vocab, DecoderConfig::default()).unwrap();

    let result = decoder.decode(&[a]);
    assert!(matches!(
        result,
        Err(DecodeError::MissingState { ref component, .. }) if component == "forgetful"
    ));
}

#[test]
fn test_goal_collapse_of_two_derivations() {
    // Two S derivations of the whole input with different first words.
    let mut fx = Fixture::new();
    let left = axiom(&mut fx.vocab, "X", "a", 1.5);
    let right = axiom(&mut fx.vocab, "X", "b", 1.0);
    let straight = binary_rule(&mut fx.vocab, "S", "X", "X", 1.5);
    let inverted = inverted_rule(&mut fx.vocab, "S", "X", "X", 0.0);
    let x = fx.vocab.get("X").unwrap();
    let s = fx.vocab.get("S").unwrap();

    let mut l = Cell::new(Span::new(0, 1), PruningBounds::default());
    let mut r = Cell::new(Span::new(1, 2), PruningBounds::default());
    let mut top = Cell::new(Span::new(0, 2), PruningBounds::default());
    let mut goal_cell = Cell::new(Span::new(0, 2), PruningBounds::default());
    let mut ctx = fx.context();
    l.seed_axiom(&mut ctx, &left, 0.0).unwrap();
    r.seed_axiom(&mut ctx, &right, 0.0).unwrap();
    l.sorted_super_items(ctx.forest);
    r.sorted_super_items(ctx.forest);
    let items = [l.super_item(x).unwrap(), r.super_item(x).unwrap()];
    top.combine_exhaustively(&mut ctx, &items, &[straight, inverted], 2, 0.0)
        .unwrap();
    assert_eq!(top.len(), 2);

    let goal = goal_cell.finalize_goal(&mut ctx, &mut top, s).unwrap();
    let node = fx.forest.node(goal);
    assert_eq!(node.best_cost(), 2.5);
    assert_eq!(node.edges().len(), 2);
    let mut costs: Vec<f64> = node
        .edges()
        .iter()
        .map(|&e| fx.forest.edge(e).best_cost())
        .collect();
    costs.sort_by(f64::total_cmp);
    assert_eq!(costs, vec![2.5, 4.0]);
}

/// Best cost per signature over the live nodes of `cell`.
fn best_by_signature(cell: &mut Cell, fx: &Fixture) -> FxHashMap<Signature, f64> {
    cell.sorted_nodes(&fx.forest)
        .iter()
        .map(|&n| {
            let node = fx.forest.node(n);
            (node.signature().clone(), node.best_cost())
        })
        .collect()
}

proptest! {
    /// The live set never exceeds the beam and the cutoff never widens.
    #[test]
    fn prop_beam_bound_and_monotone_cutoff(
        beam_width in 1usize..6,
        relative_threshold in 0.5f64..15.0,
        candidates in prop::collection::vec((0usize..8, 0.0f64..20.0), 1..40),
    ) {
        let mut fx = Fixture::new();
        let rules: Vec<_> = candidates
            .iter()
            .map(|&(w, cost)| axiom(&mut fx.vocab, "X", &format!("w{}", w), cost))
            .collect();
        let bounds = PruningBounds {
            beam_width,
            relative_threshold,
            ..PruningBounds::default()
        };
        let mut cell = Cell::new(Span::new(0, 1), bounds);
        let mut ctx = fx.context();

        let mut cutoff = cell.cutoff();
        for rule in &rules {
            cell.seed_axiom(&mut ctx, rule, 0.0).unwrap();
            prop_assert!(cell.len() <= beam_width);
            prop_assert!(cell.cutoff() <= cutoff);
            cutoff = cell.cutoff();
        }
        let cutoff = cell.cutoff();
        for &n in cell.sorted_nodes(ctx.forest) {
            prop_assert!(ctx.forest.node(n).est_cost() < cutoff);
        }
    }

    /// Equal signatures collapse into one node holding the cheapest edge
    /// and every contributing edge.
    #[test]
    fn prop_merge_keeps_minimum_and_all_edges(costs in prop::collection::vec(0.0f64..50.0, 1..12)) {
        let mut fx = Fixture::new();
        let rules: Vec<_> = costs
            .iter()
            .map(|&cost| axiom(&mut fx.vocab, "X", "same", cost))
            .collect();
        let bounds = PruningBounds {
            beam_width: 100,
            relative_threshold: 1000.0,
            ..PruningBounds::default()
        };
        let mut cell = Cell::new(Span::new(0, 1), bounds);
        let mut ctx = fx.context();
        for rule in &rules {
            cell.seed_axiom(&mut ctx, rule, 0.0).unwrap();
        }

        prop_assert_eq!(cell.len(), 1);
        let forest = &fx.forest;
        let node = forest.node(cell.sorted_nodes(forest)[0]);
        let min = costs.iter().copied().fold(f64::INFINITY, f64::min);
        prop_assert_eq!(node.best_cost(), min);
        prop_assert_eq!(node.edges().len(), costs.len());
    }

    /// Without bounds, cube pruning reaches the same best cost for every
    /// signature as full enumeration: 3 binary rules over 2 groups of 3.
    #[test]
    fn prop_cube_matches_exhaustive_unbounded(
        left_costs in prop::array::uniform3(0.0f64..10.0),
        right_costs in prop::array::uniform3(0.0f64..10.0),
        rule_costs in prop::array::uniform3(0.0f64..10.0),
    ) {
        let mut fx = Fixture::new();
        let left: Vec<_> = left_costs
            .iter()
            .enumerate()
            .map(|(i, &c)| axiom(&mut fx.vocab, "X", &format!("l{}", i), c))
            .collect();
        let right: Vec<_> = right_costs
            .iter()
            .enumerate()
            .map(|(i, &c)| axiom(&mut fx.vocab, "X", &format!("r{}", i), c))
            .collect();
        let mut rules = vec![
            binary_rule(&mut fx.vocab, "X", "X", "X", rule_costs[0]),
            inverted_rule(&mut fx.vocab, "X", "X", "X", rule_costs[1]),
            binary_rule(&mut fx.vocab, "Y", "X", "X", rule_costs[2]),
        ];
        rules.sort_by(|a, b| a.features.get("cost").total_cmp(&b.features.get("cost")));
        let x = fx.vocab.get("X").unwrap();

        let unbounded = PruningBounds::from(&DecoderConfig::unbounded());
        let mut l = Cell::new(Span::new(0, 1), unbounded);
        let mut r = Cell::new(Span::new(1, 2), unbounded);
        let mut cube = Cell::new(Span::new(0, 2), unbounded);
        let mut full = Cell::new(Span::new(0, 2), unbounded);
        {
            let mut ctx = fx.context();
            for rule in &left {
                l.seed_axiom(&mut ctx, rule, 0.0).unwrap();
            }
            for rule in &right {
                r.seed_axiom(&mut ctx, rule, 0.0).unwrap();
            }
            l.sorted_super_items(ctx.forest);
            r.sorted_super_items(ctx.forest);
            let items: [&SuperItem; 2] = [l.super_item(x).unwrap(), r.super_item(x).unwrap()];
            cube.combine_with_cube_pruning(&mut ctx, &items, &rules, 0.0).unwrap();
            full.combine_exhaustively(&mut ctx, &items, &rules, 2, 0.0).unwrap();
        }

        prop_assert_eq!(best_by_signature(&mut cube, &fx), best_by_signature(&mut full, &fx));
    }

    /// Weights read back in registration order exactly as set.
    #[test]
    fn prop_weights_round_trip(weights in prop::collection::vec(-100.0f64..100.0, 1..8)) {
        let mut registry = FeatureRegistry::new();
        let phrase_models: Vec<_> = (0..weights.len())
            .map(|column| PhraseModel::new(&mut registry, "pt", column).unwrap())
            .collect();
        let mut models = FeatureFunctions::new(registry);
        for model in phrase_models {
            models.push(Box::new(model), 0.0);
        }

        models.set_weights(&weights).unwrap();
        prop_assert_eq!(models.weights(), weights.clone());
        for (i, &w) in weights.iter().enumerate() {
            prop_assert_eq!(models.weight(i), Some(w));
        }
    }
}
