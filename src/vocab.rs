//! Symbol interning for words and nonterminals.
//!
//! Strings are mapped to dense `u32` ids so that rules, chart cells and
//! language-model states compare and hash symbols in O(1).

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Interned symbol ID.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolId(u32);

impl SymbolId {
    pub fn as_u32(self) -> u32 {
        self.0
    }

    pub(crate) fn from_u32(id: u32) -> Self {
        SymbolId(id)
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Bidirectional string <-> id table.
///
/// Owned by the caller and filled while the grammar and feature functions
/// are built. Decoding only reads it.
#[derive(Debug, Default, Clone)]
pub struct Vocabulary {
    str_to_id: FxHashMap<Box<str>, SymbolId>,
    id_to_str: Vec<Box<str>>,
}

impl Vocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a string, returning its unique ID
    pub fn intern(&mut self, s: &str) -> SymbolId {
        if let Some(&id) = self.str_to_id.get(s) {
            return id;
        }

        let id = SymbolId(self.id_to_str.len() as u32);
        let boxed: Box<str> = s.into();
        self.str_to_id.insert(boxed.clone(), id);
        self.id_to_str.push(boxed);
        id
    }

    /// Look up an already interned string.
    pub fn get(&self, s: &str) -> Option<SymbolId> {
        self.str_to_id.get(s).copied()
    }

    /// Look up the string for an ID
    pub fn resolve(&self, id: SymbolId) -> Option<&str> {
        self.id_to_str.get(id.0 as usize).map(|s| s.as_ref())
    }

    /// Intern every whitespace-separated token of `text`.
    pub fn intern_sentence(&mut self, text: &str) -> Vec<SymbolId> {
        text.split_whitespace().map(|w| self.intern(w)).collect()
    }

    /// Number of interned symbols
    pub fn len(&self) -> usize {
        self.id_to_str.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_str.is_empty()
    }
}
