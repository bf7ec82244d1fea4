//! # Transition keys
//! A [TransitionKey] is the predicate labelling an automaton edge: "this edge
//! is taken for these input symbols". Keys are immutable unions of disjoint,
//! sorted, inclusive ranges over an *extended symbol space*:
//!
//! * the primary code units of the chosen [Encoding] occupy `[0, upper]`;
//! * every named character class owns one synthetic symbol above that;
//! * the unique markers (`eos`, `catch_all`, `no_match`), the ω success
//!   marker and the ε structural marker own one synthetic symbol each.
//!
//! Encoding everything as ranges makes the three central operations uniform:
//! [TransitionKey::disjoint_keys] splits an overlapping key set into a
//! minimal pairwise-disjoint cover, [TransitionKey::merged_key] unions keys
//! that target the same state, and [TransitionKey::inverse_key] complements
//! a key set over the primary range and the class symbols. The derived
//! ordering over the range lists is total and canonical, so every map keyed
//! by [TransitionKey] iterates in the same order on every run.

pub mod encoding;

pub use encoding::{CharClass, Encoding};

use crate::term::Term;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use thiserror::Error;

/// A symbol of the extended symbol space.
pub type Symbol = u32;

/// First synthetic symbol owned by a named character class.
pub(crate) const CLASS_BASE: Symbol = 0x0020_0000;
/// First synthetic symbol owned by a unique marker.
pub(crate) const UNIQUE_BASE: Symbol = 0x0040_0000;
const OMEGA_SYMBOL: Symbol = 0x0040_0100;
const EPSILON_SYMBOL: Symbol = 0x0040_0200;

/// Errors raised while building keys from parsed class bodies.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("unknown character class '{0}'")]
    UnknownClass(String),
    #[error("malformed character class body: {0}")]
    MalformedClass(String),
    #[error("character class matches no symbol: {0}")]
    EmptyClass(String),
    #[error("symbol U+{0:04X} is outside the encoding's primary range")]
    SymbolOutsideEncoding(Symbol),
}

/// The synthetic control markers that do not correspond to input symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UniqueTag {
    Eos,
    CatchAll,
    NoMatch,
}

impl UniqueTag {
    const ALL: [UniqueTag; 3] = [UniqueTag::Eos, UniqueTag::CatchAll, UniqueTag::NoMatch];

    fn symbol(self) -> Symbol {
        UNIQUE_BASE
            + match self {
                UniqueTag::Eos => 0,
                UniqueTag::CatchAll => 1,
                UniqueTag::NoMatch => 2,
            }
    }

    fn from_symbol(symbol: Symbol) -> Option<UniqueTag> {
        Self::ALL
            .into_iter()
            .find(|tag| tag.symbol() == symbol)
    }

    pub fn name(self) -> &'static str {
        match self {
            UniqueTag::Eos => "eos",
            UniqueTag::CatchAll => "catch_all",
            UniqueTag::NoMatch => "no_match",
        }
    }
}

impl fmt::Display for UniqueTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for UniqueTag {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tag| tag.name() == s)
            .ok_or_else(|| KeyError::MalformedClass(s.to_string()))
    }
}

/// An inclusive range of symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolRange {
    pub lo: Symbol,
    pub hi: Symbol,
}

impl SymbolRange {
    pub fn new(lo: Symbol, hi: Symbol) -> Self {
        debug_assert!(lo <= hi, "inverted symbol range");
        SymbolRange { lo, hi }
    }

    pub fn len(&self) -> usize {
        (self.hi - self.lo + 1) as usize
    }

    pub fn contains(&self, symbol: Symbol) -> bool {
        self.lo <= symbol && symbol <= self.hi
    }
}

/// One atom of a key, decoded against an encoding for downstream emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyAtom {
    /// A contiguous range of primary code units.
    PrimaryRange(SymbolRange),
    /// A named character class.
    Class(Rc<str>),
    /// A unique control marker.
    Unique(UniqueTag),
    /// The anonymous success edge.
    Omega,
}

/// A transition predicate; see the [module documentation](crate::key).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransitionKey {
    ranges: Rc<[SymbolRange]>,
}

impl TransitionKey {
    /// Normalizing constructor: sorts the ranges and merges overlapping and
    /// adjacent ones, so that equal predicates compare equal.
    fn from_ranges(mut ranges: Vec<SymbolRange>) -> Self {
        ranges.sort_unstable();
        let mut merged: Vec<SymbolRange> = Vec::with_capacity(ranges.len());
        for range in ranges {
            match merged.last_mut() {
                Some(last) if range.lo <= last.hi.saturating_add(1) => {
                    last.hi = last.hi.max(range.hi);
                }
                _ => merged.push(range),
            }
        }
        TransitionKey {
            ranges: merged.into(),
        }
    }

    /// The structural ε edge; drives NFA construction only.
    pub fn epsilon() -> Self {
        Self::from_ranges(vec![SymbolRange::new(EPSILON_SYMBOL, EPSILON_SYMBOL)])
    }

    /// The anonymous ω edge marking acceptance without consuming input.
    pub fn omega() -> Self {
        Self::from_ranges(vec![SymbolRange::new(OMEGA_SYMBOL, OMEGA_SYMBOL)])
    }

    /// A unique control marker edge.
    pub fn unique(tag: UniqueTag) -> Self {
        Self::from_ranges(vec![SymbolRange::new(tag.symbol(), tag.symbol())])
    }

    /// An edge matching one code unit.
    pub fn single_char(c: Symbol) -> Self {
        debug_assert!(c < CLASS_BASE, "code unit overlaps synthetic symbols");
        Self::from_ranges(vec![SymbolRange::new(c, c)])
    }

    /// An edge matching an inclusive range of code units.
    pub fn range(lo: Symbol, hi: Symbol) -> Self {
        debug_assert!(hi < CLASS_BASE, "code unit overlaps synthetic symbols");
        Self::from_ranges(vec![SymbolRange::new(lo, hi)])
    }

    /// An edge matching every symbol of the encoding's primary range.
    pub fn any(encoding: &Encoding) -> Self {
        Self::from_ranges(vec![encoding.primary_range()])
    }

    /// Builds the key for a parsed `CLASS`/`NOT_CLASS` term whose body is a
    /// `CAT` chain of `LITERAL`, `RANGE` and `CHARACTER_CLASS` atoms. A
    /// negated class is complemented over the primary range and the
    /// encoding's class symbols.
    pub fn character_class(term: &Term, encoding: &Encoding) -> Result<Self, KeyError> {
        let invert = match term.name() {
            "CLASS" => false,
            "NOT_CLASS" => true,
            _ => return Err(KeyError::MalformedClass(term.to_string())),
        };
        let body = term
            .term_arg(0)
            .ok_or_else(|| KeyError::MalformedClass(term.to_string()))?;
        let mut ranges = Vec::new();
        Self::collect_class_atoms(body, encoding, &mut ranges)?;
        let key = Self::from_ranges(ranges);
        if invert {
            Self::inverse_key(encoding, [&key])
                .ok_or_else(|| KeyError::EmptyClass(term.to_string()))
        } else if key.ranges.is_empty() {
            Err(KeyError::EmptyClass(term.to_string()))
        } else {
            Ok(key)
        }
    }

    fn collect_class_atoms(
        term: &Term,
        encoding: &Encoding,
        ranges: &mut Vec<SymbolRange>,
    ) -> Result<(), KeyError> {
        let malformed = || KeyError::MalformedClass(term.to_string());
        match term.name() {
            "CAT" => {
                for idx in 0..2 {
                    let sub = term.term_arg(idx).ok_or_else(malformed)?;
                    Self::collect_class_atoms(sub, encoding, ranges)?;
                }
            }
            "LITERAL" => {
                let s = term.str_arg(0).ok_or_else(malformed)?;
                for c in s.chars() {
                    let symbol = c as Symbol;
                    if symbol > encoding.primary_upper() {
                        return Err(KeyError::SymbolOutsideEncoding(symbol));
                    }
                    ranges.push(SymbolRange::new(symbol, symbol));
                }
            }
            "RANGE" => {
                let lo = term.str_arg(0).and_then(|s| s.chars().next());
                let hi = term.str_arg(1).and_then(|s| s.chars().next());
                match (lo, hi) {
                    (Some(lo), Some(hi)) if lo <= hi => {
                        if hi as Symbol > encoding.primary_upper() {
                            return Err(KeyError::SymbolOutsideEncoding(hi as Symbol));
                        }
                        ranges.push(SymbolRange::new(lo as Symbol, hi as Symbol));
                    }
                    _ => return Err(malformed()),
                }
            }
            "CHARACTER_CLASS" => {
                let name = term.str_arg(0).ok_or_else(malformed)?;
                let idx = encoding
                    .class_index(name)
                    .ok_or_else(|| KeyError::UnknownClass(name.to_string()))?;
                let symbol = encoding.class_symbol(idx);
                ranges.push(SymbolRange::new(symbol, symbol));
            }
            _ => return Err(malformed()),
        }
        Ok(())
    }

    /// Splits a set of possibly overlapping keys into the minimal disjoint
    /// cover: elementary intervals between range endpoints are grouped by the
    /// subset of input keys covering them, so the members are pairwise
    /// non-overlapping and their union equals the input union.
    pub fn disjoint_keys<'a>(
        keys: impl IntoIterator<Item = &'a TransitionKey>,
    ) -> BTreeSet<TransitionKey> {
        let keys: Vec<&TransitionKey> = keys.into_iter().collect();
        let mut bounds = BTreeSet::new();
        for key in &keys {
            for range in key.ranges.iter() {
                bounds.insert(range.lo);
                bounds.insert(range.hi + 1);
            }
        }
        let bounds: Vec<Symbol> = bounds.into_iter().collect();
        let mut groups: BTreeMap<Vec<usize>, Vec<SymbolRange>> = BTreeMap::new();
        for pair in bounds.windows(2) {
            let (lo, hi) = (pair[0], pair[1] - 1);
            // elementary intervals never straddle a range boundary, so
            // membership of the low endpoint decides membership of the whole
            // interval
            let covered_by: Vec<usize> = keys
                .iter()
                .enumerate()
                .filter(|(_, key)| key.matches_char(lo))
                .map(|(idx, _)| idx)
                .collect();
            if !covered_by.is_empty() {
                groups
                    .entry(covered_by)
                    .or_default()
                    .push(SymbolRange::new(lo, hi));
            }
        }
        groups.into_values().map(Self::from_ranges).collect()
    }

    /// The union of a set of keys, used to compress parallel edges that
    /// target the same state into a single edge.
    pub fn merged_key<'a>(keys: impl IntoIterator<Item = &'a TransitionKey>) -> TransitionKey {
        Self::from_ranges(
            keys.into_iter()
                .flat_map(|key| key.ranges.iter().copied())
                .collect(),
        )
    }

    /// The complement of a key set over the primary range and the encoding's
    /// class symbols. Unique markers, ω and ε in the input fall outside that
    /// domain and are ignored. Returns `None` when the complement is empty.
    pub fn inverse_key<'a>(
        encoding: &Encoding,
        keys: impl IntoIterator<Item = &'a TransitionKey>,
    ) -> Option<TransitionKey> {
        let covered = Self::merged_key(keys);
        let mut domain = vec![encoding.primary_range()];
        domain.extend(encoding.class_symbol_range());
        let mut inverse = Vec::new();
        for part in domain {
            let mut cursor = part.lo;
            for range in covered.ranges.iter() {
                if range.hi < part.lo || range.lo > part.hi {
                    continue;
                }
                if range.lo > cursor {
                    inverse.push(SymbolRange::new(cursor, range.lo - 1));
                }
                cursor = cursor.max(range.hi.saturating_add(1));
                if cursor > part.hi {
                    break;
                }
            }
            if cursor <= part.hi {
                inverse.push(SymbolRange::new(cursor, part.hi));
            }
        }
        (!inverse.is_empty()).then(|| Self::from_ranges(inverse))
    }

    pub fn is_epsilon(&self) -> bool {
        self.ranges.len() == 1 && self.ranges[0] == SymbolRange::new(EPSILON_SYMBOL, EPSILON_SYMBOL)
    }

    /// True if this key matches the given symbol.
    pub fn matches_char(&self, symbol: Symbol) -> bool {
        let idx = self.ranges.partition_point(|range| range.hi < symbol);
        self.ranges.get(idx).map_or(false, |range| range.contains(symbol))
    }

    /// True if every symbol matched by `other` is also matched by `self`.
    /// Ranges are normalized (adjacent ones merged), so each range of
    /// `other` must sit inside a single range of `self`.
    pub fn is_superset_of(&self, other: &TransitionKey) -> bool {
        other.ranges.iter().all(|range| {
            let idx = self.ranges.partition_point(|own| own.hi < range.lo);
            self.ranges
                .get(idx)
                .map_or(false, |own| own.lo <= range.lo && range.hi <= own.hi)
        })
    }

    /// Decodes this key into emission atoms: primary ranges stay ranges,
    /// while synthetic symbols turn back into named classes, unique markers
    /// and ω. The ε marker never reaches emission and is rejected in debug
    /// builds.
    pub fn range_iter(&self, encoding: &Encoding) -> impl Iterator<Item = KeyAtom> {
        let mut atoms = Vec::new();
        for range in self.ranges.iter() {
            let mut lo = range.lo;
            while lo <= range.hi {
                if lo <= encoding.primary_upper() {
                    let hi = range.hi.min(encoding.primary_upper());
                    atoms.push(KeyAtom::PrimaryRange(SymbolRange::new(lo, hi)));
                    lo = hi + 1;
                } else if let Some(class) = encoding.class_at(lo) {
                    atoms.push(KeyAtom::Class(Rc::from(class.name())));
                    lo += 1;
                } else if let Some(tag) = UniqueTag::from_symbol(lo) {
                    atoms.push(KeyAtom::Unique(tag));
                    lo += 1;
                } else if lo == OMEGA_SYMBOL {
                    atoms.push(KeyAtom::Omega);
                    lo += 1;
                } else {
                    debug_assert!(
                        lo != EPSILON_SYMBOL,
                        "epsilon edge survived to emission"
                    );
                    debug_assert!(false, "symbol {lo:#x} outside encoding");
                    lo += 1;
                }
            }
        }
        atoms.into_iter()
    }
}

impl fmt::Display for TransitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn symbol(f: &mut fmt::Formatter<'_>, s: Symbol) -> fmt::Result {
            if s == EPSILON_SYMBOL {
                write!(f, "ε")
            } else if s == OMEGA_SYMBOL {
                write!(f, "ω")
            } else if let Some(tag) = UniqueTag::from_symbol(s) {
                write!(f, "{tag}")
            } else if s >= CLASS_BASE {
                write!(f, "class#{}", s - CLASS_BASE)
            } else if (0x21..0x7F).contains(&s) {
                write!(f, "{}", char::from_u32(s).expect("printable ascii"))
            } else {
                write!(f, "U+{s:04X}")
            }
        }
        write!(f, "{{")?;
        for (idx, range) in self.ranges.iter().enumerate() {
            if idx > 0 {
                write!(f, " ")?;
            }
            symbol(f, range.lo)?;
            if range.hi != range.lo {
                write!(f, "-")?;
                symbol(f, range.hi)?;
            }
        }
        write!(f, "}}")
    }
}
