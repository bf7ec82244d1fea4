//! # Deterministic finite automaton
//! The DFA produced by the subset construction: one target per disjoint
//! transition key, one (dominant) action per state, and a terminal flag per
//! state. Parallel edges to the same target are compressed into a single
//! merged key at construction time, so every state's transition map is both
//! disjoint and minimal in key count.
//!
//! The automaton is immutable once built. [Dfa::minimize] never mutates its
//! input; it returns either an equivalent copy (when the automaton is
//! already minimal) or a freshly constructed, smaller one.

pub mod minimize;

pub use minimize::DfaMinimizer;

use crate::key::{Symbol, TransitionKey};
use crate::term::{Action, ActionConflict};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DfaError {
    /// The automaton has no terminal state, so it accepts nothing.
    #[error("empty automaton: no terminal state")]
    EmptyAutomaton,
    #[error(transparent)]
    ActionConflict(#[from] ActionConflict),
}

/// One DFA state: a disjoint transition map, a terminal flag and the
/// dominant action of the NFA subset it was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DfaState {
    transitions: BTreeMap<TransitionKey, usize>,
    terminal: bool,
    action: Action,
}

impl DfaState {
    pub(crate) fn new(
        transitions: BTreeMap<TransitionKey, usize>,
        terminal: bool,
        action: Action,
    ) -> Self {
        DfaState {
            transitions,
            terminal,
            action,
        }
    }

    pub fn transitions(&self) -> &BTreeMap<TransitionKey, usize> {
        &self.transitions
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    /// The target for one input symbol; at most one key can match since the
    /// key set is disjoint.
    pub fn char_matches(&self, symbol: Symbol) -> Option<usize> {
        let mut matches = self
            .transitions
            .iter()
            .filter(|(key, _)| key.matches_char(symbol))
            .map(|(_, &target)| target);
        let first = matches.next();
        debug_assert!(matches.next().is_none(), "transition keys overlap");
        first
    }

    /// The target for a whole key; at most one of the state's keys can be a
    /// superset of a disjoint-cover key.
    pub fn key_matches(&self, key: &TransitionKey) -> Option<usize> {
        let mut matches = self
            .transitions
            .iter()
            .filter(|(own, _)| own.is_superset_of(key))
            .map(|(_, &target)| target);
        let first = matches.next();
        debug_assert!(matches.next().is_none(), "transition keys overlap");
        first
    }
}

/// An immutable DFA with a designated start state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dfa {
    states: Vec<DfaState>,
    start: usize,
}

impl Dfa {
    pub(crate) fn new(states: Vec<DfaState>, start: usize) -> Result<Self, DfaError> {
        if !states.iter().any(DfaState::is_terminal) {
            return Err(DfaError::EmptyAutomaton);
        }
        Ok(Dfa { states, start })
    }

    pub fn states(&self) -> &[DfaState] {
        &self.states
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn node_count(&self) -> usize {
        self.states.len()
    }

    /// The indices of all terminal states.
    pub fn terminal_set(&self) -> impl Iterator<Item = usize> + '_ {
        self.states
            .iter()
            .enumerate()
            .filter(|(_, state)| state.terminal)
            .map(|(idx, _)| idx)
    }

    /// Whether the automaton accepts the string. ω edges are followed after
    /// the input is exhausted, mirroring [Nfa::matches](crate::nfa::Nfa).
    pub fn matches(&self, input: &str) -> bool {
        let mut state = self.start;
        for c in input.chars() {
            match self.states[state].char_matches(c as Symbol) {
                Some(next) => state = next,
                None => return false,
            }
        }
        let omega = TransitionKey::omega();
        let mut hops = 0;
        while !self.states[state].terminal {
            match self.states[state].key_matches(&omega) {
                Some(next) => state = next,
                None => break,
            }
            hops += 1;
            if hops > self.states.len() {
                break;
            }
        }
        self.states[state].terminal
    }

    /// The action of the accept state the string ends in, resolved through
    /// the ω chain; `None` when the string does not match or the accept
    /// state carries no action.
    pub fn matched_action(&self, input: &str) -> Option<&Action> {
        let mut state = self.start;
        for c in input.chars() {
            state = self.states[state].char_matches(c as Symbol)?;
        }
        let omega = TransitionKey::omega();
        let mut hops = 0;
        loop {
            if !self.states[state].action.is_empty() {
                return Some(&self.states[state].action);
            }
            state = self.states[state].key_matches(&omega)?;
            hops += 1;
            if hops > self.states.len() {
                return None;
            }
        }
    }

    /// Hopcroft minimization; see [DfaMinimizer].
    pub fn minimize(&self) -> Dfa {
        DfaMinimizer::new(self).minimize()
    }
}
