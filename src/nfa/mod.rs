//! # Nondeterministic finite automaton
//! The NFA is the intermediate form between the rule front end and the DFA.
//! States live in an arena indexed by small integers and are *open* while the
//! [builder](crate::nfa::NfaBuilder) is wiring them up: an open state can
//! carry transitions whose target is not yet known, to be filled in when the
//! surrounding construction closes it onto its continuation. After the build
//! every state is closed, its ε-closure is frozen, and the automaton is
//! immutable.
//!
//! [Nfa::to_dfa] runs the subset construction: subsets of NFA states become
//! DFA states, keyed by their sorted id vectors; the outgoing keys of a
//! subset are split into a disjoint cover, and the action of a subset is the
//! dominant one among its members (a tie between different actions at one
//! precedence aborts with an action conflict).

pub mod builder;

pub use builder::{BuildError, NfaBuilder};

use crate::dfa::{Dfa, DfaError, DfaState};
use crate::key::{Symbol, TransitionKey};
use crate::term::Action;
use itertools::Itertools;
use log::debug;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

/// A state of the NFA arena. Open during construction, closed and frozen
/// afterwards.
#[derive(Debug, Clone)]
pub struct NfaState {
    transitions: BTreeMap<TransitionKey, BTreeSet<usize>>,
    unclosed: Option<BTreeSet<TransitionKey>>,
    action: Action,
    epsilon_closure: Vec<usize>,
}

impl NfaState {
    fn new_open() -> Self {
        NfaState {
            transitions: BTreeMap::new(),
            unclosed: Some(BTreeSet::new()),
            action: Action::empty(),
            epsilon_closure: Vec::new(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.unclosed.is_none()
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    pub fn transitions(&self) -> &BTreeMap<TransitionKey, BTreeSet<usize>> {
        &self.transitions
    }

    /// The states reachable from this one over ε edges, this one included.
    /// Frozen once the automaton is built.
    pub fn epsilon_closure(&self) -> &[usize] {
        &self.epsilon_closure
    }

    fn add_transition(&mut self, key: TransitionKey, target: usize) {
        self.transitions.entry(key).or_default().insert(target);
    }

    fn add_epsilon_transition(&mut self, target: usize) {
        self.add_transition(TransitionKey::epsilon(), target);
    }

    /// Records a transition whose target is patched in later, when this
    /// state closes.
    fn add_unclosed_transition(&mut self, key: TransitionKey) {
        debug_assert!(!key.is_epsilon(), "epsilon transitions always have a target");
        self.unclosed
            .as_mut()
            .expect("state already closed")
            .insert(key);
    }

    fn set_action(&mut self, action: Action) {
        debug_assert!(!self.is_closed(), "action set after closing");
        debug_assert!(self.action.is_empty(), "action set twice");
        self.action = action;
    }

    /// Closes the state: every open transition is pointed at `target`, and a
    /// state with no open transitions gains an ε edge there instead. Closing
    /// with no target is only legal when nothing is open.
    fn close(&mut self, target: Option<usize>) {
        let unclosed = self.unclosed.take().expect("state closed twice");
        match target {
            None => debug_assert!(unclosed.is_empty(), "dangling open transitions"),
            Some(target) => {
                if unclosed.is_empty() {
                    self.add_epsilon_transition(target);
                } else {
                    for key in unclosed {
                        self.add_transition(key, target);
                    }
                }
            }
        }
    }

    fn char_matches(&self, symbol: Symbol) -> BTreeSet<usize> {
        self.transitions
            .iter()
            .filter(|(key, _)| key.matches_char(symbol))
            .flat_map(|(_, targets)| targets.iter().copied())
            .collect()
    }

    fn key_matches(&self, key: &TransitionKey) -> BTreeSet<usize> {
        self.transitions
            .iter()
            .filter(|(own, _)| own.is_superset_of(key))
            .flat_map(|(_, targets)| targets.iter().copied())
            .collect()
    }
}

/// An immutable NFA: a state arena, a start state and the single end state
/// marking acceptance.
#[derive(Debug, Clone)]
pub struct Nfa {
    states: Vec<NfaState>,
    start: usize,
    end: usize,
}

impl Nfa {
    pub fn node_count(&self) -> usize {
        self.states.len()
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn states(&self) -> &[NfaState] {
        &self.states
    }

    fn close_set(&self, states: impl IntoIterator<Item = usize>) -> BTreeSet<usize> {
        let mut closed = BTreeSet::new();
        for state in states {
            closed.extend(self.states[state].epsilon_closure.iter().copied());
        }
        closed
    }

    /// Whether the automaton accepts the string, by direct closure stepping.
    /// Mostly useful for testing the pipeline's stages against each other.
    /// ω edges are followed freely once the input is exhausted, since they
    /// mark acceptance without consuming a symbol.
    pub fn matches(&self, input: &str) -> bool {
        let mut current = self.close_set([self.start]);
        for c in input.chars() {
            let mut moved = BTreeSet::new();
            for &state in &current {
                moved.extend(self.states[state].char_matches(c as Symbol));
            }
            if moved.is_empty() {
                return false;
            }
            current = self.close_set(moved);
        }
        let omega = TransitionKey::omega();
        loop {
            let mut moved = BTreeSet::new();
            for &state in &current {
                moved.extend(self.states[state].key_matches(&omega));
            }
            let reached = self.close_set(moved);
            if reached.is_subset(&current) {
                break;
            }
            current.extend(reached);
        }
        current.contains(&self.end)
    }

    /// The subset construction. Subsets are memoized by their sorted member
    /// ids; each subset's outgoing keys are replaced by their disjoint cover,
    /// its action is the dominant one of its members, and it is terminal iff
    /// it contains the NFA end state.
    pub fn to_dfa(&self) -> Result<Dfa, DfaError> {
        struct Subsets {
            ids: HashMap<Vec<usize>, usize>,
            transitions: Vec<BTreeMap<TransitionKey, usize>>,
            terminal: Vec<bool>,
            actions: Vec<Action>,
            queue: VecDeque<(usize, Vec<usize>)>,
        }

        impl Subsets {
            fn intern(&mut self, subset: Vec<usize>) -> usize {
                match self.ids.get(&subset) {
                    Some(&id) => id,
                    None => {
                        let id = self.transitions.len();
                        self.transitions.push(BTreeMap::new());
                        self.terminal.push(false);
                        self.actions.push(Action::empty());
                        self.ids.insert(subset.clone(), id);
                        self.queue.push_back((id, subset));
                        id
                    }
                }
            }
        }

        let mut subsets = Subsets {
            ids: HashMap::new(),
            transitions: Vec::new(),
            terminal: Vec::new(),
            actions: Vec::new(),
            queue: VecDeque::new(),
        };

        let seed: Vec<usize> = self.close_set([self.start]).into_iter().collect();
        subsets.intern(seed);

        while let Some((id, subset)) = subsets.queue.pop_front() {
            let keys: BTreeSet<&TransitionKey> = subset
                .iter()
                .flat_map(|&state| self.states[state].transitions.keys())
                .filter(|key| !key.is_epsilon())
                .collect();
            let cover = TransitionKey::disjoint_keys(keys.into_iter());

            let mut out = BTreeMap::new();
            for key in cover {
                let mut moved = BTreeSet::new();
                for &state in &subset {
                    moved.extend(self.states[state].key_matches(&key));
                }
                debug_assert!(!moved.is_empty(), "cover key with no move set");
                let target: Vec<usize> = self.close_set(moved).into_iter().collect();
                let target_id = subsets.intern(target);
                out.insert(key, target_id);
            }

            subsets.transitions[id] = out;
            subsets.terminal[id] = subset.binary_search(&self.end).is_ok();
            subsets.actions[id] =
                Action::dominant(subset.iter().map(|&state| &self.states[state].action))?;
        }

        debug!(
            "subset construction: {} nfa states -> {} dfa states",
            self.states.len(),
            subsets.transitions.len()
        );

        // compress parallel edges: all keys leading to one target merge into
        // a single key
        let states: Vec<DfaState> = subsets
            .transitions
            .into_iter()
            .zip(subsets.terminal)
            .zip(subsets.actions)
            .map(|((keyed, terminal), action)| {
                let grouped = keyed
                    .into_iter()
                    .map(|(key, target)| (target, key))
                    .into_group_map();
                let merged: BTreeMap<TransitionKey, usize> = grouped
                    .into_iter()
                    .map(|(target, keys)| (TransitionKey::merged_key(keys.iter()), target))
                    .collect();
                DfaState::new(merged, terminal, action)
            })
            .collect();
        Dfa::new(states, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Encoding;
    use crate::parser;

    fn nfa_of(pattern: &str) -> Nfa {
        let term = parser::regex(pattern).unwrap();
        NfaBuilder::new(Encoding::latin1()).build(&term).unwrap()
    }

    #[test]
    fn all_states_closed_after_build() {
        let nfa = nfa_of("a(b|c)*d{2,3}");
        assert!(nfa.states().iter().all(NfaState::is_closed));
    }

    #[test]
    fn closure_stepping_matches() {
        let nfa = nfa_of("a*b");
        assert!(nfa.matches("b"));
        assert!(nfa.matches("aaab"));
        assert!(!nfa.matches("a"));
        assert!(!nfa.matches(""));
    }

    #[test]
    fn subset_construction_agrees_with_nfa() {
        for (pattern, inputs) in [
            ("a|b", vec!["a", "b", "ab", ""]),
            ("a+b", vec!["ab", "aab", "b", ""]),
            ("(ab)*", vec!["", "ab", "abab", "aba"]),
        ] {
            let nfa = nfa_of(pattern);
            let dfa = nfa.to_dfa().unwrap();
            for input in inputs {
                assert_eq!(
                    nfa.matches(input),
                    dfa.matches(input),
                    "{pattern} disagrees on {input:?}"
                );
            }
        }
    }

    #[test]
    fn dfa_keys_are_merged_per_target() {
        // a|b from one state: both chars lead to the same subset, so the
        // constructed DFA holds a single merged key
        let dfa = nfa_of("a|b").to_dfa().unwrap();
        let start = &dfa.states()[dfa.start()];
        assert_eq!(start.transitions().len(), 1);
        let (key, _) = start.transitions().iter().next().unwrap();
        assert!(key.matches_char(b'a' as u32));
        assert!(key.matches_char(b'b' as u32));
    }
}
