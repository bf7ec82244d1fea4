//! Thompson-style NFA construction over the operator [Term] vocabulary,
//! extended with named subgraphs (lexer states joined into the graph),
//! continues (loops back to a subgraph's start) and prioritized actions.
//!
//! Every sub-construction returns `(start, ends)`: the entry state and the
//! list of states whose open transitions are still waiting for the
//! continuation. `patch_ends` closes them onto a target. Scopes track one
//! lexer state each: the lazily created placeholder that `continue` loops
//! into, and the subgraphs already built for joins from this scope.

use crate::key::{Encoding, KeyError, TransitionKey, UniqueTag};
use crate::nfa::{Nfa, NfaState};
use crate::rules::RuleSet;
use crate::term::{Action, Term};
use std::collections::HashMap;
use std::rc::Rc;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("subgraph '{0}' joins back into itself")]
    RecursiveSubgraph(String),
    #[error("subgraph '{0}' is not defined")]
    UnknownSubgraph(String),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error("symbol U+{0:04X} is outside the primary range of encoding '{1}'")]
    SymbolOutsideEncoding(u32, String),
    #[error("repeat bounds {{{0},{1}}} are inverted")]
    MalformedRepeat(u32, u32),
    #[error("malformed graph term: {0}")]
    MalformedTerm(String),
}

#[derive(Default)]
struct Scope {
    start_node: Option<usize>,
    subgraphs: HashMap<Rc<str>, (usize, usize)>,
}

/// Builds an [Nfa] from an operator term, resolving `JOIN`s against a
/// [RuleSet] when one is attached. A builder is single-use.
pub struct NfaBuilder<'a> {
    encoding: &'a Encoding,
    rules: Option<&'a RuleSet>,
    states: Vec<NfaState>,
    scopes: Vec<Scope>,
    building: Vec<Rc<str>>,
}

impl<'a> NfaBuilder<'a> {
    pub fn new(encoding: &'a Encoding) -> Self {
        NfaBuilder {
            encoding,
            rules: None,
            states: Vec::new(),
            scopes: Vec::new(),
            building: Vec::new(),
        }
    }

    pub fn with_rules(encoding: &'a Encoding, rules: &'a RuleSet) -> Self {
        NfaBuilder {
            rules: Some(rules),
            ..Self::new(encoding)
        }
    }

    /// Builds the automaton for a bare graph term (no lexer state context).
    pub fn build(mut self, graph: &Term) -> Result<Nfa, BuildError> {
        self.finish(graph)
    }

    /// Builds the automaton of a named lexer state, joining other states in
    /// as its rules demand.
    pub fn build_state(mut self, name: &str) -> Result<Nfa, BuildError> {
        let graph = self
            .rules
            .and_then(|rules| rules.state_graph(name))
            .ok_or_else(|| BuildError::UnknownSubgraph(name.to_string()))?;
        self.building.push(Rc::from(name));
        self.finish(&graph)
    }

    fn finish(&mut self, graph: &Term) -> Result<Nfa, BuildError> {
        let (start, end) = self.build_nfa(graph)?;
        self.states[end].close(None);
        self.compute_epsilon_closures();
        self.replace_catch_all();
        debug_assert!(
            self.states.iter().all(NfaState::is_closed),
            "unclosed state after construction"
        );
        Ok(Nfa {
            states: std::mem::take(&mut self.states),
            start,
            end,
        })
    }

    fn new_state(&mut self) -> usize {
        self.states.push(NfaState::new_open());
        self.states.len() - 1
    }

    fn key_state(&mut self, key: TransitionKey) -> (usize, Vec<usize>) {
        let state = self.new_state();
        self.states[state].add_unclosed_transition(key);
        (state, vec![state])
    }

    fn patch_ends(&mut self, ends: &[usize], target: usize) {
        for &end in ends {
            self.states[end].close(Some(target));
        }
    }

    /// One scope per lexer state: builds the graph, wires the continue
    /// placeholder in front of the start, closes the scope's subgraph ends
    /// and funnels all loose ends into a fresh end state.
    fn build_nfa(&mut self, graph: &Term) -> Result<(usize, usize), BuildError> {
        self.scopes.push(Scope::default());
        let (mut start, ends) = self.process(graph)?;
        let scope = self.scopes.pop().expect("scope pushed above");
        if let Some(placeholder) = scope.start_node {
            self.states[placeholder].close(Some(start));
            start = placeholder;
        }
        for (_, (_, subgraph_end)) in scope.subgraphs {
            self.states[subgraph_end].close(None);
        }
        let end = self.new_state();
        self.patch_ends(&ends, end);
        Ok((start, end))
    }

    fn process(&mut self, term: &Term) -> Result<(usize, Vec<usize>), BuildError> {
        match term.name() {
            "LITERAL" => self.literal(self.str_of(term, 0)?),
            "CLASS" | "NOT_CLASS" => {
                let key = TransitionKey::character_class(term, self.encoding)?;
                Ok(self.key_state(key))
            }
            "ANY" => Ok(self.key_state(TransitionKey::any(self.encoding))),
            "UNIQUE_KEY" => {
                let tag: UniqueTag = self.str_of(term, 0)?.parse()?;
                Ok(self.key_state(TransitionKey::unique(tag)))
            }
            "EPSILON" => Ok(self.epsilon_graph()),
            "CAT" => {
                let (start, ends) = self.process(self.child(term, 0)?)?;
                let (right_start, right_ends) = self.process(self.child(term, 1)?)?;
                self.patch_ends(&ends, right_start);
                Ok((start, right_ends))
            }
            "OR" => {
                let start = self.new_state();
                let mut ends = Vec::new();
                for idx in 0..2 {
                    let (branch_start, branch_ends) = self.process(self.child(term, idx)?)?;
                    self.states[start].add_epsilon_transition(branch_start);
                    ends.extend(branch_ends);
                }
                self.states[start].close(None);
                Ok((start, ends))
            }
            "ONE_OR_MORE" => {
                let (start, ends) = self.process(self.child(term, 0)?)?;
                let end = self.new_state();
                self.states[end].add_epsilon_transition(start);
                self.patch_ends(&ends, end);
                Ok((start, vec![end]))
            }
            "ZERO_OR_MORE" => {
                let (node, ends) = self.process(self.child(term, 0)?)?;
                let start = self.new_state();
                self.states[start].add_epsilon_transition(node);
                self.patch_ends(&ends, start);
                Ok((start, vec![start]))
            }
            "ZERO_OR_ONE" => {
                let (node, mut ends) = self.process(self.child(term, 0)?)?;
                let start = self.new_state();
                self.states[start].add_epsilon_transition(node);
                ends.push(start);
                Ok((start, ends))
            }
            "REPEAT" => {
                let (min, max) = (self.int_of(term, 0)?, self.int_of(term, 1)?);
                let subgraph = self.child(term, 2)?;
                if min > max {
                    return Err(BuildError::MalformedRepeat(min, max));
                }
                if max == 0 {
                    return Ok(self.epsilon_graph());
                }
                if min == 0 {
                    let (node, mut ends) = self.repeat_graph(1, max, subgraph)?;
                    let start = self.new_state();
                    self.states[start].add_epsilon_transition(node);
                    ends.push(start);
                    Ok((start, ends))
                } else {
                    self.repeat_graph(min, max, subgraph)
                }
            }
            "ENTRY_ACTION" => {
                let action = self.action_of(term)?;
                let (start, ends) = self.process(self.child(term, 2)?)?;
                let end = self.new_state();
                self.states[end].set_action(action);
                self.patch_ends(&ends, end);
                Ok((start, vec![end]))
            }
            "MATCH_ACTION" => {
                let action = self.action_of(term)?;
                let (start, ends) = self.process(self.child(term, 2)?)?;
                let omega_source = self.new_state();
                self.patch_ends(&ends, omega_source);
                let accept = self.new_state();
                self.states[accept].set_action(action);
                self.states[omega_source].add_transition(TransitionKey::omega(), accept);
                self.states[omega_source].close(None);
                Ok((start, vec![accept]))
            }
            "CONTINUE" => self.continue_to(term, self.scopes.len() - 1),
            "RESTART" => self.continue_to(term, 0),
            "JOIN" => self.join(term),
            other => Err(BuildError::MalformedTerm(other.to_string())),
        }
    }

    fn literal(&mut self, s: &str) -> Result<(usize, Vec<usize>), BuildError> {
        if s.is_empty() {
            return Ok(self.epsilon_graph());
        }
        let mut start = None;
        let mut ends: Vec<usize> = Vec::new();
        for c in s.chars() {
            let symbol = c as u32;
            if symbol > self.encoding.primary_upper() {
                return Err(BuildError::SymbolOutsideEncoding(
                    symbol,
                    self.encoding.name().to_string(),
                ));
            }
            let (state, state_ends) = self.key_state(TransitionKey::single_char(symbol));
            match start {
                None => start = Some(state),
                Some(_) => self.patch_ends(&ends, state),
            }
            ends = state_ends;
        }
        Ok((start.expect("non-empty literal"), ends))
    }

    fn epsilon_graph(&mut self) -> (usize, Vec<usize>) {
        let start = self.new_state();
        let end = self.new_state();
        self.states[start].close(Some(end));
        (start, vec![end])
    }

    /// `min` mandatory copies chained head to tail, then `max - min` optional
    /// tails, each guarded by a midpoint that can skip to the end.
    fn repeat_graph(
        &mut self,
        min: u32,
        max: u32,
        subgraph: &Term,
    ) -> Result<(usize, Vec<usize>), BuildError> {
        debug_assert!(min >= 1 && min <= max);
        let (start, mut ends) = self.process(subgraph)?;
        for _ in 1..min {
            let (copy_start, copy_ends) = self.process(subgraph)?;
            self.patch_ends(&ends, copy_start);
            ends = copy_ends;
        }
        if min == max {
            return Ok((start, ends));
        }
        let mut midpoints = Vec::new();
        for _ in min..max {
            let midpoint = self.new_state();
            self.patch_ends(&ends, midpoint);
            let (copy_start, copy_ends) = self.process(subgraph)?;
            self.states[midpoint].add_epsilon_transition(copy_start);
            midpoints.push(midpoint);
            ends = copy_ends;
        }
        ends.extend(midpoints);
        Ok((start, ends))
    }

    fn continue_to(
        &mut self,
        term: &Term,
        scope_idx: usize,
    ) -> Result<(usize, Vec<usize>), BuildError> {
        let (start, ends) = self.process(self.child(term, 0)?)?;
        let placeholder = match self.scopes[scope_idx].start_node {
            Some(placeholder) => placeholder,
            None => {
                let placeholder = self.new_state();
                self.scopes[scope_idx].start_node = Some(placeholder);
                placeholder
            }
        };
        self.patch_ends(&ends, placeholder);
        // flow loops back, so nothing continues past this graph
        Ok((start, vec![]))
    }

    fn join(&mut self, term: &Term) -> Result<(usize, Vec<usize>), BuildError> {
        let name = self.str_of(term, 1)?;
        if self.building.iter().any(|building| &**building == name) {
            return Err(BuildError::RecursiveSubgraph(name.to_string()));
        }
        let key: Rc<str> = Rc::from(name);
        let cached = self
            .scopes
            .last()
            .and_then(|scope| scope.subgraphs.get(&key).copied());
        let (subgraph_start, subgraph_end) = match cached {
            Some(pair) => pair,
            None => {
                let graph = self
                    .rules
                    .and_then(|rules| rules.state_graph(name))
                    .ok_or_else(|| BuildError::UnknownSubgraph(name.to_string()))?;
                self.building.push(key.clone());
                let pair = self.build_nfa(&graph)?;
                self.building.pop();
                self.scopes
                    .last_mut()
                    .expect("join happens inside a scope")
                    .subgraphs
                    .insert(key, pair);
                pair
            }
        };
        let (start, ends) = self.process(self.child(term, 0)?)?;
        self.patch_ends(&ends, subgraph_start);
        // each join flows out through its own end node so the shared
        // subgraph end is closed exactly once, at scope pop
        let end = self.new_state();
        self.states[subgraph_end].add_epsilon_transition(end);
        Ok((start, vec![end]))
    }

    fn compute_epsilon_closures(&mut self) {
        let epsilon = TransitionKey::epsilon();
        let successors: Vec<Vec<usize>> = self
            .states
            .iter()
            .map(|state| {
                state
                    .transitions()
                    .get(&epsilon)
                    .map(|targets| targets.iter().copied().collect())
                    .unwrap_or_default()
            })
            .collect();
        for id in 0..self.states.len() {
            let mut closure = std::collections::BTreeSet::from([id]);
            let mut stack = vec![id];
            while let Some(state) = stack.pop() {
                for &target in &successors[state] {
                    if closure.insert(target) {
                        stack.push(target);
                    }
                }
            }
            self.states[id].epsilon_closure = closure.into_iter().collect();
        }
    }

    /// Rewrites every residual `catch_all` key to the inverse of the keys
    /// reachable from its state's closure (ignoring ε, `catch_all` and
    /// `eos`); an empty inverse degrades to `no_match`.
    fn replace_catch_all(&mut self) {
        let catch_all = TransitionKey::unique(UniqueTag::CatchAll);
        let eos = TransitionKey::unique(UniqueTag::Eos);
        let epsilon = TransitionKey::epsilon();
        for id in 0..self.states.len() {
            if !self.states[id].transitions().contains_key(&catch_all) {
                continue;
            }
            let closure: Vec<usize> = self.states[id].epsilon_closure.clone();
            let mut keys: std::collections::BTreeSet<TransitionKey> = closure
                .iter()
                .flat_map(|&member| self.states[member].transitions().keys().cloned())
                .collect();
            keys.remove(&epsilon);
            keys.remove(&catch_all);
            keys.remove(&eos);
            let targets = self.states[id]
                .transitions
                .remove(&catch_all)
                .expect("checked above");
            let replacement = TransitionKey::inverse_key(self.encoding, keys.iter())
                .unwrap_or_else(|| TransitionKey::unique(UniqueTag::NoMatch));
            self.states[id]
                .transitions
                .entry(replacement)
                .or_default()
                .extend(targets);
        }
    }

    fn child<'t>(&self, term: &'t Term, idx: usize) -> Result<&'t Term, BuildError> {
        term.term_arg(idx)
            .ok_or_else(|| BuildError::MalformedTerm(term.to_string()))
    }

    fn str_of<'t>(&self, term: &'t Term, idx: usize) -> Result<&'t str, BuildError> {
        term.str_arg(idx)
            .ok_or_else(|| BuildError::MalformedTerm(term.to_string()))
    }

    fn int_of(&self, term: &Term, idx: usize) -> Result<u32, BuildError> {
        term.int_arg(idx)
            .ok_or_else(|| BuildError::MalformedTerm(term.to_string()))
    }

    fn action_of(&self, term: &Term) -> Result<Action, BuildError> {
        let action_term = self.child(term, 0)?.clone();
        let precedence = self.int_of(term, 1)?;
        Ok(Action::new(action_term, precedence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;

    fn build_rules(src: &str) -> Result<Nfa, BuildError> {
        let set: RuleSet = parser::rules(src).unwrap().try_into().unwrap();
        set.compile(Encoding::latin1())
    }

    #[test]
    fn join_flows_into_other_state() {
        let nfa = build_rules(
            "<default>
                \"/*\" «| | comment»
            <comment>
                \"*/\" «| CommentToken |»
                . «| | continue»
            ",
        )
        .unwrap();
        // /* ... */ forms one token through the joined subgraph
        assert!(nfa.matches("/*x*/"));
        assert!(nfa.matches("/**/"));
        assert!(!nfa.matches("/*"));
    }

    #[test]
    fn continue_loops_within_a_state() {
        let nfa = build_rules(
            "<default>
                / +/ «| | continue»
                /ab/ «| T |»
            ",
        )
        .unwrap();
        assert!(nfa.matches("ab"));
        assert!(nfa.matches("  ab"));
        assert!(nfa.matches(" ab"));
        assert!(!nfa.matches("a b"));
    }

    #[test]
    fn recursive_join_is_rejected() {
        let err = build_rules(
            "<default>
                /a/ «| | other»
            <other>
                /b/ «| | default»
            ",
        )
        .unwrap_err();
        assert_eq!(err, BuildError::RecursiveSubgraph("default".to_string()));
    }

    #[test]
    fn unknown_operator_is_rejected() {
        let term = Term::leaf("NO_SUCH_OP");
        let err = NfaBuilder::new(Encoding::latin1()).build(&term).unwrap_err();
        assert!(matches!(err, BuildError::MalformedTerm(_)));
    }

    #[test]
    fn out_of_encoding_literal_is_rejected() {
        let term = parser::regex("€").unwrap();
        let err = NfaBuilder::new(Encoding::latin1()).build(&term).unwrap_err();
        assert!(matches!(err, BuildError::SymbolOutsideEncoding(0x20AC, _)));
    }

    #[test]
    fn catch_all_becomes_inverse_of_sibling_keys() {
        let nfa = build_rules(
            "<default>
                /a/ «| A |»
                catch_all «| Illegal |»
            ",
        )
        .unwrap();
        let catch = TransitionKey::unique(UniqueTag::CatchAll);
        assert!(nfa
            .states()
            .iter()
            .all(|state| !state.transitions().contains_key(&catch)));
    }
}
