//! # Code shaping
//! The last stage of the pipeline: turns a (minimal) [Dfa] into the flat,
//! emission-ready form a template back end consumes. Each state's keys are
//! decoded into atoms and pre-split into dispatch buckets:
//!
//! * `switch_transitions`: dense primary ranges, emitted as jump tables;
//! * `if_transitions`: sparse ranges and the reserved 0 sentinel, emitted
//!   as range conditionals;
//! * `deferred_transitions`: named-class predicate calls, emitted after all
//!   primary-range checks, with the encoding's catch-all class last.
//!
//! States are renumbered by a deterministic preorder walk from the start
//! state, near-terminal states are inlined (one clone per referencing
//! state), and every remaining transition target becomes an index into the
//! append-only jump table.

use crate::dfa::Dfa;
use crate::key::{Encoding, KeyAtom, Symbol, SymbolRange, UniqueTag};
use crate::term::Action;
use log::debug;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::rc::Rc;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ShapeError {
    /// A catch-all class transition coexists with explicit class transitions
    /// that do not cover the encoding's full class set.
    #[error("state {state}: catch-all does not cover classes {missing:?}")]
    CatchAllCoverage { state: usize, missing: Vec<String> },
}

/// Label attached to a jump-table entry: where in the target's emitted code
/// the jump lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpLabel {
    /// The target state's entry point.
    StateEntry,
    /// Past the target's entry action; used when a state jumps back into
    /// itself, whose entry bookkeeping must not re-run.
    AfterEntryCode,
    /// The jump lands in a per-source inline clone.
    Inline,
}

/// Which entry-point labels the emitter must materialize for a state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryPoints {
    pub state_entry: bool,
    pub after_entry_code: bool,
}

/// One atom of a shaped transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapedAtom {
    /// A contiguous range of primary code units.
    Range(SymbolRange),
    /// A named class, before deferred rewriting.
    Class(Rc<str>),
    /// A host predicate call testing class membership.
    ClassCall(Rc<str>),
    /// The catch-all class test; always the last deferred transition.
    CatchAllClass,
}

/// An emission-ready state. Until [CodeShaper::shape] finishes, transition
/// targets are (renumbered) state ids; in the final output the bucket
/// targets, the ω target and the eos target are jump-table indices, while
/// [ShapedState::transitions] keeps the pre-split view with state ids.
#[derive(Debug, Clone)]
pub struct ShapedState {
    node_number: usize,
    original_node: usize,
    transitions: Vec<(Vec<ShapedAtom>, usize)>,
    if_transitions: Vec<(Vec<ShapedAtom>, usize)>,
    switch_transitions: Vec<(Vec<ShapedAtom>, usize)>,
    deferred_transitions: Vec<(Vec<ShapedAtom>, usize)>,
    eos_transition: Option<usize>,
    omega_transition: Option<usize>,
    action: Action,
    elide_read: bool,
    is_eos_handler: bool,
    inline: bool,
    must_not_inline: bool,
    total_transitions: usize,
    class_keys: usize,
    distinct_keys: usize,
    ranges: usize,
    entry_points: EntryPoints,
    fresh_clone: bool,
}

impl ShapedState {
    pub fn node_number(&self) -> usize {
        self.node_number
    }

    pub fn original_node(&self) -> usize {
        self.original_node
    }

    /// The pre-split transitions, targets as renumbered state ids.
    pub fn transitions(&self) -> &[(Vec<ShapedAtom>, usize)] {
        &self.transitions
    }

    pub fn if_transitions(&self) -> &[(Vec<ShapedAtom>, usize)] {
        &self.if_transitions
    }

    pub fn switch_transitions(&self) -> &[(Vec<ShapedAtom>, usize)] {
        &self.switch_transitions
    }

    pub fn deferred_transitions(&self) -> &[(Vec<ShapedAtom>, usize)] {
        &self.deferred_transitions
    }

    pub fn eos_transition(&self) -> Option<usize> {
        self.eos_transition
    }

    pub fn omega_transition(&self) -> Option<usize> {
        self.omega_transition
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    pub fn elide_read(&self) -> bool {
        self.elide_read
    }

    pub fn is_eos_handler(&self) -> bool {
        self.is_eos_handler
    }

    /// An inlined state is a template: it is cloned next to each referencing
    /// state and not emitted standalone.
    pub fn is_inline(&self) -> bool {
        self.inline
    }

    pub fn total_transitions(&self) -> usize {
        self.total_transitions
    }

    pub fn class_keys(&self) -> usize {
        self.class_keys
    }

    pub fn distinct_keys(&self) -> usize {
        self.distinct_keys
    }

    pub fn ranges(&self) -> usize {
        self.ranges
    }

    pub fn entry_points(&self) -> EntryPoints {
        self.entry_points
    }
}

/// Shaping knobs, mirroring the generator's command-line flags: turning
/// `inline` off keeps every state standalone, turning `switch_dispatch` off
/// forces range conditionals everywhere.
#[derive(Debug, Clone, Copy)]
pub struct ShapeOptions {
    pub inline: bool,
    pub switch_dispatch: bool,
}

impl Default for ShapeOptions {
    fn default() -> Self {
        ShapeOptions {
            inline: true,
            switch_dispatch: true,
        }
    }
}

/// The invocation contract handed to the downstream emitter.
#[derive(Debug)]
pub struct ShapedAutomaton {
    pub states: Vec<ShapedState>,
    pub jump_table: Vec<(usize, JumpLabel)>,
    pub encoding_name: String,
    pub primary_upper: Symbol,
    pub default_action: Action,
}

#[derive(Debug, Clone, Copy)]
enum Bucket {
    Switch,
    If,
    Deferred,
}

/// Shapes a minimal DFA for emission; see the module documentation.
pub struct CodeShaper<'a> {
    dfa: &'a Dfa,
    encoding: &'a Encoding,
    options: ShapeOptions,
    default_action: Action,
    states: Vec<ShapedState>,
    jump_table: Vec<(usize, JumpLabel)>,
}

impl<'a> CodeShaper<'a> {
    pub fn new(dfa: &'a Dfa, encoding: &'a Encoding, default_action: Action) -> Self {
        Self::with_options(dfa, encoding, default_action, ShapeOptions::default())
    }

    pub fn with_options(
        dfa: &'a Dfa,
        encoding: &'a Encoding,
        default_action: Action,
        options: ShapeOptions,
    ) -> Self {
        CodeShaper {
            dfa,
            encoding,
            options,
            default_action,
            states: Vec::new(),
            jump_table: Vec::new(),
        }
    }

    pub fn shape(mut self) -> Result<ShapedAutomaton, ShapeError> {
        self.build_states();
        let switched = self.split_transitions();
        debug!("{switched} states dispatch via switch");
        self.rewrite_deferred()?;
        if self.options.inline {
            let inlined = self.mark_inline();
            debug!("{inlined} states marked for inlining");
        }
        self.rewrite_jumps();
        // the start state is always implicitly jumped to
        self.states[0].entry_points.state_entry = true;
        Ok(ShapedAutomaton {
            states: self.states,
            jump_table: self.jump_table,
            encoding_name: self.encoding.name().to_string(),
            primary_upper: self.encoding.primary_upper(),
            default_action: self.default_action,
        })
    }

    /// Decodes one DFA state into atoms and statistics. The 0 symbol is
    /// reserved as the emitter's eos sentinel: a range starting at 0 has the
    /// 0 split off and re-appended as the very last transition.
    fn transform_state(&self, original_node: usize) -> ShapedState {
        let dfa_state = &self.dfa.states()[original_node];
        let mut transitions: Vec<(Vec<ShapedAtom>, usize)> = Vec::new();
        let (mut class_keys, mut distinct_keys, mut ranges) = (0, 0, 0);
        let mut zero_transition = None;
        let mut eos_transition = None;
        let mut omega_transition = None;
        let mut total_transitions = 0;

        for (key, &target) in dfa_state.transitions() {
            let mut atoms = Vec::new();
            for atom in key.range_iter(self.encoding) {
                match atom {
                    KeyAtom::Class(name) => {
                        class_keys += 1;
                        atoms.push(ShapedAtom::Class(name));
                    }
                    KeyAtom::PrimaryRange(range) => {
                        distinct_keys += range.len();
                        ranges += 1;
                        if range.lo == 0 {
                            debug_assert!(zero_transition.is_none());
                            zero_transition = Some(target);
                            if range.hi == 0 {
                                continue;
                            }
                            atoms.push(ShapedAtom::Range(SymbolRange::new(1, range.hi)));
                        } else {
                            atoms.push(ShapedAtom::Range(range));
                        }
                    }
                    KeyAtom::Unique(UniqueTag::Eos) => {
                        debug_assert!(eos_transition.is_none());
                        eos_transition = Some(target);
                        total_transitions += 1;
                    }
                    KeyAtom::Unique(UniqueTag::CatchAll) => {
                        debug_assert!(false, "catch_all survived to shaping");
                    }
                    // no_match marks absence of coverage and is not emitted
                    KeyAtom::Unique(UniqueTag::NoMatch) => {}
                    KeyAtom::Omega => {
                        debug_assert!(omega_transition.is_none());
                        omega_transition = Some(target);
                        total_transitions += 1;
                    }
                }
            }
            if !atoms.is_empty() {
                transitions.push((atoms, target));
            }
        }
        if let Some(target) = zero_transition {
            transitions.push((vec![ShapedAtom::Range(SymbolRange::new(0, 0))], target));
            ranges += 1;
        }
        total_transitions += transitions.len();

        ShapedState {
            node_number: 0,
            original_node,
            transitions,
            if_transitions: Vec::new(),
            switch_transitions: Vec::new(),
            deferred_transitions: Vec::new(),
            eos_transition,
            omega_transition,
            action: dfa_state.action().clone(),
            elide_read: total_transitions == 0
                || (total_transitions == 1 && omega_transition.is_some()),
            is_eos_handler: false,
            inline: false,
            must_not_inline: false,
            total_transitions,
            class_keys,
            distinct_keys,
            ranges,
            entry_points: EntryPoints::default(),
            fresh_clone: false,
        }
    }

    /// Renumbers states by a preorder walk from the start state, visiting
    /// keyed transitions in key order, then eos, then ω.
    fn build_states(&mut self) {
        let count = self.dfa.node_count();
        let shaped: Vec<ShapedState> =
            (0..count).map(|id| self.transform_state(id)).collect();

        let mut order: Vec<Option<usize>> = vec![None; count];
        let mut sequence: Vec<usize> = Vec::with_capacity(count);
        let mut stack = vec![self.dfa.start()];
        while let Some(id) = stack.pop() {
            if order[id].is_some() {
                continue;
            }
            order[id] = Some(sequence.len());
            sequence.push(id);
            let state = &shaped[id];
            let mut successors: Vec<usize> =
                state.transitions.iter().map(|(_, target)| *target).collect();
            successors.extend(state.eos_transition);
            successors.extend(state.omega_transition);
            for successor in successors.into_iter().rev() {
                if order[successor].is_none() {
                    stack.push(successor);
                }
            }
        }
        debug_assert_eq!(sequence.len(), count, "unreachable dfa state");
        for id in 0..count {
            if order[id].is_none() {
                order[id] = Some(sequence.len());
                sequence.push(id);
            }
        }

        let remap = |id: usize| order[id].expect("every state is numbered");
        let mut states: Vec<ShapedState> = Vec::with_capacity(count);
        for &original in &sequence {
            let mut state = shaped[original].clone();
            state.node_number = states.len();
            for (_, target) in state.transitions.iter_mut() {
                *target = remap(*target);
            }
            state.eos_transition = state.eos_transition.map(remap);
            state.omega_transition = state.omega_transition.map(remap);
            states.push(state);
        }

        let eos_targets: Vec<usize> = states.iter().filter_map(|s| s.eos_transition).collect();
        for target in eos_targets {
            states[target].is_eos_handler = true;
            states[target].must_not_inline = true;
        }
        // the start state is always entered directly and must stay emitted
        states[0].must_not_inline = true;
        self.states = states;
    }

    /// Splits each state's atoms between the `if` and `switch` buckets.
    /// Dense alphabets use the switch; few keys, stretched ranges, or the
    /// reserved 0 range stay with the range conditionals; class atoms are
    /// deferred behind all primary-range checks.
    fn split_transitions(&mut self) -> usize {
        let mut switched = 0;
        for state in &mut self.states {
            let no_switch = !self.options.switch_dispatch
                || state.distinct_keys <= 7
                || state.ranges == 0
                || state.distinct_keys as f64 / state.ranges as f64 >= 7.0;
            for (atoms, target) in &state.transitions {
                let mut if_atoms = Vec::new();
                let mut switch_atoms = Vec::new();
                let mut deferred_atoms = Vec::new();
                for atom in atoms {
                    match atom {
                        ShapedAtom::Class(_) => deferred_atoms.push(atom.clone()),
                        ShapedAtom::Range(range) if no_switch || range.lo == 0 => {
                            if_atoms.push(atom.clone())
                        }
                        ShapedAtom::Range(_) => switch_atoms.push(atom.clone()),
                        _ => debug_assert!(false, "rewritten atom before splitting"),
                    }
                }
                if !if_atoms.is_empty() {
                    state.if_transitions.push((if_atoms, *target));
                }
                if !switch_atoms.is_empty() {
                    state.switch_transitions.push((switch_atoms, *target));
                }
                if !deferred_atoms.is_empty() {
                    state.deferred_transitions.push((deferred_atoms, *target));
                }
            }
            if !no_switch {
                switched += 1;
            }
        }
        switched
    }

    /// Rewrites deferred class transitions into host predicate calls and
    /// moves the catch-all class to the very end. The catch-all may only
    /// coexist with classes whose union covers the whole class set.
    fn rewrite_deferred(&mut self) -> Result<(), ShapeError> {
        let encoding = self.encoding;
        let all_classes: BTreeSet<&str> =
            encoding.classes().iter().map(|class| class.name()).collect();
        for state in &mut self.states {
            if state.deferred_transitions.is_empty() {
                continue;
            }
            let mut seen: BTreeSet<String> = BTreeSet::new();
            let mut rewritten = Vec::new();
            let mut catch_all_target = None;
            for (atoms, target) in &state.deferred_transitions {
                let mut calls = Vec::new();
                let mut has_catch_all = false;
                for atom in atoms {
                    let ShapedAtom::Class(name) = atom else {
                        debug_assert!(false, "non-class atom deferred");
                        continue;
                    };
                    seen.insert(name.to_string());
                    if encoding.is_catch_all(name) {
                        debug_assert!(catch_all_target.is_none());
                        has_catch_all = true;
                    } else {
                        let idx = encoding
                            .class_index(name)
                            .expect("atom decoded from this encoding");
                        let predicate = encoding.classes()[idx].predicate();
                        calls.push(ShapedAtom::ClassCall(Rc::from(predicate)));
                    }
                }
                if has_catch_all {
                    // the catch-all fallback subsumes any calls bundled on
                    // its key, so they are dropped
                    catch_all_target = Some(*target);
                } else if !calls.is_empty() {
                    rewritten.push((calls, *target));
                }
            }
            if let Some(target) = catch_all_target {
                let missing: Vec<String> = all_classes
                    .iter()
                    .filter(|class| !seen.contains(**class))
                    .map(|class| class.to_string())
                    .collect();
                if !missing.is_empty() {
                    return Err(ShapeError::CatchAllCoverage {
                        state: state.node_number,
                        missing,
                    });
                }
                rewritten.push((vec![ShapedAtom::CatchAllClass], target));
            }
            state.deferred_transitions = rewritten;
        }
        Ok(())
    }

    /// A state terminates immediately if it has no transitions, or only an ω
    /// transition into a state that does.
    fn terminates_immediately(&self, id: usize) -> bool {
        let mut current = id;
        let mut hops = 0;
        loop {
            let state = &self.states[current];
            if state.total_transitions == 0 {
                return true;
            }
            if state.total_transitions == 1 {
                if let Some(next) = state.omega_transition {
                    current = next;
                    hops += 1;
                    if hops > self.states.len() {
                        return false;
                    }
                    continue;
                }
            }
            return false;
        }
    }

    fn mark_inline(&mut self) -> usize {
        let mut count = 0;
        for id in 0..self.states.len() {
            if self.states[id].must_not_inline {
                continue;
            }
            let inline = if self.terminates_immediately(id) {
                true
            } else if self.states[id].distinct_keys < 3 && self.states[id].class_keys == 0 {
                let targets: Vec<usize> = self.states[id]
                    .transitions
                    .iter()
                    .map(|(_, target)| *target)
                    .collect();
                targets
                    .into_iter()
                    .all(|target| self.terminates_immediately(target))
            } else {
                false
            };
            self.states[id].inline = inline;
            if inline {
                count += 1;
            }
        }
        count
    }

    /// Rewrites every transition target into a jump-table index. Inlineable
    /// targets get one clone per referencing state; clones are appended and
    /// queued for the same rewriting with their creator's clone map, so a
    /// chain of inlined states shares its clones.
    fn rewrite_jumps(&mut self) {
        let mut queue: VecDeque<(usize, HashMap<usize, usize>)> =
            (0..self.states.len()).map(|id| (id, HashMap::new())).collect();
        while let Some((id, inherited)) = queue.pop_front() {
            if self.states[id].inline && !self.states[id].fresh_clone {
                // template only; emitted as clones next to its referents
                continue;
            }
            self.states[id].fresh_clone = false;
            let mut mapping = inherited;
            let mut created = Vec::new();

            // order matches emission: switch, if, deferred, then ω and eos
            for bucket in [Bucket::Switch, Bucket::If, Bucket::Deferred] {
                for idx in 0..self.bucket_len(id, bucket) {
                    let target = self.bucket_target(id, bucket, idx);
                    let jump = self.jump_to(id, target, &mut mapping, &mut created);
                    self.set_bucket_target(id, bucket, idx, jump);
                }
            }
            if let Some(target) = self.states[id].omega_transition {
                let jump = self.jump_to(id, target, &mut mapping, &mut created);
                self.states[id].omega_transition = Some(jump);
            }
            if let Some(target) = self.states[id].eos_transition {
                debug_assert!(!self.states[target].inline, "eos handlers never inline");
                let label = self.entry_label(id, target);
                let jump = self.register_jump(target, label);
                self.states[id].eos_transition = Some(jump);
            }
            for clone in created {
                queue.push_back((clone, mapping.clone()));
            }
        }
    }

    fn jump_to(
        &mut self,
        source: usize,
        target: usize,
        mapping: &mut HashMap<usize, usize>,
        created: &mut Vec<usize>,
    ) -> usize {
        if self.states[target].inline {
            return match mapping.get(&target) {
                Some(&clone) => self.register_jump(clone, JumpLabel::StateEntry),
                None => {
                    let clone = self.clone_state(target);
                    mapping.insert(target, clone);
                    created.push(clone);
                    self.register_jump(clone, JumpLabel::Inline)
                }
            };
        }
        let label = self.entry_label(source, target);
        self.register_jump(target, label)
    }

    fn entry_label(&self, source: usize, target: usize) -> JumpLabel {
        // a state jumping back into itself skips its own entry bookkeeping
        if source == target && self.states[target].action.name() == "entry" {
            JumpLabel::AfterEntryCode
        } else {
            JumpLabel::StateEntry
        }
    }

    fn register_jump(&mut self, target: usize, label: JumpLabel) -> usize {
        match label {
            JumpLabel::StateEntry => self.states[target].entry_points.state_entry = true,
            JumpLabel::AfterEntryCode => {
                self.states[target].entry_points.after_entry_code = true
            }
            JumpLabel::Inline => {}
        }
        self.jump_table.push((target, label));
        self.jump_table.len() - 1
    }

    fn clone_state(&mut self, target: usize) -> usize {
        let mut clone = self.states[target].clone();
        clone.node_number = self.states.len();
        clone.entry_points = EntryPoints::default();
        clone.fresh_clone = true;
        self.states.push(clone);
        self.states.len() - 1
    }

    fn bucket_len(&self, id: usize, bucket: Bucket) -> usize {
        match bucket {
            Bucket::Switch => self.states[id].switch_transitions.len(),
            Bucket::If => self.states[id].if_transitions.len(),
            Bucket::Deferred => self.states[id].deferred_transitions.len(),
        }
    }

    fn bucket_target(&self, id: usize, bucket: Bucket, idx: usize) -> usize {
        match bucket {
            Bucket::Switch => self.states[id].switch_transitions[idx].1,
            Bucket::If => self.states[id].if_transitions[idx].1,
            Bucket::Deferred => self.states[id].deferred_transitions[idx].1,
        }
    }

    fn set_bucket_target(&mut self, id: usize, bucket: Bucket, idx: usize, value: usize) {
        match bucket {
            Bucket::Switch => self.states[id].switch_transitions[idx].1 = value,
            Bucket::If => self.states[id].if_transitions[idx].1 = value,
            Bucket::Deferred => self.states[id].deferred_transitions[idx].1 = value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Encoding;
    use crate::nfa::NfaBuilder;
    use crate::parser;
    use crate::rules::RuleSet;

    fn shaped_of(pattern: &str) -> ShapedAutomaton {
        let term = parser::regex(pattern).unwrap();
        let dfa = NfaBuilder::new(Encoding::latin1())
            .build(&term)
            .unwrap()
            .to_dfa()
            .unwrap()
            .minimize();
        CodeShaper::new(&dfa, Encoding::latin1(), Action::empty())
            .shape()
            .unwrap()
    }

    fn shaped_of_rules(src: &str, options: ShapeOptions) -> Result<ShapedAutomaton, ShapeError> {
        let set: RuleSet = parser::rules(src).unwrap().try_into().unwrap();
        let dfa = set
            .compile(Encoding::latin1())
            .unwrap()
            .to_dfa()
            .unwrap()
            .minimize();
        CodeShaper::with_options(&dfa, Encoding::latin1(), set.default_action(), options).shape()
    }

    #[test]
    fn start_state_is_node_zero() {
        let shaped = shaped_of("ab|cd");
        assert_eq!(shaped.states[0].node_number(), 0);
        assert!(shaped.states[0].entry_points().state_entry);
        assert_eq!(shaped.encoding_name, "latin1");
        assert_eq!(shaped.primary_upper, 0xFF);
    }

    #[test]
    fn sparse_states_use_if_dispatch() {
        // two distinct symbols is well under the switch threshold
        let shaped = shaped_of("ab");
        for state in &shaped.states {
            assert!(state.switch_transitions().is_empty());
        }
    }

    #[test]
    fn dense_states_use_switch_dispatch() {
        // ten distinct symbols across ten one-symbol ranges: switch territory
        let shaped = shaped_of("[aeiou!#%+=]");
        assert!(shaped
            .states
            .iter()
            .any(|state| !state.switch_transitions().is_empty()));
    }

    #[test]
    fn long_ranges_stay_with_if_dispatch() {
        // 62 symbols in three long ranges: range conditionals win
        let shaped = shaped_of("[0-9a-zA-Z]");
        for state in &shaped.states {
            assert!(state.switch_transitions().is_empty());
        }
    }

    #[test]
    fn switch_dispatch_can_be_disabled() {
        let src = "<default> [aeiou!#%+=] «| T |»";
        let switching = shaped_of_rules(src, ShapeOptions::default()).unwrap();
        assert!(switching
            .states
            .iter()
            .any(|state| !state.switch_transitions().is_empty()));
        let forced_if = shaped_of_rules(
            src,
            ShapeOptions {
                inline: true,
                switch_dispatch: false,
            },
        )
        .unwrap();
        for state in &forced_if.states {
            assert!(state.switch_transitions().is_empty());
        }
    }

    #[test]
    fn zero_range_is_split_and_last() {
        // \0-\5 starts at symbol 0, so the 0 must split off and come last
        let shaped = shaped_of("[\\0-\\5]x");
        let state = &shaped.states[0];
        let last = state.transitions().last().unwrap();
        assert_eq!(last.0, vec![ShapedAtom::Range(SymbolRange::new(0, 0))]);
        let first = state.transitions().first().unwrap();
        assert_eq!(first.0, vec![ShapedAtom::Range(SymbolRange::new(1, 5))]);
        // the zero check always lands in the if bucket, where the emitter
        // folds it into the eos sentinel test
        let zero = ShapedAtom::Range(SymbolRange::new(0, 0));
        assert!(state
            .if_transitions()
            .iter()
            .any(|(atoms, _)| atoms.contains(&zero)));
    }

    #[test]
    fn atoms_cover_the_original_edges() {
        let shaped = shaped_of("[a-z]+|A");
        for state in &shaped.states {
            // the pre-split view and the buckets carry the same atoms
            let mut split: Vec<&ShapedAtom> = Vec::new();
            for (atoms, _) in state
                .if_transitions()
                .iter()
                .chain(state.switch_transitions())
            {
                split.extend(atoms.iter());
            }
            let mut original: Vec<&ShapedAtom> = Vec::new();
            for (atoms, _) in state.transitions() {
                original.extend(atoms.iter());
            }
            assert_eq!(split.len(), original.len());
            for atom in split {
                assert!(original.contains(&atom));
            }
        }
    }

    #[test]
    fn near_terminal_states_are_inlined() {
        let shaped = shaped_of("ab");
        // the post-'b' and accept states terminate immediately and become
        // templates with appended clones
        assert!(shaped.states.iter().any(ShapedState::is_inline));
        let clones: Vec<&ShapedState> = shaped
            .states
            .iter()
            .filter(|state| state.node_number() >= 3)
            .collect();
        assert!(!clones.is_empty());
        for clone in clones {
            assert_eq!(clone.entry_points(), EntryPoints::default());
        }
        assert!(shaped
            .jump_table
            .iter()
            .any(|(_, label)| *label == JumpLabel::Inline));
    }

    #[test]
    fn inlining_can_be_disabled() {
        let shaped = shaped_of_rules(
            "<default> /ab/ «| T |»",
            ShapeOptions {
                inline: false,
                switch_dispatch: true,
            },
        )
        .unwrap();
        assert!(shaped.states.iter().all(|state| !state.is_inline()));
        assert!(shaped
            .jump_table
            .iter()
            .all(|(_, label)| *label != JumpLabel::Inline));
    }

    #[test]
    fn eos_targets_are_marked_and_kept() {
        let shaped = shaped_of_rules(
            "<default>
                /a/ «| A |»
                eos «| Eof |»
            ",
            ShapeOptions::default(),
        )
        .unwrap();
        let handlers: Vec<&ShapedState> = shaped
            .states
            .iter()
            .filter(|state| state.is_eos_handler())
            .collect();
        assert!(!handlers.is_empty());
        assert!(handlers.iter().all(|state| !state.is_inline()));
    }

    #[test]
    fn catch_all_class_is_rewritten_last() {
        let shaped = shaped_of_rules(
            "<default>
                /a/ «| A |»
                catch_all «| Illegal |»
            ",
            ShapeOptions::default(),
        )
        .unwrap();
        let deferred: Vec<&ShapedState> = shaped
            .states
            .iter()
            .filter(|state| !state.deferred_transitions().is_empty())
            .collect();
        assert!(!deferred.is_empty());
        for state in deferred {
            let last = state.deferred_transitions().last().unwrap();
            assert_eq!(last.0, vec![ShapedAtom::CatchAllClass]);
        }
    }

    #[test]
    fn jump_targets_resolve_through_the_table() {
        let shaped = shaped_of("a");
        for state in &shaped.states {
            for (_, jump) in state.if_transitions() {
                let (target, _) = shaped.jump_table[*jump];
                assert!(target < shaped.states.len());
            }
            if let Some(jump) = state.omega_transition() {
                let (target, _) = shaped.jump_table[jump];
                assert!(target < shaped.states.len());
            }
        }
    }
}
