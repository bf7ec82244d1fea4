//! Hopcroft partition refinement. States are first grouped by *action
//! signature* (same non-empty action, unactioned terminals, plain states),
//! then split against every disjoint alphabet key until no partition maps
//! into both halves of a test set. The worklist always holds a subset of the
//! current partitions and follows the smaller-half rule.

use crate::dfa::{Dfa, DfaState};
use crate::key::TransitionKey;
use crate::term::Action;
use log::debug;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;

/// An immutable equivalence class of state ids.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct StatePartition(Rc<BTreeSet<usize>>);

impl StatePartition {
    fn new(set: BTreeSet<usize>) -> Self {
        debug_assert!(!set.is_empty(), "empty equivalence class");
        StatePartition(Rc::new(set))
    }

    fn contains(&self, id: usize) -> bool {
        self.0.contains(&id)
    }

    fn len(&self) -> usize {
        self.0.len()
    }

    fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }
}

pub struct DfaMinimizer<'a> {
    dfa: &'a Dfa,
}

impl<'a> DfaMinimizer<'a> {
    pub fn new(dfa: &'a Dfa) -> Self {
        DfaMinimizer { dfa }
    }

    /// Runs the refinement. Returns a copy of the input when it is already
    /// minimal, a freshly built automaton otherwise; the input is never
    /// mutated.
    pub fn minimize(&self) -> Dfa {
        let alphabet = self.alphabet();
        let rows: Vec<Vec<Option<usize>>> = self
            .dfa
            .states()
            .iter()
            .map(|state| alphabet.iter().map(|key| state.key_matches(key)).collect())
            .collect();

        let mut partitions = self.initial_partitions();
        let mut working: BTreeSet<StatePartition> = partitions.clone();

        while let Some(test) = working.pop_first() {
            for key_idx in 0..alphabet.len() {
                let into: BTreeSet<usize> = rows
                    .iter()
                    .enumerate()
                    .filter(|(_, row)| row[key_idx].map_or(false, |t| test.contains(t)))
                    .map(|(id, _)| id)
                    .collect();
                if into.is_empty() {
                    continue;
                }
                let mut replaced = Vec::new();
                let mut created = Vec::new();
                for partition in &partitions {
                    let intersection: BTreeSet<usize> =
                        partition.iter().filter(|id| into.contains(id)).collect();
                    if intersection.is_empty() {
                        continue;
                    }
                    let difference: BTreeSet<usize> =
                        partition.iter().filter(|id| !into.contains(id)).collect();
                    if difference.is_empty() {
                        continue;
                    }
                    let intersection = StatePartition::new(intersection);
                    let difference = StatePartition::new(difference);
                    if working.remove(partition) {
                        working.insert(intersection.clone());
                        working.insert(difference.clone());
                    } else if intersection.len() <= difference.len() {
                        working.insert(intersection.clone());
                    } else {
                        working.insert(difference.clone());
                    }
                    replaced.push(partition.clone());
                    created.push(intersection);
                    created.push(difference);
                }
                for partition in replaced {
                    partitions.remove(&partition);
                }
                partitions.extend(created);
            }
        }

        debug_assert!(
            self.partitions_are_consistent(&partitions, &alphabet),
            "partition maps into more than one partition"
        );
        debug!(
            "hopcroft: {} states -> {} partitions",
            self.dfa.node_count(),
            partitions.len()
        );

        if partitions.len() == self.dfa.node_count() {
            return self.dfa.clone();
        }
        self.merge_partitions(&partitions)
    }

    fn initial_partitions(&self) -> BTreeSet<StatePartition> {
        #[derive(PartialEq, Eq, Hash)]
        enum Signature<'d> {
            TerminalAction(&'d Action),
            NonTerminalAction(&'d Action),
            TerminalPlain,
            Plain,
        }
        let mut groups: HashMap<Signature, BTreeSet<usize>> = HashMap::new();
        for (id, state) in self.dfa.states().iter().enumerate() {
            let signature = if !state.action().is_empty() {
                if state.is_terminal() {
                    Signature::TerminalAction(state.action())
                } else {
                    Signature::NonTerminalAction(state.action())
                }
            } else if state.is_terminal() {
                Signature::TerminalPlain
            } else {
                Signature::Plain
            };
            groups.entry(signature).or_default().insert(id);
        }
        groups.into_values().map(StatePartition::new).collect()
    }

    /// The disjoint cover of every outgoing key across all states.
    fn alphabet(&self) -> Vec<TransitionKey> {
        let keys: BTreeSet<&TransitionKey> = self
            .dfa
            .states()
            .iter()
            .flat_map(|state| state.transitions().keys())
            .collect();
        TransitionKey::disjoint_keys(keys).into_iter().collect()
    }

    fn merge_partitions(&self, partitions: &BTreeSet<StatePartition>) -> Dfa {
        let parts: Vec<&StatePartition> = partitions.iter().collect();
        let mut part_of: HashMap<usize, usize> = HashMap::new();
        for (idx, partition) in parts.iter().enumerate() {
            for id in partition.iter() {
                part_of.insert(id, idx);
            }
        }
        let states: Vec<DfaState> = parts
            .iter()
            .map(|partition| {
                let representative = partition.iter().next().expect("non-empty class");
                let state = &self.dfa.states()[representative];
                let mut grouped: BTreeMap<usize, Vec<&TransitionKey>> = BTreeMap::new();
                for (key, target) in state.transitions() {
                    grouped.entry(part_of[target]).or_default().push(key);
                }
                let transitions: BTreeMap<TransitionKey, usize> = grouped
                    .into_iter()
                    .map(|(target, keys)| {
                        (TransitionKey::merged_key(keys.into_iter()), target)
                    })
                    .collect();
                DfaState::new(transitions, state.is_terminal(), state.action().clone())
            })
            .collect();
        let start = part_of[&self.dfa.start()];
        Dfa::new(states, start).expect("minimization preserves the terminal set")
    }

    fn partitions_are_consistent(
        &self,
        partitions: &BTreeSet<StatePartition>,
        alphabet: &[TransitionKey],
    ) -> bool {
        let find = |id: usize| partitions.iter().position(|p| p.contains(id));
        partitions.iter().all(|partition| {
            alphabet.iter().all(|key| {
                let mut mapped: Option<Option<usize>> = None;
                partition.iter().all(|id| {
                    let target = self.dfa.states()[id].key_matches(key).and_then(find);
                    match mapped {
                        None => {
                            mapped = Some(target);
                            true
                        }
                        Some(seen) => seen == target,
                    }
                })
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Encoding;
    use crate::nfa::NfaBuilder;
    use crate::parser;

    fn key(c: char) -> TransitionKey {
        TransitionKey::single_char(c as u32)
    }

    fn minimal_dfa_of(pattern: &str) -> Dfa {
        let term = parser::regex(pattern).unwrap();
        NfaBuilder::new(Encoding::latin1())
            .build(&term)
            .unwrap()
            .to_dfa()
            .unwrap()
            .minimize()
    }

    #[test]
    fn merges_states_with_identical_futures() {
        // S0 -a-> S1, S0 -b-> S2, S1 -c-> S3, S2 -c-> S3, S3 terminal;
        // S1 and S2 are equivalent, so three states remain
        let states = vec![
            DfaState::new(
                BTreeMap::from([(key('a'), 1), (key('b'), 2)]),
                false,
                Action::empty(),
            ),
            DfaState::new(BTreeMap::from([(key('c'), 3)]), false, Action::empty()),
            DfaState::new(BTreeMap::from([(key('c'), 3)]), false, Action::empty()),
            DfaState::new(BTreeMap::new(), true, Action::empty()),
        ];
        let dfa = Dfa::new(states, 0).unwrap();
        let minimal = dfa.minimize();
        assert_eq!(minimal.node_count(), 3);
        assert!(minimal.matches("ac"));
        assert!(minimal.matches("bc"));
        assert!(!minimal.matches("a"));
        assert!(!minimal.matches("cc"));
    }

    #[test]
    fn distinct_actions_stay_apart() {
        let a = Action::new(crate::term::Term::leaf("A"), 0);
        let b = Action::new(crate::term::Term::leaf("B"), 1);
        let states = vec![
            DfaState::new(
                BTreeMap::from([(key('a'), 1), (key('b'), 2)]),
                false,
                Action::empty(),
            ),
            DfaState::new(BTreeMap::new(), true, a),
            DfaState::new(BTreeMap::new(), true, b),
        ];
        let dfa = Dfa::new(states, 0).unwrap();
        // same shape as the previous test's tail, but the differing actions
        // forbid the merge
        assert_eq!(dfa.minimize().node_count(), 3);
    }

    #[test]
    fn minimization_is_idempotent_and_never_grows() {
        for pattern in ["a", "a+b", "(a|b)*abb", "[ab]{2,3}", "a.?b"] {
            let minimal = minimal_dfa_of(pattern);
            let again = minimal.minimize();
            assert!(again.node_count() <= minimal.node_count());
            assert_eq!(again.node_count(), minimal.node_count());
            for input in ["", "a", "b", "ab", "aab", "abb", "aabb", "ba"] {
                assert_eq!(minimal.matches(input), again.matches(input));
            }
        }
    }

    #[test]
    fn already_minimal_input_is_returned_unchanged() {
        let states = vec![
            DfaState::new(BTreeMap::from([(key('a'), 1)]), false, Action::empty()),
            DfaState::new(BTreeMap::new(), true, Action::empty()),
        ];
        let dfa = Dfa::new(states, 0).unwrap();
        assert_eq!(dfa.minimize(), dfa);
    }
}
