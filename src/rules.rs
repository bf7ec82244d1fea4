//! # Rule sets
//! The validated form of a parsed rule file: aliases resolved, precedences
//! assigned in declaration order, declaration conflicts rejected. A [RuleSet]
//! knows how to express each lexer state as one operator [Term] (the OR of
//! its rules, each wrapped in its action and transition operators), which is
//! what the NFA builder consumes.

use crate::key::Encoding;
use crate::nfa::{BuildError, Nfa, NfaBuilder};
use crate::parser::{ParsedAction, ParsedItem, ParsedPattern, ParsedRuleFile};
use crate::term::{Action, Term, TermArg};
use std::collections::HashMap;
use std::rc::Rc;
use thiserror::Error;

/// The state scanning starts in; rules without an explicit transition restart
/// here.
pub const DEFAULT_STATE: &str = "default";

/// A declaration conflict in an otherwise well-formed rule file.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConflictError {
    #[error("alias '{0}' is defined twice")]
    AliasRedefined(String),
    #[error("alias '{0}' is not defined")]
    UndefinedAlias(String),
    #[error("default action is set twice")]
    DefaultActionRedefined,
    #[error("default_action must declare a match action")]
    MissingDefaultAction,
    #[error("state '{0}' has more than one eos rule")]
    DuplicateEos(String),
    #[error("state '{0}' has more than one catch_all rule")]
    DuplicateCatchAll(String),
    #[error("transition target '{0}' is not a defined state")]
    UndefinedState(String),
}

/// Where scanning continues after a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// No transition given: restart at the top-level default state.
    Restart,
    /// `continue`: re-enter the current state's subgraph.
    Continue,
    /// Flow into (or restart in) the named state.
    State(Rc<str>),
}

/// One rule: a regex graph plus the pieces of its action block.
#[derive(Debug, Clone)]
pub struct Rule {
    graph: Term,
    precedence: u32,
    entry: Option<Term>,
    token: Option<Term>,
    transition: Transition,
}

impl Rule {
    pub fn precedence(&self) -> u32 {
        self.precedence
    }

    pub fn transition(&self) -> &Transition {
        &self.transition
    }
}

/// The rules of one `<state>` block, in declaration order.
#[derive(Debug)]
pub struct StateRules {
    name: Rc<str>,
    rules: Vec<Rule>,
    has_eos: bool,
    has_catch_all: bool,
}

impl StateRules {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }
}

/// A validated rule file.
#[derive(Debug, Default)]
pub struct RuleSet {
    aliases: HashMap<String, Term>,
    states: Vec<StateRules>,
    index: HashMap<Rc<str>, usize>,
    default_action: Option<Action>,
}

impl RuleSet {
    pub fn states(&self) -> &[StateRules] {
        &self.states
    }

    pub fn state(&self, name: &str) -> Option<&StateRules> {
        self.index.get(name).map(|&idx| &self.states[idx])
    }

    /// The action the emitted scanner falls back to when no rule matches.
    pub fn default_action(&self) -> Action {
        self.default_action.clone().unwrap_or_else(Action::empty)
    }

    /// The named state's rules as one graph: the OR of every rule, each
    /// wrapped in its action and transition operators.
    pub fn state_graph(&self, name: &str) -> Option<Term> {
        let state = self.state(name)?;
        let graphs: Vec<Term> = state
            .rules
            .iter()
            .map(|rule| self.rule_graph(rule, &state.name))
            .collect();
        Some(
            graphs
                .into_iter()
                .reduce(|acc, g| Term::node("OR", [acc.into(), g.into()]))
                .unwrap_or_else(|| Term::leaf("EPSILON")),
        )
    }

    fn rule_graph(&self, rule: &Rule, state_name: &str) -> Term {
        let mut graph = rule.graph.clone();
        if let Some(entry) = &rule.entry {
            let term = Term::node("entry", [entry.clone().into()]);
            graph = Term::node(
                "ENTRY_ACTION",
                [term.into(), rule.precedence.into(), graph.into()],
            );
        }
        if let Some(token) = &rule.token {
            // a matching rule terminates the token; the restart target only
            // needs recording for the emitter
            let restart = match &rule.transition {
                Transition::State(name) => name.clone(),
                Transition::Continue => Rc::from(state_name),
                Transition::Restart => Rc::from(DEFAULT_STATE),
            };
            let term = Term::node("token", [token.clone().into(), TermArg::Str(restart)]);
            Term::node(
                "MATCH_ACTION",
                [term.into(), rule.precedence.into(), graph.into()],
            )
        } else {
            match &rule.transition {
                Transition::Continue => Term::node("CONTINUE", [graph.into()]),
                Transition::Restart => Term::node("RESTART", [graph.into()]),
                Transition::State(name) => {
                    Term::node("JOIN", [graph.into(), TermArg::Str(name.clone())])
                }
            }
        }
    }

    /// Compiles the rule set into the NFA of the default state.
    pub fn compile(&self, encoding: &Encoding) -> Result<Nfa, BuildError> {
        NfaBuilder::with_rules(encoding, self).build_state(DEFAULT_STATE)
    }
}

impl TryFrom<ParsedRuleFile> for RuleSet {
    type Error = ConflictError;

    fn try_from(file: ParsedRuleFile) -> Result<Self, Self::Error> {
        let mut set = RuleSet::default();
        let mut precedence = 0u32;
        let mut next_precedence = || {
            let p = precedence;
            precedence += 1;
            p
        };

        for item in file.items {
            match item {
                ParsedItem::Alias { name, term } => {
                    let resolved = resolve_aliases(&term, &set.aliases)?;
                    if set.aliases.insert(name.clone(), resolved).is_some() {
                        return Err(ConflictError::AliasRedefined(name));
                    }
                }
                ParsedItem::State { name, rules } => {
                    let state_idx = match set.index.get(name.as_str()) {
                        Some(&idx) => idx,
                        None => {
                            let key: Rc<str> = Rc::from(name.as_str());
                            set.states.push(StateRules {
                                name: key.clone(),
                                rules: vec![],
                                has_eos: false,
                                has_catch_all: false,
                            });
                            set.index.insert(key, set.states.len() - 1);
                            set.states.len() - 1
                        }
                    };
                    for rule in rules {
                        let prec = next_precedence();
                        let transition = transition_of(&rule.action);
                        let graph = match &rule.pattern {
                            ParsedPattern::Regex(term) => {
                                resolve_aliases(term, &set.aliases)?
                            }
                            ParsedPattern::Eos => {
                                let state = &mut set.states[state_idx];
                                if state.has_eos {
                                    return Err(ConflictError::DuplicateEos(name));
                                }
                                state.has_eos = true;
                                Term::node("UNIQUE_KEY", ["eos".into()])
                            }
                            ParsedPattern::CatchAll => {
                                let state = &mut set.states[state_idx];
                                if state.has_catch_all {
                                    return Err(ConflictError::DuplicateCatchAll(name));
                                }
                                state.has_catch_all = true;
                                Term::node("UNIQUE_KEY", ["catch_all".into()])
                            }
                            ParsedPattern::DefaultAction => {
                                if set.default_action.is_some() {
                                    return Err(ConflictError::DefaultActionRedefined);
                                }
                                let token = rule
                                    .action
                                    .token
                                    .clone()
                                    .ok_or(ConflictError::MissingDefaultAction)?;
                                let restart = match &transition {
                                    Transition::State(s) => s.clone(),
                                    _ => Rc::from(DEFAULT_STATE),
                                };
                                let term = Term::node(
                                    "token",
                                    [token.into(), TermArg::Str(restart)],
                                );
                                set.default_action = Some(Action::new(term, prec));
                                continue;
                            }
                        };
                        set.states[state_idx].rules.push(Rule {
                            graph,
                            precedence: prec,
                            entry: rule.action.entry.clone(),
                            token: rule.action.token.clone(),
                            transition,
                        });
                    }
                }
            }
        }

        // every named transition must lead to a declared state
        for state in &set.states {
            for rule in &state.rules {
                if let Transition::State(target) = &rule.transition {
                    if !set.index.contains_key(target) {
                        return Err(ConflictError::UndefinedState(target.to_string()));
                    }
                }
            }
        }
        Ok(set)
    }
}

fn transition_of(action: &ParsedAction) -> Transition {
    match action.transition.as_deref() {
        None => Transition::Restart,
        Some("continue") => Transition::Continue,
        Some(name) => Transition::State(Rc::from(name)),
    }
}

/// Rebuilds a term with every `ALIAS_REF` replaced by its binding. A
/// class-shaped alias named inside a class body (`CHARACTER_CLASS`) is
/// spliced in as well, so `hex = [0-9a-f];` can be reused as `[[:hex:]_]`.
fn resolve_aliases(
    term: &Term,
    aliases: &HashMap<String, Term>,
) -> Result<Term, ConflictError> {
    match term.name() {
        "ALIAS_REF" => {
            let name = term.str_arg(0).expect("alias ref carries its name");
            aliases
                .get(name)
                .cloned()
                .ok_or_else(|| ConflictError::UndefinedAlias(name.to_string()))
        }
        "CHARACTER_CLASS" => {
            let name = term.str_arg(0).expect("class ref carries its name");
            match aliases.get(name) {
                Some(alias) if alias.name() == "CLASS" => Ok(alias
                    .term_arg(0)
                    .expect("class term carries its body")
                    .clone()),
                _ => Ok(term.clone()),
            }
        }
        _ => {
            let args: Result<Vec<TermArg>, ConflictError> = term
                .args()
                .iter()
                .map(|arg| match arg {
                    TermArg::Term(t) => resolve_aliases(t, aliases).map(TermArg::Term),
                    other => Ok(other.clone()),
                })
                .collect();
            Ok(Term::node(term.name(), args?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;

    fn rule_set(src: &str) -> Result<RuleSet, ConflictError> {
        parser::rules(src).unwrap().try_into()
    }

    #[test]
    fn resolves_aliases_in_declaration_order() {
        let set = rule_set(
            "
            digit = [0-9];
            int = digit+;
            <default> int «| Number |»
            ",
        )
        .unwrap();
        let graph = set.state_graph(DEFAULT_STATE).unwrap();
        // MATCH_ACTION(token, p, ONE_OR_MORE(CLASS))
        assert_eq!(graph.name(), "MATCH_ACTION");
        let body = graph.term_arg(2).unwrap();
        assert_eq!(body.name(), "ONE_OR_MORE");
        assert_eq!(body.term_arg(0).unwrap().name(), "CLASS");
    }

    #[test]
    fn splices_class_aliases_into_class_bodies() {
        let set = rule_set(
            "
            hex = [0-9a-f];
            <default> [[:hex:]_]+ «| HexWord |»
            ",
        )
        .unwrap();
        let graph = set.state_graph(DEFAULT_STATE).unwrap();
        assert!(!graph.to_string().contains("CHARACTER_CLASS"));
    }

    #[test]
    fn assigns_precedence_in_declaration_order() {
        let set = rule_set(
            "<default>
                /if/ «| Keyword |»
                [a-z]+ «| Ident |»
            ",
        )
        .unwrap();
        let rules = set.state(DEFAULT_STATE).unwrap().rules();
        assert_eq!(rules[0].precedence(), 0);
        assert_eq!(rules[1].precedence(), 1);
    }

    #[test]
    fn detects_conflicts() {
        assert_eq!(
            rule_set("a = /x/; a = /y/; <default> a «| T |»").unwrap_err(),
            ConflictError::AliasRedefined("a".to_string())
        );
        assert_eq!(
            rule_set("<default> missing «| T |»").unwrap_err(),
            ConflictError::UndefinedAlias("missing".to_string())
        );
        assert_eq!(
            rule_set(
                "<default> default_action «| A |» default_action «| B |»"
            )
            .unwrap_err(),
            ConflictError::DefaultActionRedefined
        );
        assert_eq!(
            rule_set("<default> eos «| A |» eos «| B |»").unwrap_err(),
            ConflictError::DuplicateEos("default".to_string())
        );
        assert_eq!(
            rule_set("<default> catch_all «| A |» catch_all «| B |»").unwrap_err(),
            ConflictError::DuplicateCatchAll("default".to_string())
        );
        assert_eq!(
            rule_set("<default> /a/ «| | nowhere»").unwrap_err(),
            ConflictError::UndefinedState("nowhere".to_string())
        );
    }

    #[test]
    fn default_action_is_global() {
        let set = rule_set(
            "<default>
                /a/ «| A |»
                default_action «| Skip |»
            ",
        )
        .unwrap();
        let action = set.default_action();
        assert!(!action.is_empty());
        assert_eq!(action.term().name(), "token");
    }
}
