//! # Terms and actions
//! A [Term] is the common currency of the front end: the regex and rule
//! parsers produce operator trees (`CAT`, `OR`, `LITERAL`, ...) as terms, and
//! user actions attached to rules are terms as well. Terms are immutable,
//! structurally comparable and hashable, so they can seed hash maps and be
//! compared for action-conflict detection without any interpretation.
//!
//! An [Action] pairs an action term with the precedence of the rule that
//! declared it. Rules are numbered in declaration order and a lower number
//! wins, which makes [Action::dominant] a simple fold with one failure mode:
//! two structurally different actions at the same precedence.

use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// An immutable tree of one operator name and its arguments, `f(a, b, c)`.
/// Arguments are integers, strings or terms. The empty term (empty name, no
/// arguments) is distinguished and is the payload of the empty action.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Term {
    name: Rc<str>,
    args: Rc<[TermArg]>,
}

/// A single argument of a [Term].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TermArg {
    Int(u32),
    Str(Rc<str>),
    Term(Term),
}

impl Term {
    /// The distinguished empty term.
    pub fn empty() -> Self {
        Term {
            name: Rc::from(""),
            args: Rc::from([]),
        }
    }

    /// A term with a name and no arguments.
    pub fn leaf(name: &str) -> Self {
        debug_assert!(!name.is_empty(), "empty term must be made with empty()");
        Term {
            name: Rc::from(name),
            args: Rc::from([]),
        }
    }

    /// A term with a name and arguments.
    pub fn node(name: &str, args: impl IntoIterator<Item = TermArg>) -> Self {
        debug_assert!(!name.is_empty(), "empty term must not have args");
        Term {
            name: Rc::from(name),
            args: args.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[TermArg] {
        &self.args
    }

    /// The `idx`th argument as an integer, if it is one.
    pub fn int_arg(&self, idx: usize) -> Option<u32> {
        match self.args.get(idx) {
            Some(TermArg::Int(i)) => Some(*i),
            _ => None,
        }
    }

    /// The `idx`th argument as a string, if it is one.
    pub fn str_arg(&self, idx: usize) -> Option<&str> {
        match self.args.get(idx) {
            Some(TermArg::Str(s)) => Some(s),
            _ => None,
        }
    }

    /// The `idx`th argument as a subterm, if it is one.
    pub fn term_arg(&self, idx: usize) -> Option<&Term> {
        match self.args.get(idx) {
            Some(TermArg::Term(t)) => Some(t),
            _ => None,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}", self.name)?;
        for arg in self.args.iter() {
            match arg {
                TermArg::Int(i) => write!(f, ",{i}")?,
                TermArg::Str(s) => write!(f, ",{s}")?,
                TermArg::Term(t) => write!(f, ",{t}")?,
            }
        }
        write!(f, ")")
    }
}

impl From<u32> for TermArg {
    fn from(value: u32) -> Self {
        TermArg::Int(value)
    }
}

impl From<&str> for TermArg {
    fn from(value: &str) -> Self {
        TermArg::Str(Rc::from(value))
    }
}

impl From<Rc<str>> for TermArg {
    fn from(value: Rc<str>) -> Self {
        TermArg::Str(value)
    }
}

impl From<Term> for TermArg {
    fn from(value: Term) -> Self {
        TermArg::Term(value)
    }
}

/// Two structurally different actions competed at the same precedence, so no
/// dominant action exists. Carries both terms for the error report.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("conflicting actions at precedence {precedence}: {first} vs {second}")]
pub struct ActionConflict {
    pub precedence: i32,
    pub first: Term,
    pub second: Term,
}

/// A user action term tagged with the precedence of the rule that declared
/// it. The empty action (empty term, precedence −1) marks "no action".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Action {
    term: Term,
    precedence: i32,
}

impl Action {
    pub fn new(term: Term, precedence: u32) -> Self {
        debug_assert!(!term.is_empty(), "action must have a non-empty term");
        Action {
            term,
            precedence: precedence as i32,
        }
    }

    pub fn empty() -> Self {
        Action {
            term: Term::empty(),
            precedence: -1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.term.is_empty()
    }

    pub fn name(&self) -> &str {
        self.term.name()
    }

    pub fn term(&self) -> &Term {
        &self.term
    }

    pub fn precedence(&self) -> i32 {
        self.precedence
    }

    /// Resolves a set of competing actions to the one with the lowest
    /// precedence, ignoring empty actions. Equal precedences are only
    /// tolerated for structurally equal terms.
    pub fn dominant<'a>(
        actions: impl IntoIterator<Item = &'a Action>,
    ) -> Result<Action, ActionConflict> {
        let mut dominant = Action::empty();
        for action in actions {
            if action.is_empty() {
                continue;
            }
            if dominant.is_empty() {
                dominant = action.clone();
            } else if action.precedence == dominant.precedence {
                if action.term != dominant.term {
                    return Err(ActionConflict {
                        precedence: action.precedence,
                        first: dominant.term,
                        second: action.term.clone(),
                    });
                }
            } else if action.precedence < dominant.precedence {
                dominant = action.clone();
            }
        }
        Ok(dominant)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "action <>")
        } else {
            write!(f, "action <{}@{}>", self.term, self.precedence)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cat(left: Term, right: Term) -> Term {
        Term::node("CAT", [left.into(), right.into()])
    }

    #[test]
    fn structural_equality() {
        let a = cat(Term::node("LITERAL", ["a".into()]), Term::leaf("ANY"));
        let b = cat(Term::node("LITERAL", ["a".into()]), Term::leaf("ANY"));
        let c = cat(Term::node("LITERAL", ["b".into()]), Term::leaf("ANY"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.to_string(), "(CAT,(LITERAL,a),(ANY))");
    }

    #[test]
    fn empty_term_is_distinguished() {
        assert!(Term::empty().is_empty());
        assert!(!Term::leaf("x").is_empty());
        assert_eq!(Term::empty(), Term::empty());
    }

    #[test]
    fn dominant_picks_lowest_precedence() {
        let keyword = Action::new(Term::leaf("KEYWORD"), 0);
        let ident = Action::new(Term::leaf("IDENT"), 1);
        let winner =
            Action::dominant([&ident, &Action::empty(), &keyword]).unwrap();
        assert_eq!(winner, keyword);
    }

    #[test]
    fn dominant_of_no_actions_is_empty() {
        let winner = Action::dominant([&Action::empty()]).unwrap();
        assert!(winner.is_empty());
    }

    #[test]
    fn equal_precedence_requires_equal_terms() {
        let a = Action::new(Term::leaf("A"), 3);
        let also_a = Action::new(Term::leaf("A"), 3);
        let b = Action::new(Term::leaf("B"), 3);
        assert!(Action::dominant([&a, &also_a]).is_ok());
        let err = Action::dominant([&a, &b]).unwrap_err();
        assert_eq!(err.precedence, 3);
        assert_eq!(err.first, Term::leaf("A"));
        assert_eq!(err.second, Term::leaf("B"));
    }
}
