//! # Rule and regex parsers
//! This module contains the two nom parsers of the front end: one for regex
//! literals and one for whole rule files. Both entry points require the whole
//! input to parse and report failures as [SyntaxError] with the line and
//! column of the offending position.
//!
//! Parsing a rule file is a two-step affair, mirroring the rest of the crate:
//! [rules] produces a [ParsedRuleFile], a faithful syntactic representation,
//! and converting it into a [RuleSet](crate::rules::RuleSet) with [TryInto]
//! resolves aliases, assigns rule precedences and checks the declaration
//! conflicts (redefined alias, doubled default action, duplicate `eos` /
//! `catch_all` within a state).
//!
//! ## Rule file format
//!
//! ```text
//! # aliases bind a name to a regex
//! digit = [0-9];
//! int   = digit+;
//!
//! <default>
//!     /if/           «| Keyword |»
//!     [a-z]+         «| Identifier |»
//!     int            «| Number |»
//!     "/*"           «| | comment»          # flow into another state
//!     [ \t]+         «| | continue»         # loop within this state
//!     eos            «| Eof |»
//!     catch_all      «| Illegal |»
//!     default_action «| Skip |»
//!
//! <comment>
//!     "*/"           «| Comment |»
//!     .              «| | continue»
//! ```
//!
//! Every rule carries an action block `«entry | match | transition»`. All
//! three parts are optional: the entry part names code to run when the rule's
//! submatch completes, the match part names the token action that accepts,
//! and the transition names the state in which scanning resumes (`continue`
//! re-enters the current state; omitting it restarts at `<default>`).

mod regex;
mod rules;

use crate::term::Term;
use nom::combinator::all_consuming;
use nom::Finish;
use thiserror::Error;

/// A parsed rule file, prior to alias resolution and conflict checking.
#[derive(Debug)]
pub struct ParsedRuleFile {
    pub items: Vec<ParsedItem>,
}

#[derive(Debug)]
pub enum ParsedItem {
    Alias { name: String, term: Term },
    State { name: String, rules: Vec<ParsedRule> },
}

#[derive(Debug)]
pub struct ParsedRule {
    pub pattern: ParsedPattern,
    pub action: ParsedAction,
}

#[derive(Debug, Clone)]
pub enum ParsedPattern {
    Regex(Term),
    DefaultAction,
    Eos,
    CatchAll,
}

/// The `«entry | match | transition»` block of one rule.
#[derive(Debug, Clone, Default)]
pub struct ParsedAction {
    pub entry: Option<Term>,
    pub token: Option<Term>,
    pub transition: Option<String>,
}

/// A parse failure, pointing at the first position the grammar could not
/// consume.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyntaxError {
    #[error("regex syntax error at line {line}, column {column}, near `{near}`")]
    Regex { line: usize, column: usize, near: String },
    #[error("rule syntax error at line {line}, column {column}, near `{near}`")]
    Rule { line: usize, column: usize, near: String },
}

/// Parses a regex literal into its operator [Term] tree. The whole input must
/// be consumed; leading and trailing whitespace is ignored.
pub fn regex(input: &str) -> Result<Term, SyntaxError> {
    let trimmed = input.trim();
    all_consuming(regex::full_regex)(trimmed)
        .finish()
        .map(|(_, term)| term)
        .map_err(|e| position(trimmed, e.input, true))
}

/// Parses a rule file into its syntactic form. The whole input must be
/// consumed.
pub fn rules(input: &str) -> Result<ParsedRuleFile, SyntaxError> {
    all_consuming(rules::full_rule_file)(input)
        .finish()
        .map(|(_, file)| file)
        .map_err(|e| position(input, e.input, false))
}

fn position(input: &str, remaining: &str, is_regex: bool) -> SyntaxError {
    let offset = input.len().saturating_sub(remaining.len());
    let consumed = &input[..offset.min(input.len())];
    let line = consumed.matches('\n').count() + 1;
    let column = consumed
        .rsplit_once('\n')
        .map_or(consumed.chars().count(), |(_, tail)| tail.chars().count())
        + 1;
    let near: String = remaining.chars().take(16).collect();
    let near = if near.is_empty() { "end of input".to_string() } else { near };
    if is_regex {
        SyntaxError::Regex { line, column, near }
    } else {
        SyntaxError::Rule { line, column, near }
    }
}
