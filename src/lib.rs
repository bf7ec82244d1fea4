//! # lexforge
//!
//! `lexforge` is the core of a lexer generator: it compiles a declarative
//! specification of lexical rules into a deterministic finite automaton
//! shaped for emission as a table- or goto-driven scanner in a downstream
//! language.
//!
//! ## Pipeline
//!
//! 1. [parser]: nom parsers for regex literals and rule files,
//! 2. [rules]: validated rule sets with aliases resolved and precedences
//!    assigned,
//! 3. [nfa]: Thompson construction with named subgraphs, continues and
//!    prioritized actions, then the subset construction,
//! 4. [dfa]: the deterministic automaton and its Hopcroft minimization,
//! 5. [shaper]: renumbering, transition partitioning between range-test and
//!    switch-style dispatch, deferred class predicates, selective inlining
//!    and the jump table.
//!
//! The whole pipeline is single-threaded and batch: [compile] owns every
//! intermediate structure and either returns the emitter-ready
//! [ShapedAutomaton](shaper::ShapedAutomaton) or aborts with the first
//! typed [Error]. Given the same input it produces byte-identical output;
//! all key iteration runs in the canonical
//! [TransitionKey](key::TransitionKey) order.
//!
//! ## Example
//!
//! ```
//! use lexforge::key::Encoding;
//!
//! let source = r#"
//!     # a small scanner
//!     <default>
//!         /if/    «| Keyword |»
//!         [a-z]+  «| Identifier |»
//!         [ ]+    «| | continue»
//!         eos     «| EndOfInput |»
//! "#;
//! let automaton = lexforge::compile(source, Encoding::latin1()).unwrap();
//! assert_eq!(automaton.encoding_name, "latin1");
//! assert_eq!(automaton.primary_upper, 0xFF);
//! assert!(!automaton.states.is_empty());
//! ```
//!
//! The stages are also usable on their own; this runs a bare regex through
//! the automata and checks a few strings:
//!
//! ```
//! use lexforge::key::Encoding;
//! use lexforge::nfa::NfaBuilder;
//!
//! let term = lexforge::parser::regex("a(b|c)*").unwrap();
//! let nfa = NfaBuilder::new(Encoding::latin1()).build(&term).unwrap();
//! let dfa = nfa.to_dfa().unwrap().minimize();
//! assert!(dfa.matches("abcbc"));
//! assert!(!dfa.matches("ba"));
//! ```

pub mod dfa;
pub mod key;
pub mod nfa;
pub mod parser;
pub mod rules;
pub mod shaper;
pub mod term;


use crate::key::Encoding;
use crate::rules::RuleSet;
use crate::shaper::{CodeShaper, ShapeOptions, ShapedAutomaton};
use thiserror::Error;

/// Any failure of the pipeline; each stage contributes its own typed error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Syntax(#[from] parser::SyntaxError),
    #[error(transparent)]
    Conflict(#[from] rules::ConflictError),
    #[error(transparent)]
    Build(#[from] nfa::BuildError),
    #[error(transparent)]
    Dfa(#[from] dfa::DfaError),
    #[error(transparent)]
    Shape(#[from] shaper::ShapeError),
}

/// Runs the full pipeline on a rule file: parse, validate, build the NFA,
/// run the subset construction, minimize, and shape for emission.
pub fn compile(source: &str, encoding: &Encoding) -> Result<ShapedAutomaton, Error> {
    compile_with_options(source, encoding, ShapeOptions::default())
}

/// [compile] with explicit shaping options.
pub fn compile_with_options(
    source: &str,
    encoding: &Encoding,
    options: ShapeOptions,
) -> Result<ShapedAutomaton, Error> {
    let rule_set: RuleSet = parser::rules(source)?.try_into()?;
    let nfa = rule_set.compile(encoding)?;
    let dfa = nfa.to_dfa()?;
    let minimal = dfa.minimize();
    let shaped =
        CodeShaper::with_options(&minimal, encoding, rule_set.default_action(), options)
            .shape()?;
    Ok(shaped)
}
