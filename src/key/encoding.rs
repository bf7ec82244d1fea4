//! Input encodings. An [Encoding] fixes the primary numeric range of the
//! scanner's code units and names the character classes the host runtime can
//! test for symbols outside that range. The three built-ins are process-local
//! lazily initialized statics shared by repeated invocations.

use crate::key::{Symbol, SymbolRange, CLASS_BASE, UNIQUE_BASE};
use lazy_static::lazy_static;
use std::sync::Arc;

/// A host-defined character class: a name usable in rule files and the
/// predicate symbol the emitted scanner calls to test membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharClass {
    name: Arc<str>,
    predicate: Arc<str>,
}

impl CharClass {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn predicate(&self) -> &str {
        &self.predicate
    }
}

/// A fixed input encoding: a name, the primary range `[0, upper]` of code
/// units, and the named character classes covering everything else. One of
/// the classes may be designated the catch-all ("any non-primary symbol not
/// in another class").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoding {
    name: Arc<str>,
    primary_upper: Symbol,
    classes: Arc<[CharClass]>,
    catch_all: Option<usize>,
}

impl Encoding {
    pub fn new<'a>(
        name: &str,
        primary_upper: Symbol,
        classes: impl IntoIterator<Item = (&'a str, &'a str)>,
        catch_all: Option<&str>,
    ) -> Self {
        let classes: Arc<[CharClass]> = classes
            .into_iter()
            .map(|(name, predicate)| CharClass {
                name: Arc::from(name),
                predicate: Arc::from(predicate),
            })
            .collect();
        assert!(primary_upper < CLASS_BASE, "primary range overlaps class symbols");
        assert!(
            (classes.len() as Symbol) <= UNIQUE_BASE - CLASS_BASE,
            "too many character classes"
        );
        let catch_all = catch_all.map(|ca| {
            classes
                .iter()
                .position(|c| &*c.name == ca)
                .expect("catch-all must be a declared class")
        });
        Encoding {
            name: Arc::from(name),
            primary_upper,
            classes,
            catch_all,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn primary_upper(&self) -> Symbol {
        self.primary_upper
    }

    pub fn primary_range(&self) -> SymbolRange {
        SymbolRange::new(0, self.primary_upper)
    }

    pub fn classes(&self) -> &[CharClass] {
        &self.classes
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// The synthetic symbol owned by the `idx`th class.
    pub fn class_symbol(&self, idx: usize) -> Symbol {
        debug_assert!(idx < self.classes.len());
        CLASS_BASE + idx as Symbol
    }

    /// Looks a class up by name.
    pub fn class_index(&self, name: &str) -> Option<usize> {
        self.classes.iter().position(|c| &*c.name == name)
    }

    /// Decodes a synthetic class symbol back to its class.
    pub fn class_at(&self, symbol: Symbol) -> Option<&CharClass> {
        symbol
            .checked_sub(CLASS_BASE)
            .and_then(|idx| self.classes.get(idx as usize))
    }

    /// The range of all class symbols, if any class is declared.
    pub fn class_symbol_range(&self) -> Option<SymbolRange> {
        (!self.classes.is_empty()).then(|| {
            SymbolRange::new(CLASS_BASE, CLASS_BASE + self.classes.len() as Symbol - 1)
        })
    }

    pub fn catch_all_class(&self) -> Option<&CharClass> {
        self.catch_all.map(|idx| &self.classes[idx])
    }

    pub fn is_catch_all(&self, name: &str) -> bool {
        self.catch_all_class().map_or(false, |c| &*c.name == name)
    }
}

// The class set shared by the built-in encodings, with the predicate symbols
// the emitted scanner calls for symbols outside the primary range.
const STANDARD_CLASSES: [(&str, &str); 5] = [
    ("whitespace", "IsWhiteSpaceNotLineTerminator"),
    ("letter", "IsLetter"),
    ("identifier_part", "IsIdentifierPartNotLetter"),
    ("line_terminator", "IsLineTerminator"),
    ("everything_else", "IsNonPrimary"),
];

lazy_static! {
    static ref LATIN1: Encoding =
        Encoding::new("latin1", 0xFF, STANDARD_CLASSES, Some("everything_else"));
    static ref UTF16: Encoding =
        Encoding::new("utf16", 0xFFFF, STANDARD_CLASSES, Some("everything_else"));
    // Raw bytes with an ASCII fast path; non-ASCII input goes through the
    // named classes.
    static ref UTF8: Encoding =
        Encoding::new("utf8", 0x7F, STANDARD_CLASSES, Some("everything_else"));
}

impl Encoding {
    pub fn latin1() -> &'static Encoding {
        &LATIN1
    }

    pub fn utf16() -> &'static Encoding {
        &UTF16
    }

    pub fn utf8() -> &'static Encoding {
        &UTF8
    }
}
