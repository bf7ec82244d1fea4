use crate::term::Term;
use nom::branch::alt;
use nom::bytes::complete::{tag, take_while1, take_while_m_n};
use nom::character::complete::{anychar, char, digit1, satisfy};
use nom::combinator::{map, map_opt, map_res, opt, value};
use nom::multi::many1;
use nom::multi::separated_list1;
use nom::sequence::{delimited, pair, preceded, separated_pair};
use nom::IResult;

// The operator vocabulary: OR, CAT, ONE_OR_MORE, ZERO_OR_ONE, ZERO_OR_MORE,
// REPEAT(m,n,a), LITERAL(s), CLASS(body), NOT_CLASS(body), ANY,
// RANGE(a,b), CHARACTER_CLASS(name).

pub(crate) fn full_regex(input: &str) -> IResult<&str, Term> {
    expression(input)
}

pub(crate) fn expression(input: &str) -> IResult<&str, Term> {
    map(separated_list1(char('|'), sequence), |alts| {
        fold_binary("OR", alts)
    })(input)
}

fn sequence(input: &str) -> IResult<&str, Term> {
    map(many1(fragment), |frags| fold_binary("CAT", frags))(input)
}

/// Left-folds a list into nested binary terms; a single item stays bare.
pub(crate) fn fold_binary(op: &str, items: Vec<Term>) -> Term {
    items
        .into_iter()
        .reduce(|acc, item| Term::node(op, [acc.into(), item.into()]))
        .expect("list parsers yield at least one item")
}

fn fragment(input: &str) -> IResult<&str, Term> {
    map(
        pair(alt((group, class, any, literal)), opt(modifier)),
        |(term, modifier)| apply_modifier(term, modifier),
    )(input)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Modifier {
    OneOrMore,
    ZeroOrOne,
    ZeroOrMore,
    Repeat(u32, u32),
}

pub(crate) fn modifier(input: &str) -> IResult<&str, Modifier> {
    alt((
        value(Modifier::OneOrMore, char('+')),
        value(Modifier::ZeroOrOne, char('?')),
        value(Modifier::ZeroOrMore, char('*')),
        repetition,
    ))(input)
}

fn repetition(input: &str) -> IResult<&str, Modifier> {
    let bounds = alt((
        map(separated_pair(number, char(','), number), |(m, n)| (m, n)),
        map(number, |m| (m, m)),
    ));
    map(delimited(char('{'), bounds, char('}')), |(m, n)| {
        Modifier::Repeat(m, n)
    })(input)
}

fn number(input: &str) -> IResult<&str, u32> {
    map_res(digit1, str::parse)(input)
}

pub(crate) fn apply_modifier(term: Term, modifier: Option<Modifier>) -> Term {
    match modifier {
        None => term,
        Some(Modifier::OneOrMore) => Term::node("ONE_OR_MORE", [term.into()]),
        Some(Modifier::ZeroOrOne) => Term::node("ZERO_OR_ONE", [term.into()]),
        Some(Modifier::ZeroOrMore) => Term::node("ZERO_OR_MORE", [term.into()]),
        Some(Modifier::Repeat(m, n)) => {
            Term::node("REPEAT", [m.into(), n.into(), term.into()])
        }
    }
}

fn group(input: &str) -> IResult<&str, Term> {
    delimited(char('('), expression, char(')'))(input)
}

fn any(input: &str) -> IResult<&str, Term> {
    value(Term::leaf("ANY"), char('.'))(input)
}

fn literal(input: &str) -> IResult<&str, Term> {
    map(alt((escaped_char, normal_char)), |c| {
        Term::node("LITERAL", [c.to_string().as_str().into()])
    })(input)
}

fn normal_char(input: &str) -> IResult<&str, char> {
    satisfy(|c| !is_reserved(c))(input)
}

// A backslash escapes a reserved character or introduces an octal code.
fn escaped_char(input: &str) -> IResult<&str, char> {
    preceded(char('\\'), alt((octal_char, anychar)))(input)
}

fn octal_char(input: &str) -> IResult<&str, char> {
    map_opt(
        take_while_m_n(1, 3, |c: char| ('0'..='7').contains(&c)),
        |digits| u32::from_str_radix(digits, 8).ok().and_then(char::from_u32),
    )(input)
}

fn is_reserved(c: char) -> bool {
    "|+?*()[]{}.\\".contains(c)
}

/// Character class: `[...]` or `[^...]`, shared with the rule-file parser.
pub(crate) fn class(input: &str) -> IResult<&str, Term> {
    map(
        delimited(char('['), pair(opt(char('^')), class_body), char(']')),
        |(negated, body)| {
            let name = if negated.is_some() { "NOT_CLASS" } else { "CLASS" };
            Term::node(name, [body.into()])
        },
    )(input)
}

fn class_body(input: &str) -> IResult<&str, Term> {
    map(many1(class_item), |items| fold_binary("CAT", items))(input)
}

fn class_item(input: &str) -> IResult<&str, Term> {
    alt((named_class, class_range, class_literal))(input)
}

fn named_class(input: &str) -> IResult<&str, Term> {
    map(
        delimited(tag("[:"), identifier, tag(":]")),
        |name: &str| Term::node("CHARACTER_CLASS", [name.into()]),
    )(input)
}

fn class_range(input: &str) -> IResult<&str, Term> {
    map(
        separated_pair(class_char, char('-'), class_char),
        |(lo, hi)| {
            Term::node(
                "RANGE",
                [lo.to_string().as_str().into(), hi.to_string().as_str().into()],
            )
        },
    )(input)
}

fn class_literal(input: &str) -> IResult<&str, Term> {
    map(class_char, |c| {
        Term::node("LITERAL", [c.to_string().as_str().into()])
    })(input)
}

fn class_char(input: &str) -> IResult<&str, char> {
    alt((
        preceded(char('\\'), alt((octal_char, anychar))),
        satisfy(|c| !"]-\\".contains(c)),
    ))(input)
}

pub(crate) fn identifier(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_')(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;

    fn literal_term(s: &str) -> Term {
        Term::node("LITERAL", [s.into()])
    }

    #[test]
    fn parses_concatenation_and_alternation() {
        let term = parser::regex("ab|c").unwrap();
        assert_eq!(
            term,
            Term::node(
                "OR",
                [
                    Term::node("CAT", [literal_term("a").into(), literal_term("b").into()])
                        .into(),
                    literal_term("c").into()
                ]
            )
        );
    }

    #[test]
    fn parses_modifiers() {
        assert_eq!(
            parser::regex("a+").unwrap(),
            Term::node("ONE_OR_MORE", [literal_term("a").into()])
        );
        assert_eq!(
            parser::regex("(ab)*").unwrap(),
            Term::node(
                "ZERO_OR_MORE",
                [Term::node("CAT", [literal_term("a").into(), literal_term("b").into()]).into()]
            )
        );
        assert_eq!(
            parser::regex("a{2,4}").unwrap(),
            Term::node("REPEAT", [2.into(), 4.into(), literal_term("a").into()])
        );
        assert_eq!(
            parser::regex("a{3}").unwrap(),
            Term::node("REPEAT", [3.into(), 3.into(), literal_term("a").into()])
        );
    }

    #[test]
    fn parses_classes() {
        assert_eq!(
            parser::regex("[a-z_]").unwrap(),
            Term::node(
                "CLASS",
                [Term::node(
                    "CAT",
                    [
                        Term::node("RANGE", ["a".into(), "z".into()]).into(),
                        literal_term("_").into()
                    ]
                )
                .into()]
            )
        );
        assert_eq!(
            parser::regex("[^ab]").unwrap(),
            Term::node(
                "NOT_CLASS",
                [Term::node("CAT", [literal_term("a").into(), literal_term("b").into()]).into()]
            )
        );
        assert_eq!(
            parser::regex("[[:letter:]]").unwrap(),
            Term::node(
                "CLASS",
                [Term::node("CHARACTER_CLASS", ["letter".into()]).into()]
            )
        );
    }

    #[test]
    fn octal_escapes() {
        // \101 is 'A'
        assert_eq!(parser::regex("[\\101]").unwrap(),
            Term::node("CLASS", [literal_term("A").into()]));
        assert_eq!(parser::regex("\\101").unwrap(), literal_term("A"));
    }

    #[test]
    fn escaped_metacharacters() {
        assert_eq!(parser::regex("\\+").unwrap(), literal_term("+"));
        assert_eq!(parser::regex("\\.").unwrap(), literal_term("."));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parser::regex("a|").is_err());
        assert!(parser::regex("(a").is_err());
        assert!(parser::regex("a{").is_err());
        assert!(parser::regex("").is_err());
    }
}
