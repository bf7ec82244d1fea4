use crate::parser::regex::{
    apply_modifier, class, expression, fold_binary, identifier, modifier,
};
use crate::parser::{ParsedAction, ParsedItem, ParsedPattern, ParsedRule, ParsedRuleFile};
use crate::term::Term;
use nom::branch::alt;
use nom::bytes::complete::{escaped, is_not, tag};
use nom::character::complete::{anychar, char, multispace1, not_line_ending, satisfy};
use nom::combinator::{all_consuming, map, not, opt, recognize, value};
use nom::error::{Error, ErrorKind};
use nom::multi::{many0, many1, separated_list0, separated_list1};
use nom::sequence::{delimited, pair, preceded, terminated, tuple};
use nom::IResult;

pub(crate) fn full_rule_file(input: &str) -> IResult<&str, ParsedRuleFile> {
    map(terminated(many0(item), sc), |items| ParsedRuleFile { items })(input)
}

fn item(input: &str) -> IResult<&str, ParsedItem> {
    alt((alias, state_block))(input)
}

fn alias(input: &str) -> IResult<&str, ParsedItem> {
    map(
        tuple((lex(identifier), lex(char('=')), composite, lex(char(';')))),
        |(name, _, term, _)| ParsedItem::Alias {
            name: name.to_string(),
            term,
        },
    )(input)
}

fn state_block(input: &str) -> IResult<&str, ParsedItem> {
    map(
        pair(
            delimited(lex(char('<')), lex(identifier), lex(char('>'))),
            many0(rule),
        ),
        |(name, rules)| ParsedItem::State {
            name: name.to_string(),
            rules,
        },
    )(input)
}

fn rule(input: &str) -> IResult<&str, ParsedRule> {
    alt((
        keyword_rule("default_action", ParsedPattern::DefaultAction),
        keyword_rule("eos", ParsedPattern::Eos),
        keyword_rule("catch_all", ParsedPattern::CatchAll),
        regex_rule,
    ))(input)
}

fn keyword_rule(
    kw: &'static str,
    pattern: ParsedPattern,
) -> impl FnMut(&str) -> IResult<&str, ParsedRule> {
    move |input| {
        map(preceded(lex(keyword(kw)), action), |action| ParsedRule {
            pattern: pattern.clone(),
            action,
        })(input)
    }
}

fn keyword<'a>(kw: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    terminated(
        tag(kw),
        not(satisfy(|c: char| c.is_ascii_alphanumeric() || c == '_')),
    )
}

fn regex_rule(input: &str) -> IResult<&str, ParsedRule> {
    map(pair(composite, action), |(term, action)| ParsedRule {
        pattern: ParsedPattern::Regex(term),
        action,
    })(input)
}

// A rule pattern is a whitespace-insensitive composition of regex literals,
// quoted strings, classes and alias references, with grouping, alternation
// and postfix modifiers.
fn composite(input: &str) -> IResult<&str, Term> {
    map(separated_list1(lex(char('|')), rx_parts), |alts| {
        fold_binary("OR", alts)
    })(input)
}

fn rx_parts(input: &str) -> IResult<&str, Term> {
    map(many1(rx_part), |parts| fold_binary("CAT", parts))(input)
}

fn rx_part(input: &str) -> IResult<&str, Term> {
    map(
        pair(
            lex(alt((rx_group, rx_regex, rx_string, class, rx_alias))),
            opt(modifier),
        ),
        |(term, modifier)| apply_modifier(term, modifier),
    )(input)
}

fn rx_group(input: &str) -> IResult<&str, Term> {
    delimited(char('('), composite, lex(char(')')))(input)
}

// A `/regex/` literal; the delimited text is handed to the regex grammar, and
// a malformed body is a hard failure pointing into the literal.
fn rx_regex(input: &str) -> IResult<&str, Term> {
    let (rest, inner) = delimited(
        char('/'),
        opt(escaped(is_not("/\\"), '\\', anychar)),
        char('/'),
    )(input)?;
    let inner = inner.unwrap_or("");
    match all_consuming(expression)(inner) {
        Ok((_, term)) => Ok((rest, term)),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(nom::Err::Failure(e)),
        Err(nom::Err::Incomplete(_)) => {
            Err(nom::Err::Failure(Error::new(inner, ErrorKind::Complete)))
        }
    }
}

// A quoted string matching its characters verbatim.
fn rx_string(input: &str) -> IResult<&str, Term> {
    map(
        delimited(
            char('"'),
            opt(escaped_string_body),
            char('"'),
        ),
        |body: Option<String>| Term::node("LITERAL", [body.unwrap_or_default().as_str().into()]),
    )(input)
}

fn escaped_string_body(input: &str) -> IResult<&str, String> {
    nom::bytes::complete::escaped_transform(is_not("\"\\"), '\\', recognize(anychar))(input)
}

fn rx_alias(input: &str) -> IResult<&str, Term> {
    map(identifier, |name: &str| {
        Term::node("ALIAS_REF", [name.into()])
    })(input)
}

// «entry | match | transition»
fn action(input: &str) -> IResult<&str, ParsedAction> {
    map(
        delimited(
            lex(char('«')),
            tuple((
                opt(action_term),
                lex(char('|')),
                opt(action_term),
                lex(char('|')),
                opt(transition),
            )),
            lex(char('»')),
        ),
        |(entry, _, token, _, transition)| ParsedAction {
            entry,
            token,
            transition,
        },
    )(input)
}

fn action_term(input: &str) -> IResult<&str, Term> {
    map(
        pair(
            lex(identifier),
            opt(delimited(
                lex(char('(')),
                separated_list0(lex(char(',')), lex(identifier)),
                lex(char(')')),
            )),
        ),
        |(name, args)| {
            Term::node(
                name,
                args.unwrap_or_default().into_iter().map(Into::into),
            )
        },
    )(input)
}

fn transition(input: &str) -> IResult<&str, String> {
    map(lex(identifier), str::to_string)(input)
}

// Lexeme helper: every token eats leading whitespace and comments.
fn lex<'a, O>(
    inner: impl FnMut(&'a str) -> IResult<&'a str, O>,
) -> impl FnMut(&'a str) -> IResult<&'a str, O> {
    preceded(sc, inner)
}

fn sc(input: &str) -> IResult<&str, ()> {
    value((), many0(alt((value((), multispace1), comment))))(input)
}

fn comment(input: &str) -> IResult<&str, ()> {
    value((), pair(char('#'), not_line_ending))(input)
}

#[cfg(test)]
mod tests {
    use crate::parser::{self, ParsedItem, ParsedPattern};
    use crate::term::Term;

    #[test]
    fn parses_aliases_and_states() {
        let file = parser::rules(
            "
            # a lexer specification
            digit = [0-9];
            <default>
                digit+ «| Number |»
                /[a-z]+/ «| Ident |»
            ",
        )
        .unwrap();
        assert_eq!(file.items.len(), 2);
        match &file.items[0] {
            ParsedItem::Alias { name, term } => {
                assert_eq!(name, "digit");
                assert_eq!(term.name(), "CLASS");
            }
            other => panic!("expected alias, got {other:?}"),
        }
        match &file.items[1] {
            ParsedItem::State { name, rules } => {
                assert_eq!(name, "default");
                assert_eq!(rules.len(), 2);
                match &rules[0].pattern {
                    ParsedPattern::Regex(term) => assert_eq!(term.name(), "ONE_OR_MORE"),
                    other => panic!("expected regex pattern, got {other:?}"),
                }
                assert_eq!(rules[0].action.token, Some(Term::leaf("Number")));
            }
            other => panic!("expected state, got {other:?}"),
        }
    }

    #[test]
    fn parses_action_block_parts() {
        let file = parser::rules(
            "<default> /a/ «Push(x) | Token | continue»",
        )
        .unwrap();
        let ParsedItem::State { rules, .. } = &file.items[0] else {
            panic!("expected state");
        };
        let action = &rules[0].action;
        assert_eq!(action.entry, Some(Term::node("Push", ["x".into()])));
        assert_eq!(action.token, Some(Term::leaf("Token")));
        assert_eq!(action.transition.as_deref(), Some("continue"));

        let file = parser::rules("<default> /a/ «| |»").unwrap();
        let ParsedItem::State { rules, .. } = &file.items[0] else {
            panic!("expected state");
        };
        assert!(rules[0].action.entry.is_none());
        assert!(rules[0].action.token.is_none());
        assert!(rules[0].action.transition.is_none());
    }

    #[test]
    fn parses_distinguished_rules() {
        let file = parser::rules(
            "<default>
                eos «| Eof |»
                catch_all «| Illegal |»
                default_action «| Skip |»
            ",
        )
        .unwrap();
        let ParsedItem::State { rules, .. } = &file.items[0] else {
            panic!("expected state");
        };
        assert!(matches!(rules[0].pattern, ParsedPattern::Eos));
        assert!(matches!(rules[1].pattern, ParsedPattern::CatchAll));
        assert!(matches!(rules[2].pattern, ParsedPattern::DefaultAction));
    }

    #[test]
    fn parses_strings_and_groups() {
        let file = parser::rules(r#"<default> ("ab" | /c/)+ «| T |»"#).unwrap();
        let ParsedItem::State { rules, .. } = &file.items[0] else {
            panic!("expected state");
        };
        let ParsedPattern::Regex(term) = &rules[0].pattern else {
            panic!("expected regex");
        };
        assert_eq!(term.name(), "ONE_OR_MORE");
        assert_eq!(term.term_arg(0).unwrap().name(), "OR");
    }

    #[test]
    fn reports_position_of_errors() {
        let err = parser::rules("<default>\n  /a «| T |»").unwrap_err();
        match err {
            parser::SyntaxError::Rule { line, .. } => assert_eq!(line, 2),
            other => panic!("expected rule error, got {other}"),
        }
    }

    #[test]
    fn rejects_unterminated_action() {
        assert!(parser::rules("<default> /a/ «| T ").is_err());
    }
}
