//! The expression token layer.
//!
//! Tokenising resolves names as it goes: `Constants.X` becomes the
//! constant's literal value, `This.X` and `Locals.X` become typed reference
//! leaves, and unknown names fail immediately. Resolving this early keeps
//! the parser free to fold constants aggressively.
//!
//! Longest-match behaviour falls out of the rule order below: references
//! before bare words, reals before integers, and multi-character operators
//! before their single-character prefixes. Words are always consumed whole
//! and classified afterwards, so `trueish` is a function name and not the
//! literal `true` followed by garbage.

use nom::branch::alt;
use nom::bytes::complete::{tag, tag_no_case, take_while, take_while_m_n};
use nom::character::complete::{char, digit1, one_of, satisfy};
use nom::combinator::{opt, recognize};
use nom::sequence::{delimited, pair, preceded, tuple};
use nom::IResult;

use crate::expr::ast::{Expr, Value};
use crate::expr::{ExprError, Scope};
use crate::ident::Ident;

/// One token of an expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    /// A literal: a number, boolean, string, or resolved constant.
    Literal(Value),
    /// A resolved `This.X` or `Locals.X` reference.
    Leaf(Expr),
    /// An operator, spelled as written (word operators are folded).
    Operator(String),
    /// A function name.
    Function(Ident),
    /// `(`.
    OpenParen,
    /// `)`.
    CloseParen,
    /// `,` between function arguments.
    Separator,
    /// A line break, kept so the parser can report line numbers.
    Newline,
}

/// A language name: a letter followed by letters and digits.
fn name(i: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| c.is_ascii_alphabetic()),
        take_while(|c: char| c.is_ascii_alphanumeric()),
    ))(i)
}

/// A word as used for functions and word operators: a letter followed by
/// letters, digits and underscores.
fn word(i: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| c.is_ascii_alphabetic()),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))(i)
}

/// A namespaced reference: `Constants.X`, `This.X` or `Locals.X`.
fn reference(i: &str) -> IResult<&str, (&str, &str)> {
    let (i, (namespace, _, member)) = tuple((
        alt((
            tag_no_case("constants"),
            tag_no_case("this"),
            tag_no_case("locals"),
        )),
        char('.'),
        name,
    ))(i)?;

    Ok((i, (namespace, member)))
}

/// A real literal: digits, a point, digits, and an optional exponent.
fn real(i: &str) -> IResult<&str, &str> {
    recognize(tuple((
        digit1,
        char('.'),
        digit1,
        opt(tuple((one_of("eE"), opt(char('-')), digit1))),
    )))(i)
}

/// A quoted string; either quote style, no escapes.
fn quoted(i: &str) -> IResult<&str, &str> {
    alt((
        delimited(char('\''), take_while(|c| c != '\''), char('\'')),
        delimited(char('"'), take_while(|c| c != '"'), char('"')),
    ))(i)
}

/// A `$hh` character escape.
fn char_escape(i: &str) -> IResult<&str, &str> {
    preceded(
        char('$'),
        take_while_m_n(2, 2, |c: char| c.is_ascii_hexdigit()),
    )(i)
}

/// An operator; multi-character spellings come first so they win.
fn operator(i: &str) -> IResult<&str, &str> {
    alt((
        tag("!~"),
        tag("=="),
        tag("!="),
        tag("<="),
        tag(">="),
        tag("&&"),
        tag("||"),
        tag("~"),
        tag("<"),
        tag(">"),
        tag("="),
        tag("!"),
        tag("+"),
        tag("-"),
        tag("*"),
        tag("/"),
        tag("%"),
        tag("."),
    ))(i)
}

/// Resolve a namespaced reference against the scope.
fn resolve(namespace: &str, member: &str, scope: &Scope<'_>) -> Result<Token, ExprError> {
    let written = format!("{namespace}.{member}");
    let key = Ident::new(member);

    match namespace.to_lowercase().as_str() {
        "constants" => scope
            .constants()
            .get(&key)
            .map(|value| Token::Literal(value.clone()))
            .ok_or(ExprError::UnknownConstant(written)),
        "this" => scope
            .this()
            .and_then(|fields| fields.get(&key))
            .map(|kind| {
                Token::Leaf(Expr::This {
                    field: key.clone(),
                    kind: *kind,
                })
            })
            .ok_or(ExprError::UnknownField(written)),
        _ => scope
            .locals()
            .get(&key)
            .map(|kind| {
                Token::Leaf(Expr::Local {
                    name: key.clone(),
                    kind: *kind,
                })
            })
            .ok_or(ExprError::UnknownVariable(written)),
    }
}

/// Classify a whole word as a literal, a word operator, or a function name.
fn classify(text: &str) -> Token {
    match text.to_lowercase().as_str() {
        "true" => Token::Literal(Value::Bool(true)),
        "false" => Token::Literal(Value::Bool(false)),
        folded @ ("and" | "not" | "like" | "unlike") => Token::Operator(folded.to_owned()),
        _ => Token::Function(Ident::new(text)),
    }
}

/// Tokenise one expression, resolving references against `scope`.
///
/// The token stream is single-use: tokenise, parse, discard.
///
/// # Errors
/// On untokenisable input, or on a reference to an unknown constant, field
/// or variable.
pub fn tokenize(source: &str, scope: &Scope<'_>) -> Result<Vec<Token>, ExprError> {
    let mut rest = source;
    let mut tokens = Vec::new();

    loop {
        rest = rest.trim_start_matches(|c: char| matches!(c, ' ' | '\t' | '\r' | '\x0B'));

        if let Some(comment) = rest.strip_prefix('#') {
            rest = comment.find('\n').map_or("", |end| &comment[end..]);
            continue;
        }

        if rest.is_empty() {
            break;
        }

        if let Some(after) = rest.strip_prefix('\n') {
            tokens.push(Token::Newline);
            rest = after;
            continue;
        }

        if let Some(after) = rest.strip_prefix('(') {
            tokens.push(Token::OpenParen);
            rest = after;
            continue;
        }

        if let Some(after) = rest.strip_prefix(')') {
            tokens.push(Token::CloseParen);
            rest = after;
            continue;
        }

        if let Some(after) = rest.strip_prefix(',') {
            tokens.push(Token::Separator);
            rest = after;
            continue;
        }

        if let Ok((after, (namespace, member))) = reference(rest) {
            tokens.push(resolve(namespace, member, scope)?);
            rest = after;
            continue;
        }

        if let Ok((after, text)) = real(rest) {
            let value = text
                .parse::<f64>()
                .map_err(|_| ExprError::InvalidNumber(text.to_owned()))?;
            tokens.push(Token::Literal(Value::Real(value)));
            rest = after;
            continue;
        }

        if let Ok((after, text)) = digit1::<&str, nom::error::Error<&str>>(rest) {
            let value = text
                .parse::<i64>()
                .map_err(|_| ExprError::InvalidNumber(text.to_owned()))?;
            tokens.push(Token::Literal(Value::Int(value)));
            rest = after;
            continue;
        }

        if let Ok((after, text)) = quoted(rest) {
            tokens.push(Token::Literal(Value::Str(text.to_owned())));
            rest = after;
            continue;
        }

        if let Ok((after, digits)) = char_escape(rest) {
            let code = u32::from_str_radix(digits, 16)
                .map_err(|_| ExprError::InvalidNumber(digits.to_owned()))?;
            let escaped = char::from_u32(code)
                .ok_or_else(|| ExprError::InvalidNumber(digits.to_owned()))?;
            tokens.push(Token::Literal(Value::Str(escaped.to_string())));
            rest = after;
            continue;
        }

        if let Ok((after, text)) = word(rest) {
            tokens.push(classify(text));
            rest = after;
            continue;
        }

        if let Ok((after, text)) = operator(rest) {
            tokens.push(Token::Operator(text.to_owned()));
            rest = after;
            continue;
        }

        return Err(ExprError::UnknownToken(rest.to_owned()));
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    use crate::expr::ast::Kind;

    use super::*;

    fn empty_scope_parts() -> (IndexMap<Ident, Value>, IndexMap<Ident, Kind>) {
        (IndexMap::new(), IndexMap::new())
    }

    #[test]
    fn numbers_operators_and_parens() {
        let (constants, locals) = empty_scope_parts();
        let scope = Scope::new(&constants, &locals, None);
        let tokens = tokenize("1 + (2 * 3)", &scope).expect("tokenises");
        assert_eq!(
            tokens,
            vec![
                Token::Literal(Value::Int(1)),
                Token::Operator("+".to_owned()),
                Token::OpenParen,
                Token::Literal(Value::Int(2)),
                Token::Operator("*".to_owned()),
                Token::Literal(Value::Int(3)),
                Token::CloseParen,
            ]
        );
    }

    #[test]
    fn reals_win_over_integers() {
        let (constants, locals) = empty_scope_parts();
        let scope = Scope::new(&constants, &locals, None);
        assert_eq!(
            tokenize("1.25e-3", &scope).expect("tokenises"),
            vec![Token::Literal(Value::Real(1.25e-3))]
        );
        assert_eq!(
            tokenize("12", &scope).expect("tokenises"),
            vec![Token::Literal(Value::Int(12))]
        );
    }

    #[test_case("TRUE", Value::Bool(true))]
    #[test_case("false", Value::Bool(false))]
    #[test_case("'it''s'", Value::Str("it".to_owned()); "single quotes do not escape")]
    #[test_case("\"quoted\"", Value::Str("quoted".to_owned()))]
    #[test_case("$41", Value::Str("A".to_owned()); "hex character escape")]
    fn literal_forms(source: &str, expected: Value) {
        let (constants, locals) = empty_scope_parts();
        let scope = Scope::new(&constants, &locals, None);
        let tokens = tokenize(source, &scope).expect("tokenises");
        assert_eq!(tokens.first(), Some(&Token::Literal(expected)));
    }

    #[test]
    fn words_become_operators_or_functions() {
        let (constants, locals) = empty_scope_parts();
        let scope = Scope::new(&constants, &locals, None);
        let tokens = tokenize("a like b unlike if", &scope).expect("tokenises");
        assert_eq!(
            tokens,
            vec![
                Token::Function(Ident::new("a")),
                Token::Operator("like".to_owned()),
                Token::Function(Ident::new("b")),
                Token::Operator("unlike".to_owned()),
                Token::Function(Ident::new("if")),
            ]
        );
    }

    #[test]
    fn comments_are_skipped_to_end_of_line() {
        let (constants, locals) = empty_scope_parts();
        let scope = Scope::new(&constants, &locals, None);
        let tokens = tokenize("# leading\n1 # trailing", &scope).expect("tokenises");
        assert_eq!(tokens, vec![Token::Newline, Token::Literal(Value::Int(1))]);
    }

    #[test]
    fn constants_resolve_to_their_values() {
        let (mut constants, locals) = empty_scope_parts();
        constants.insert(Ident::new("Limit"), Value::Int(30));
        let scope = Scope::new(&constants, &locals, None);
        assert_eq!(
            tokenize("Constants.LIMIT", &scope).expect("tokenises"),
            vec![Token::Literal(Value::Int(30))]
        );
    }

    #[test]
    fn this_references_need_a_match_scope() {
        let (constants, locals) = empty_scope_parts();
        let mut fields = IndexMap::new();
        fields.insert(Ident::new("User"), Kind::Str);

        let with_this = Scope::new(&constants, &locals, Some(&fields));
        assert_eq!(
            tokenize("This.User", &with_this).expect("tokenises"),
            vec![Token::Leaf(Expr::This {
                field: Ident::new("User"),
                kind: Kind::Str,
            })]
        );

        let without = Scope::new(&constants, &locals, None);
        assert_eq!(
            tokenize("This.User", &without),
            Err(ExprError::UnknownField("This.User".to_owned()))
        );
    }

    #[test]
    fn unknown_names_fail_at_tokenise_time() {
        let (constants, locals) = empty_scope_parts();
        let scope = Scope::new(&constants, &locals, None);
        assert_eq!(
            tokenize("Constants.Missing", &scope),
            Err(ExprError::UnknownConstant("Constants.Missing".to_owned()))
        );
        assert_eq!(
            tokenize("Locals.Missing", &scope),
            Err(ExprError::UnknownVariable("Locals.Missing".to_owned()))
        );
    }

    #[test]
    fn untokenisable_input_is_reported() {
        let (constants, locals) = empty_scope_parts();
        let scope = Scope::new(&constants, &locals, None);
        assert_eq!(
            tokenize("1 @ 2", &scope),
            Err(ExprError::UnknownToken("@ 2".to_owned()))
        );
    }
}
