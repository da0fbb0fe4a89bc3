//! The expression parser.
//!
//! A shunting-yard parser over the token stream, evaluating as it reduces:
//! operators over literal operands fold to literals, anything else builds a
//! typed [`Expr`] node. Every operator and function application is checked
//! against an enumerated set of accepted type combinations; there is no
//! implicit promotion anywhere, so `1 + 1.0` is a type error.
//!
//! Operator precedence, highest binding first:
//!
//! | Precedence | Operators |
//! |---|---|
//! | 98 | unary `+` `-` `not` |
//! | 40 | `&&` |
//! | 30 | `\|\|` |
//! | 20 | `*` `/` `%` `.` |
//! | 10 | `+` `-` |
//! | 5  | `==` `!=` `<` `<=` `>` `>=` `~` `!~` `like` `unlike` |
//! | 0  | `and` |
//!
//! Note that the logical operators bind *tighter* than the relational ones,
//! unlike C-family languages; the table is the surface-language contract and
//! parenthesising relational operands is the norm.

use indexmap::IndexMap;
use regex::Regex;

use crate::expr::ast::{BinaryOp, Expr, FunctionDecl, Kind, UnaryOp, Value};
use crate::expr::tokenizer::{tokenize, Token};
use crate::expr::{ExprError, Scope};
use crate::ident::Ident;

/// One entry of the operator tables.
#[derive(Clone, Copy, Debug)]
struct OperatorDef {
    /// The spelling in the token stream (word operators folded).
    name: &'static str,
    /// Binding strength; larger binds tighter.
    precedence: u8,
    /// Right-associative operators never pop equal precedence.
    right_assoc: bool,
}

/// Binary operators, all left-associative.
const BINARY_OPERATORS: &[OperatorDef] = &[
    OperatorDef { name: "&&", precedence: 40, right_assoc: false },
    OperatorDef { name: "||", precedence: 30, right_assoc: false },
    OperatorDef { name: "*", precedence: 20, right_assoc: false },
    OperatorDef { name: "/", precedence: 20, right_assoc: false },
    OperatorDef { name: "%", precedence: 20, right_assoc: false },
    OperatorDef { name: ".", precedence: 20, right_assoc: false },
    OperatorDef { name: "+", precedence: 10, right_assoc: false },
    OperatorDef { name: "-", precedence: 10, right_assoc: false },
    OperatorDef { name: "==", precedence: 5, right_assoc: false },
    OperatorDef { name: "!=", precedence: 5, right_assoc: false },
    OperatorDef { name: "<", precedence: 5, right_assoc: false },
    OperatorDef { name: "<=", precedence: 5, right_assoc: false },
    OperatorDef { name: ">", precedence: 5, right_assoc: false },
    OperatorDef { name: ">=", precedence: 5, right_assoc: false },
    OperatorDef { name: "~", precedence: 5, right_assoc: false },
    OperatorDef { name: "!~", precedence: 5, right_assoc: false },
    OperatorDef { name: "like", precedence: 5, right_assoc: false },
    OperatorDef { name: "unlike", precedence: 5, right_assoc: false },
    OperatorDef { name: "and", precedence: 0, right_assoc: false },
];

/// Unary operators.
const UNARY_OPERATORS: &[OperatorDef] = &[
    OperatorDef { name: "+", precedence: 98, right_assoc: true },
    OperatorDef { name: "-", precedence: 98, right_assoc: true },
    OperatorDef { name: "not", precedence: 98, right_assoc: true },
];

/// Functions the parser knows without a declaration.
const BUILTIN_FUNCTIONS: &[&str] = &[
    "string_of_bool",
    "string_of_real",
    "string_of_int",
    "real_of_int",
    "int_of_real",
    "int_of_string",
    "if",
];

fn binary_def(name: &str) -> Option<OperatorDef> {
    BINARY_OPERATORS.iter().find(|def| def.name == name).copied()
}

fn unary_def(name: &str) -> Option<OperatorDef> {
    UNARY_OPERATORS.iter().find(|def| def.name == name).copied()
}

/// A pending function invocation, accumulating its argument count.
#[derive(Clone, Debug)]
struct CallFrame {
    name: Ident,
    argc: usize,
    line: usize,
}

/// Entries on the operator stack.
#[derive(Clone, Debug)]
enum StackEntry {
    Binary(OperatorDef),
    Unary(OperatorDef),
    OpenParen,
    Call(CallFrame),
}

/// Entries on the output (reduction) stack.
#[derive(Clone, Debug)]
enum OutEntry {
    Operand(Expr),
    Binary(OperatorDef),
    Unary(OperatorDef),
    Call(CallFrame),
}

/// The kind of the previously consumed token, for unary detection and
/// adjacency checks.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Prev {
    None,
    Operand,
    Operator,
    OpenParen,
    CloseParen,
    Separator,
    Function,
    Newline,
}

/// An expression parser bound to one scope.
#[derive(Clone, Copy, Debug)]
pub struct Parser<'a> {
    scope: Scope<'a>,
    functions: &'a IndexMap<Ident, FunctionDecl>,
    allow_regexp: bool,
}

impl<'a> Parser<'a> {
    /// Create a parser for the given scope and declared functions.
    #[must_use]
    pub fn new(
        scope: Scope<'a>,
        functions: &'a IndexMap<Ident, FunctionDecl>,
        allow_regexp: bool,
    ) -> Self {
        Self {
            scope,
            functions,
            allow_regexp,
        }
    }

    /// Tokenise and parse one expression.
    ///
    /// # Errors
    /// On any tokenise, parse or type failure; see [`ExprError`].
    pub fn parse_source(&self, source: &str) -> Result<Expr, ExprError> {
        let tokens = tokenize(source, &self.scope)?;
        self.parse(tokens)
    }

    /// Parse a token stream.
    ///
    /// # Errors
    /// On any parse or type failure; see [`ExprError`].
    pub fn parse(&self, tokens: Vec<Token>) -> Result<Expr, ExprError> {
        let mut line = 1_usize;
        let mut prev = Prev::None;
        let mut output: Vec<OutEntry> = Vec::new();
        let mut stack: Vec<StackEntry> = Vec::new();

        for token in tokens {
            match token {
                Token::Newline => {
                    line += 1;
                    prev = Prev::Newline;
                }
                Token::Function(name) => {
                    let known = BUILTIN_FUNCTIONS.contains(&name.folded())
                        || self.functions.contains_key(&name);
                    if !known {
                        return Err(ExprError::UnknownFunction {
                            name: name.to_string(),
                            line,
                        });
                    }
                    stack.push(StackEntry::Call(CallFrame {
                        name,
                        argc: 0,
                        line,
                    }));
                    prev = Prev::Function;
                }
                Token::Separator => {
                    if matches!(
                        prev,
                        Prev::None | Prev::OpenParen | Prev::Separator | Prev::Operator
                    ) {
                        return Err(ExprError::MismatchedParentheses { line });
                    }

                    while let Some(top) = stack.last() {
                        if matches!(top, StackEntry::OpenParen) {
                            break;
                        }
                        push_to_output(&mut output, stack.pop());
                    }

                    let len = stack.len();
                    if len < 2
                        || !matches!(stack[len - 1], StackEntry::OpenParen)
                        || !matches!(stack[len - 2], StackEntry::Call(_))
                    {
                        return Err(ExprError::MismatchedParentheses { line });
                    }
                    if let StackEntry::Call(frame) = &mut stack[len - 2] {
                        if frame.argc == 0 {
                            frame.argc += 1;
                        }
                        frame.argc += 1;
                    }
                    prev = Prev::Separator;
                }
                Token::Operator(spelling) => {
                    let unary_position = matches!(
                        prev,
                        Prev::None | Prev::Operator | Prev::OpenParen | Prev::Separator
                    );
                    let (entry, def) = if unary_position {
                        let def =
                            unary_def(&spelling).ok_or_else(|| ExprError::UnknownOperator {
                                operator: spelling.clone(),
                                line,
                            })?;
                        (StackEntry::Unary(def), def)
                    } else {
                        let def =
                            binary_def(&spelling).ok_or_else(|| ExprError::UnknownOperator {
                                operator: spelling.clone(),
                                line,
                            })?;
                        (StackEntry::Binary(def), def)
                    };

                    while let Some(top) = stack.last() {
                        let top_precedence = match top {
                            StackEntry::Binary(top) | StackEntry::Unary(top) => top.precedence,
                            _ => break,
                        };
                        let pops = (!def.right_assoc && def.precedence == top_precedence)
                            || def.precedence < top_precedence;
                        if !pops {
                            break;
                        }
                        push_to_output(&mut output, stack.pop());
                    }

                    stack.push(entry);
                    prev = Prev::Operator;
                }
                Token::OpenParen => {
                    stack.push(StackEntry::OpenParen);
                    prev = Prev::OpenParen;
                }
                Token::CloseParen => {
                    if prev == Prev::Separator {
                        return Err(ExprError::MismatchedParentheses { line });
                    }

                    loop {
                        match stack.last() {
                            None => return Err(ExprError::MismatchedParentheses { line }),
                            Some(StackEntry::OpenParen) => {
                                stack.pop();
                                break;
                            }
                            Some(_) => push_to_output(&mut output, stack.pop()),
                        }
                    }

                    if matches!(stack.last(), Some(StackEntry::Call(_))) {
                        if let Some(StackEntry::Call(mut frame)) = stack.pop() {
                            if prev != Prev::OpenParen && frame.argc == 0 {
                                frame.argc = 1;
                            }
                            output.push(OutEntry::Call(frame));
                        }
                    }
                    prev = Prev::CloseParen;
                }
                Token::Literal(value) => {
                    if prev == Prev::Operand {
                        return Err(ExprError::ExtraInput);
                    }
                    output.push(OutEntry::Operand(Expr::Literal(value)));
                    prev = Prev::Operand;
                }
                Token::Leaf(expr) => {
                    if prev == Prev::Operand {
                        return Err(ExprError::ExtraInput);
                    }
                    output.push(OutEntry::Operand(expr));
                    prev = Prev::Operand;
                }
            }
        }

        while let Some(entry) = stack.pop() {
            if matches!(entry, StackEntry::OpenParen) {
                return Err(ExprError::MismatchedParentheses { line });
            }
            push_to_output(&mut output, Some(entry));
        }

        let result = self.reduce(&mut output, line)?;
        if !output.is_empty() {
            return Err(ExprError::ExtraInput);
        }

        Ok(result)
    }

    /// Evaluate the operator or function on top of the output stack.
    fn reduce(&self, output: &mut Vec<OutEntry>, line: usize) -> Result<Expr, ExprError> {
        match output.pop() {
            None => Err(ExprError::Empty),
            Some(OutEntry::Operand(expr)) => Ok(expr),
            Some(OutEntry::Unary(def)) => {
                if output.is_empty() {
                    return Err(ExprError::MissingOperand {
                        operator: def.name.to_owned(),
                        line,
                    });
                }
                let operand = self.reduce(output, line)?;
                self.apply_unary(def.name, operand)
            }
            Some(OutEntry::Binary(def)) => {
                if output.len() < 2 {
                    return Err(ExprError::MissingOperand {
                        operator: def.name.to_owned(),
                        line,
                    });
                }
                let rhs = self.reduce(output, line)?;
                let lhs = self.reduce(output, line)?;
                self.apply_binary(def.name, lhs, rhs)
            }
            Some(OutEntry::Call(frame)) => {
                let mut args = Vec::with_capacity(frame.argc);
                for _ in 0..frame.argc {
                    if output.is_empty() {
                        return Err(ExprError::MissingOperand {
                            operator: frame.name.to_string(),
                            line: frame.line,
                        });
                    }
                    args.push(self.reduce(output, line)?);
                }
                args.reverse();
                self.apply_function(&frame.name, args, frame.line)
            }
        }
    }

    /// Type-check and apply (or fold) one binary operator.
    fn apply_binary(&self, name: &str, lhs: Expr, rhs: Expr) -> Result<Expr, ExprError> {
        let kinds = (lhs.kind(), rhs.kind());
        let type_error = || ExprError::InvalidOperatorTypes {
            operator: name.to_owned(),
            types: format!("{} and {}", kinds.0, kinds.1),
        };

        match name {
            "+" | "-" | "*" | "/" => {
                if !matches!(kinds, (Kind::Int, Kind::Int) | (Kind::Real, Kind::Real)) {
                    return Err(type_error());
                }
                if let (Some(left), Some(right)) = (lhs.as_literal(), rhs.as_literal()) {
                    return fold_arithmetic(name, left, right);
                }
                Ok(binary(arithmetic_op(name), lhs, rhs, kinds.0))
            }
            "%" => {
                if kinds != (Kind::Int, Kind::Int) {
                    return Err(type_error());
                }
                if let (Some(Value::Int(left)), Some(Value::Int(right))) =
                    (lhs.as_literal(), rhs.as_literal())
                {
                    if *right == 0 {
                        return Err(ExprError::DivisionByZero);
                    }
                    return Ok(Expr::Literal(Value::Int(left % right)));
                }
                Ok(binary(BinaryOp::Mod, lhs, rhs, Kind::Int))
            }
            "==" | "!=" | "<" | "<=" | ">" | ">=" => {
                if kinds.0 != kinds.1 {
                    return Err(type_error());
                }
                if let (Some(left), Some(right)) = (lhs.as_literal(), rhs.as_literal()) {
                    return Ok(Expr::Literal(Value::Bool(compare(name, left, right))));
                }
                Ok(binary(relational_op(name), lhs, rhs, Kind::Bool))
            }
            "&&" | "||" => {
                if kinds != (Kind::Bool, Kind::Bool) {
                    return Err(type_error());
                }
                if let (Some(Value::Bool(left)), Some(Value::Bool(right))) =
                    (lhs.as_literal(), rhs.as_literal())
                {
                    let folded = if name == "&&" {
                        *left && *right
                    } else {
                        *left || *right
                    };
                    return Ok(Expr::Literal(Value::Bool(folded)));
                }
                let op = if name == "&&" { BinaryOp::And } else { BinaryOp::Or };
                Ok(binary(op, lhs, rhs, Kind::Bool))
            }
            "~" | "!~" => {
                if kinds != (Kind::Str, Kind::Str) {
                    return Err(type_error());
                }
                if !self.allow_regexp {
                    return Err(ExprError::RegexpDisabled);
                }
                if let Some(Value::Str(pattern)) = rhs.as_literal() {
                    Regex::new(pattern)
                        .map_err(|cause| ExprError::InvalidRegexp(cause.to_string()))?;

                    if let Some(Value::Str(subject)) = lhs.as_literal() {
                        let anchored = Regex::new(&format!("\\A(?:{pattern})"))
                            .map_err(|cause| ExprError::InvalidRegexp(cause.to_string()))?;
                        let matched = anchored.is_match(subject);
                        let folded = if name == "~" { matched } else { !matched };
                        return Ok(Expr::Literal(Value::Bool(folded)));
                    }
                }
                let op = if name == "~" { BinaryOp::Regexp } else { BinaryOp::NotRegexp };
                Ok(binary(op, lhs, rhs, Kind::Bool))
            }
            "like" | "unlike" => {
                if kinds != (Kind::Str, Kind::Str) {
                    return Err(type_error());
                }
                if let (Some(Value::Str(subject)), Some(Value::Str(pattern))) =
                    (lhs.as_literal(), rhs.as_literal())
                {
                    let matched = like_matches(subject, pattern);
                    let folded = if name == "like" { matched } else { !matched };
                    return Ok(Expr::Literal(Value::Bool(folded)));
                }
                let op = if name == "like" { BinaryOp::Like } else { BinaryOp::NotLike };
                Ok(binary(op, lhs, rhs, Kind::Bool))
            }
            "and" => {
                if kinds != (Kind::Bool, Kind::Bool) {
                    return Err(type_error());
                }
                if self.scope.this().is_none() {
                    return Err(ExprError::JoinOutsideMatch);
                }
                Ok(Expr::Join {
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                })
            }
            "." => {
                if kinds != (Kind::Str, Kind::Str) {
                    return Err(type_error());
                }
                if let (Some(Value::Str(left)), Some(Value::Str(right))) =
                    (lhs.as_literal(), rhs.as_literal())
                {
                    return Ok(Expr::Literal(Value::Str(format!("{left}{right}"))));
                }
                Ok(binary(BinaryOp::Concat, lhs, rhs, Kind::Str))
            }
            _ => unreachable!("operator '{name}' missing from the table"),
        }
    }

    /// Type-check and apply (or fold) one unary operator.
    fn apply_unary(&self, name: &str, operand: Expr) -> Result<Expr, ExprError> {
        let kind = operand.kind();
        let type_error = || ExprError::InvalidOperatorTypes {
            operator: name.to_owned(),
            types: kind.to_string(),
        };

        match name {
            "+" => {
                if !kind.is_numeric() {
                    return Err(type_error());
                }
                Ok(operand)
            }
            "-" => {
                if !kind.is_numeric() {
                    return Err(type_error());
                }
                match operand.as_literal() {
                    Some(Value::Int(value)) => Ok(Expr::Literal(Value::Int(-value))),
                    Some(Value::Real(value)) => Ok(Expr::Literal(Value::Real(-value))),
                    _ => Ok(Expr::Unary {
                        op: UnaryOp::Neg,
                        operand: Box::new(operand),
                        kind,
                    }),
                }
            }
            "not" => {
                if kind != Kind::Bool {
                    return Err(type_error());
                }
                match operand.as_literal() {
                    Some(Value::Bool(value)) => Ok(Expr::Literal(Value::Bool(!value))),
                    _ => Ok(Expr::Unary {
                        op: UnaryOp::Not,
                        operand: Box::new(operand),
                        kind: Kind::Bool,
                    }),
                }
            }
            _ => unreachable!("operator '{name}' missing from the table"),
        }
    }

    /// Apply (or fold) one function invocation.
    fn apply_function(
        &self,
        name: &Ident,
        args: Vec<Expr>,
        line: usize,
    ) -> Result<Expr, ExprError> {
        match name.folded() {
            "string_of_bool" => builtin_cast(name, args, Kind::Bool, Kind::Str, |value| {
                let Value::Bool(value) = value else { unreachable!() };
                let spelled = if *value { "true" } else { "false" };
                Ok(Value::Str(spelled.to_owned()))
            }),
            "string_of_real" => builtin_cast(name, args, Kind::Real, Kind::Str, |value| {
                let Value::Real(value) = value else { unreachable!() };
                Ok(Value::Str(format!("{value:?}")))
            }),
            "string_of_int" => builtin_cast(name, args, Kind::Int, Kind::Str, |value| {
                let Value::Int(value) = value else { unreachable!() };
                Ok(Value::Str(value.to_string()))
            }),
            "real_of_int" => builtin_cast(name, args, Kind::Int, Kind::Real, |value| {
                let Value::Int(value) = value else { unreachable!() };
                #[allow(clippy::cast_precision_loss)]
                let widened = *value as f64;
                Ok(Value::Real(widened))
            }),
            "int_of_real" => builtin_cast(name, args, Kind::Real, Kind::Int, |value| {
                let Value::Real(value) = value else { unreachable!() };
                #[allow(clippy::cast_possible_truncation)]
                let truncated = value.trunc() as i64;
                Ok(Value::Int(truncated))
            }),
            "int_of_string" => builtin_cast(name, args, Kind::Str, Kind::Int, |value| {
                let Value::Str(text) = value else { unreachable!() };
                text.trim()
                    .parse::<i64>()
                    .map(Value::Int)
                    .map_err(|_| ExprError::InvalidIntLiteral(text.clone()))
            }),
            "if" => self.apply_if(name, args),
            _ => {
                let Some(decl) = self.functions.get(name) else {
                    return Err(ExprError::UnknownFunction {
                        name: name.to_string(),
                        line,
                    });
                };

                if args.len() != decl.params().len() {
                    return Err(ExprError::FunctionArity(name.to_string()));
                }

                let agrees = args
                    .iter()
                    .zip(decl.params())
                    .all(|(arg, param)| arg.kind() == *param);
                if !agrees {
                    return Err(ExprError::InvalidFunctionTypes {
                        function: name.to_string(),
                        types: kinds_text(&args),
                    });
                }

                Ok(Expr::Call {
                    name: name.clone(),
                    external: decl.external().to_owned(),
                    args,
                    kind: decl.returns(),
                })
            }
        }
    }

    /// The ternary `if(pred, then, else)`.
    fn apply_if(&self, name: &Ident, args: Vec<Expr>) -> Result<Expr, ExprError> {
        if args.len() != 3 {
            return Err(ExprError::FunctionArity(name.to_string()));
        }

        let mut args = args.into_iter();
        let (predicate, then, otherwise) = match (args.next(), args.next(), args.next()) {
            (Some(predicate), Some(then), Some(otherwise)) => (predicate, then, otherwise),
            _ => return Err(ExprError::FunctionArity(name.to_string())),
        };

        if predicate.kind() != Kind::Bool || then.kind() != otherwise.kind() {
            return Err(ExprError::InvalidFunctionTypes {
                function: name.to_string(),
                types: format!(
                    "{} and {} and {}",
                    predicate.kind(),
                    then.kind(),
                    otherwise.kind()
                ),
            });
        }

        if let Some(Value::Bool(value)) = predicate.as_literal() {
            return Ok(if *value { then } else { otherwise });
        }

        let kind = then.kind();
        Ok(Expr::If {
            predicate: Box::new(predicate),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
            kind,
        })
    }
}

/// Parse one expression source string in the given scope.
///
/// # Errors
/// On any tokenise, parse or type failure; see [`ExprError`].
pub fn parse_expression(
    source: &str,
    scope: Scope<'_>,
    functions: &IndexMap<Ident, FunctionDecl>,
    allow_regexp: bool,
) -> Result<Expr, ExprError> {
    Parser::new(scope, functions, allow_regexp).parse_source(source)
}

/// Move one popped operator-stack entry onto the output stack.
fn push_to_output(output: &mut Vec<OutEntry>, entry: Option<StackEntry>) {
    match entry {
        Some(StackEntry::Binary(def)) => output.push(OutEntry::Binary(def)),
        Some(StackEntry::Unary(def)) => output.push(OutEntry::Unary(def)),
        Some(StackEntry::Call(frame)) => output.push(OutEntry::Call(frame)),
        Some(StackEntry::OpenParen) | None => {}
    }
}

/// Build a binary node.
fn binary(op: BinaryOp, lhs: Expr, rhs: Expr, kind: Kind) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
        kind,
    }
}

fn arithmetic_op(name: &str) -> BinaryOp {
    match name {
        "+" => BinaryOp::Add,
        "-" => BinaryOp::Sub,
        "*" => BinaryOp::Mul,
        _ => BinaryOp::Div,
    }
}

fn relational_op(name: &str) -> BinaryOp {
    match name {
        "==" => BinaryOp::Eq,
        "!=" => BinaryOp::Ne,
        "<" => BinaryOp::Lt,
        "<=" => BinaryOp::Le,
        ">" => BinaryOp::Gt,
        _ => BinaryOp::Ge,
    }
}

/// Fold arithmetic over two literals of the same numeric kind. Integer
/// division truncates, as it will in the generated SQL.
fn fold_arithmetic(name: &str, lhs: &Value, rhs: &Value) -> Result<Expr, ExprError> {
    let value = match (lhs, rhs) {
        (Value::Int(left), Value::Int(right)) => {
            let folded = match name {
                "+" => left.checked_add(*right),
                "-" => left.checked_sub(*right),
                "*" => left.checked_mul(*right),
                _ => {
                    if *right == 0 {
                        return Err(ExprError::DivisionByZero);
                    }
                    left.checked_div(*right)
                }
            };
            Value::Int(folded.ok_or_else(|| {
                ExprError::InvalidNumber(format!("{left} {name} {right}"))
            })?)
        }
        (Value::Real(left), Value::Real(right)) => {
            let folded = match name {
                "+" => left + right,
                "-" => left - right,
                "*" => left * right,
                _ => {
                    if *right == 0.0 {
                        return Err(ExprError::DivisionByZero);
                    }
                    left / right
                }
            };
            Value::Real(folded)
        }
        _ => unreachable!("arithmetic operands were type-checked"),
    };

    Ok(Expr::Literal(value))
}

/// Compare two literals of the same kind.
fn compare(name: &str, lhs: &Value, rhs: &Value) -> bool {
    use std::cmp::Ordering;

    let ordering = match (lhs, rhs) {
        (Value::Bool(left), Value::Bool(right)) => left.cmp(right),
        (Value::Int(left), Value::Int(right)) => left.cmp(right),
        (Value::Real(left), Value::Real(right)) => {
            left.partial_cmp(right).unwrap_or(Ordering::Greater)
        }
        (Value::Str(left), Value::Str(right)) => left.cmp(right),
        _ => unreachable!("comparison operands were type-checked"),
    };

    match name {
        "==" => ordering == Ordering::Equal,
        "!=" => ordering != Ordering::Equal,
        "<" => ordering == Ordering::Less,
        "<=" => ordering != Ordering::Greater,
        ">" => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    }
}

/// Whether `subject` matches the SQL wildcard `pattern` (`%` and `_`).
fn like_matches(subject: &str, pattern: &str) -> bool {
    let mut translated = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '%' => translated.push_str(".*"),
            '_' => translated.push('.'),
            other => translated.push_str(&regex::escape(&other.to_string())),
        }
    }
    translated.push('$');

    Regex::new(&translated).is_ok_and(|compiled| compiled.is_match(subject))
}

/// The argument kinds as diagnostic text: `integer and real`.
fn kinds_text(args: &[Expr]) -> String {
    args.iter()
        .map(|arg| arg.kind().to_string())
        .collect::<Vec<_>>()
        .join(" and ")
}

/// Fold or build one built-in conversion.
fn builtin_cast(
    name: &Ident,
    mut args: Vec<Expr>,
    from: Kind,
    to: Kind,
    fold: impl Fn(&Value) -> Result<Value, ExprError>,
) -> Result<Expr, ExprError> {
    if args.len() != 1 {
        return Err(ExprError::FunctionArity(name.to_string()));
    }
    let arg = args.swap_remove(0);

    if arg.kind() != from {
        return Err(ExprError::InvalidFunctionTypes {
            function: name.to_string(),
            types: arg.kind().to_string(),
        });
    }

    if let Some(value) = arg.as_literal() {
        return fold(value).map(Expr::Literal);
    }

    Ok(Expr::Cast {
        expr: Box::new(arg),
        kind: to,
    })
}
