//! The expression language.
//!
//! Expressions appear in rule documents as `!expr` strings and are evaluated
//! in three steps: the [`tokenizer`] resolves references and produces a token
//! stream, the [`parser`] applies operator precedence and type checking while
//! folding constants, and the result is either a literal (when everything
//! folded away) or an [`ast::Expr`] tree for the backend to lower.

use indexmap::IndexMap;
use thiserror::Error;

use crate::expr::ast::{Kind, Value};
use crate::ident::Ident;

pub mod ast;
pub mod parser;
pub mod tokenizer;

/// The names visible to an expression.
///
/// Constants resolve to their literal values, locals and `This` fields to
/// typed reference leaves. A missing `This` scope means the expression is not
/// inside a match clause, which also forbids the join operator `and`.
#[derive(Clone, Copy, Debug)]
pub struct Scope<'a> {
    constants: &'a IndexMap<Ident, Value>,
    locals: &'a IndexMap<Ident, Kind>,
    this: Option<&'a IndexMap<Ident, Kind>>,
}

impl<'a> Scope<'a> {
    /// Create a scope from the given name tables.
    #[must_use]
    pub fn new(
        constants: &'a IndexMap<Ident, Value>,
        locals: &'a IndexMap<Ident, Kind>,
        this: Option<&'a IndexMap<Ident, Kind>>,
    ) -> Self {
        Self {
            constants,
            locals,
            this,
        }
    }

    /// The defined constants.
    #[must_use]
    pub fn constants(&self) -> &IndexMap<Ident, Value> {
        self.constants
    }

    /// The local variables in scope.
    #[must_use]
    pub fn locals(&self) -> &IndexMap<Ident, Kind> {
        self.locals
    }

    /// The fields of the fact being matched, when inside a match clause.
    #[must_use]
    pub fn this(&self) -> Option<&IndexMap<Ident, Kind>> {
        self.this
    }
}

/// Failures while tokenising, parsing or type-checking an expression.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExprError {
    /// Input that no token rule matched.
    #[error("Unknown input: '{0}'")]
    UnknownToken(String),
    /// A `Constants.X` reference to an undefined constant.
    #[error("Unknown constant: '{0}'")]
    UnknownConstant(String),
    /// A `This.X` reference to a field the matched fact does not have.
    #[error("Unknown field: '{0}'")]
    UnknownField(String),
    /// A `Locals.X` reference to an unbound local.
    #[error("Unknown variable: '{0}'")]
    UnknownVariable(String),
    /// A numeric literal that does not fit the value range.
    #[error("Invalid numeric literal: '{0}'")]
    InvalidNumber(String),
    /// An operator token with no definition.
    #[error("Unknown operator '{operator}' on line {line}")]
    UnknownOperator {
        /// The operator as written.
        operator: String,
        /// Line within the expression.
        line: usize,
    },
    /// A function name with no definition.
    #[error("Unknown function '{name}' on line {line}")]
    UnknownFunction {
        /// The function as written.
        name: String,
        /// Line within the expression.
        line: usize,
    },
    /// An operator with too few operands.
    #[error("Missing operand for '{operator}' operator on line {line}")]
    MissingOperand {
        /// The starved operator.
        operator: String,
        /// Line within the expression.
        line: usize,
    },
    /// Unbalanced parentheses or a misplaced argument separator.
    #[error("Mismatched parentheses on line {line}")]
    MismatchedParentheses {
        /// Line within the expression.
        line: usize,
    },
    /// Leftover input after a complete expression.
    #[error("Extra input after end of expression")]
    ExtraInput,
    /// An expression with no content at all.
    #[error("Empty expression")]
    Empty,
    /// An operator applied to operands of the wrong types.
    #[error("Invalid types for operator '{operator}': {types}")]
    InvalidOperatorTypes {
        /// The operator as written.
        operator: String,
        /// The actual operand types.
        types: String,
    },
    /// A function applied to arguments of the wrong types.
    #[error("Invalid type(s) for argument(s) to function '{function}': {types}")]
    InvalidFunctionTypes {
        /// The function name.
        function: String,
        /// The actual argument types.
        types: String,
    },
    /// A function applied to the wrong number of arguments.
    #[error("Invalid number of arguments to function '{0}'")]
    FunctionArity(String),
    /// A regex operator while regular expressions are disabled.
    #[error("regular expressions in expressions are disabled")]
    RegexpDisabled,
    /// A right-hand pattern that does not compile.
    #[error("Invalid regular expression: '{0}'")]
    InvalidRegexp(String),
    /// The join operator `and` outside a match predicate.
    #[error("Logical conjunctions of conditions are valid only in match predicates")]
    JoinOutsideMatch,
    /// Division by zero while folding constants.
    #[error("Division by zero in constant expression")]
    DivisionByZero,
    /// `int_of_string` over a literal that is not an integer.
    #[error("Invalid integer literal: '{0}'")]
    InvalidIntLiteral(String),
}
