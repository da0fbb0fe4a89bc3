//! Rule semantic analysis.
//!
//! The [`analyzer`] turns a validated document into the typed rule IR in
//! [`ir`], evaluating every delayed expression in its proper scope and
//! enforcing the rule-shape invariants. Analysis errors are counted rather
//! than thrown: one bad rule is logged and dropped, its siblings still
//! analyse, and a nonzero count suppresses schema emission.

use thiserror::Error;

use crate::expr::ast::Expr;
use crate::expr::ExprError;
use crate::ident::Ident;

pub mod analyzer;
pub mod cycles;
pub mod ir;

/// A semantic failure inside one constant, parameter, function or rule.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum SemanticError {
    /// A reference to a fact that was never declared.
    #[error("Unknown fact '{0}'")]
    UnknownFact(Ident),
    /// A match predicate the lowerer cannot turn into a join.
    #[error("Predicate of match is not a joinable predicate ({0})")]
    NotJoinable(Expr),
    /// Two assignments to the same local within one rule.
    #[error("Duplicate assignment to '{0}'")]
    DuplicateAssignment(Ident),
    /// A rule-level `When` of a non-boolean type.
    #[error("Rule final predicates must be of boolean type")]
    FinalPredicateNotBoolean,
    /// An `Assert` clause naming a parameter's implicit fact.
    #[error("Parameter facts cannot be produced")]
    ProduceParameter,
    /// A `Suppress` clause naming a parameter's implicit fact.
    #[error("Parameter facts cannot be suppressed")]
    SuppressParameter,
    /// A produced field the target fact does not have.
    #[error("Unknown field '{0}' in production clause")]
    UnknownProducedField(Ident),
    /// A produced field whose expression has the wrong type.
    #[error("Result of expression and field type do not agree in production of '{0}'")]
    ProducedFieldType(Ident),
    /// A field of the produced fact with no assignment.
    #[error("Field '{0}' unassigned in production")]
    UnassignedField(Ident),
    /// `!distinct` on a fact without fields.
    #[error("Only facts with fields may be distinctly produced")]
    DistinctWithoutFields,
    /// A `Suppress` clause without a predicate.
    #[error("Suppression clause requires a 'When' predicate")]
    SuppressWithoutWhen,
    /// A constant whose expression did not fold to a literal.
    #[error("Invalid constant '{0}': not a constant initializer")]
    NotConstant(Ident),
    /// A metadata entry whose expression did not fold to a literal.
    #[error("Metadata values must be constant in '{0}'")]
    MetadataNotConstant(Ident),
    /// A parameter colliding with a declared fact.
    #[error("Collision between parameter '{0}' and an identically-named fact")]
    ParameterCollision(Ident),
    /// A parameter whose default did not fold to a literal.
    #[error("Invalid parameter '{0}': not a constant initializer")]
    ParameterNotConstant(Ident),
    /// A numeric parameter without a lower limit.
    #[error("Invalid parameter '{0}': no lower limit specified")]
    ParameterNoLower(Ident),
    /// A numeric parameter without an upper limit.
    #[error("Invalid parameter '{0}': no upper limit specified")]
    ParameterNoUpper(Ident),
    /// Parameter limits of a different type than the default.
    #[error("Invalid parameter '{0}': types of default and limits do not agree")]
    ParameterLimitTypes(Ident),
    /// A lower limit above the upper limit.
    #[error("Invalid parameter '{0}': limits out of order")]
    ParameterLimitOrder(Ident),
    /// A default outside the declared limits.
    #[error("Invalid parameter '{0}': default value is outside of specified limits")]
    ParameterDefaultRange(Ident),
    /// Limits on a boolean or string parameter.
    #[error("Invalid parameter '{0}': cannot specify limits on non-numeric types")]
    ParameterLimitsOnNonNumeric(Ident),
    /// A type name that is not `BOOLEAN`, `INTEGER`, `REAL` or `STRING`.
    #[error("Unknown type name '{0}'")]
    UnknownTypeName(String),
    /// A document value where a scalar or expression was expected. The
    /// schema rules this out; kept so analysis stays total.
    #[error("Expected a literal or expression, got {0}")]
    UnexpectedShape(&'static str),
    /// A failure inside an embedded expression.
    #[error(transparent)]
    Expr(#[from] ExprError),
}
