//! The rule-file schema.
//!
//! Rule documents must conform to the shapes defined here before the rule
//! analyser ever sees them. Individual modules may be partial (only facts,
//! say), so each file is checked against [`partial_document`]; after merging,
//! the whole engine description is checked against [`full_document`], which
//! requires the mandatory sections.

use regex::Regex;

use crate::validate::{DictShape, Shape};

/// Names that may not be used for any language entity.
///
/// The list covers the SQL keywords of the target engine plus the reference
/// namespaces of the expression language, since every declared name can end
/// up as a table, column or alias in the generated schema.
pub const RESERVED_NAMES: &[&str] = &[
    "abort", "action", "add", "after", "all", "alter", "analyze", "and", "as", "asc",
    "attach", "autoincrement", "before", "begin", "between", "by", "cascade", "case",
    "cast", "check", "collate", "column", "commit", "conflict", "constants", "constraint",
    "create", "cross", "current_date", "current_time", "current_timestamp", "database",
    "default", "deferrable", "deferred", "delete", "desc", "detach", "distinct", "drop",
    "each", "else", "end", "escape", "except", "exclusive", "exists", "explain", "fail",
    "for", "foreign", "from", "full", "glob", "group", "having", "if", "ignore",
    "immediate", "in", "index", "indexed", "initially", "inner", "insert", "instead",
    "intersect", "into", "is", "isnull", "join", "key", "left", "like", "limit",
    "locals", "match", "natural", "new", "no", "not", "notnull", "null", "of", "offset",
    "old", "on", "or", "order", "outer", "plan", "pragma", "primary", "query", "raise",
    "recursive", "references", "regexp", "reindex", "release", "rename", "replace",
    "restrict", "right", "rollback", "row", "rowid", "savepoint", "select", "set",
    "table", "temp", "temporary", "then", "this", "to", "transaction", "trigger",
    "union", "unique", "unlike", "update", "using", "vacuum", "values", "view",
    "virtual", "when", "where",
];

/// Compile one of the static patterns used by the schema.
fn pattern(source: &str) -> Regex {
    Regex::new(source).expect("schema patterns are valid")
}

/// A declared name: letter first, alphanumeric rest, no reserved words.
#[must_use]
pub fn name() -> Shape {
    let reserved = format!("(?i)^({})$", RESERVED_NAMES.join("|"));
    Shape::notify(
        "Invalid variable name",
        Shape::all([
            Shape::text_matching(pattern("(?i)^[A-Z][A-Z0-9]*$")),
            Shape::not(Shape::text_matching(pattern(&reserved)), "reserved name"),
        ]),
    )
}

/// A field or function type name.
#[must_use]
pub fn type_name() -> Shape {
    Shape::text_matching(pattern("(?i)^(BOOLEAN|INTEGER|REAL|STRING)$"))
}

/// A literal of any scalar type, or a delayed expression.
#[must_use]
pub fn any_expression() -> Shape {
    Shape::any([
        Shape::integer_or_bool(),
        Shape::float(),
        Shape::text(),
        Shape::expression(),
    ])
}

/// One positive match clause.
fn match_clause() -> Shape {
    DictShape::new()
        .required("Fact", name())
        .required("Meaning", Shape::text())
        .optional("When", Shape::expression())
        .optional(
            "Assign",
            DictShape::new()
                .min_extra(1)
                .extra_keys(name())
                .extra(any_expression())
                .into(),
        )
        .into()
}

/// One negative match clause; assignments are not allowed here.
fn inverted_clause() -> Shape {
    DictShape::new()
        .required("Fact", name())
        .required("Meaning", Shape::text())
        .optional("When", Shape::expression())
        .into()
}

/// A tunable parameter declaration.
fn parameter() -> Shape {
    DictShape::new()
        .required("Default", any_expression())
        .optional("Dictionary", Shape::boolean())
        .optional("Lower", any_expression())
        .optional("Upper", any_expression())
        .into()
}

/// An `Assert` clause: exactly one produced fact, fields keyed by name.
fn produce() -> Shape {
    DictShape::new()
        .min_extra(1)
        .max_extra(1)
        .extra_keys(name())
        .extra(
            DictShape::new()
                .extra_keys(name())
                .extra(any_expression())
                .into(),
        )
        .into()
}

/// A `Suppress` clause.
fn suppress() -> Shape {
    DictShape::new()
        .required("Fact", name())
        .optional("When", Shape::expression())
        .into()
}

/// Rule metadata: named lists of literals or expressions.
fn metadata() -> Shape {
    DictShape::new()
        .extra_keys(name())
        .extra(Shape::list(any_expression()))
        .into()
}

/// One rule: either an assertion or a suppression.
fn rule() -> Shape {
    let assertion = DictShape::new()
        .required("Description", Shape::text())
        .required("MatchAll", Shape::list(match_clause()))
        .required("Assert", produce())
        .optional("Enabled", Shape::boolean())
        .optional("MatchNone", Shape::list(inverted_clause()))
        .optional("When", any_expression())
        .optional("Metadata", metadata());

    let suppression = DictShape::new()
        .required("Description", Shape::text())
        .required("MatchAll", Shape::list(match_clause()))
        .required("Suppress", suppress())
        .optional("Enabled", Shape::boolean())
        .optional("MatchNone", Shape::list(inverted_clause()))
        .optional("When", any_expression())
        .optional("Metadata", metadata());

    Shape::any([assertion.into(), suppression.into()])
}

/// An external function declaration.
fn function() -> Shape {
    DictShape::new()
        .required("External", Shape::text_matching(pattern("^[A-Za-z0-9_]+$")))
        .required("Parameters", Shape::list(type_name()))
        .required("Returns", type_name())
        .into()
}

/// A fact declaration: at least one typed field, optionally `!output`.
fn fact() -> Shape {
    DictShape::new()
        .min_extra(1)
        .extra_keys(name())
        .extra(type_name())
        .into()
}

/// The constants section.
fn constants_section() -> Shape {
    DictShape::new()
        .extra_keys(name())
        .extra(any_expression())
        .into()
}

/// The parameters section.
fn parameters_section() -> Shape {
    DictShape::new().extra_keys(name()).extra(parameter()).into()
}

/// The functions section.
fn functions_section() -> Shape {
    DictShape::new()
        .min_extra(1)
        .extra_keys(name())
        .extra(function())
        .into()
}

/// The facts section.
fn facts_section() -> Shape {
    DictShape::new()
        .min_extra(1)
        .extra_keys(name())
        .extra(fact())
        .into()
}

/// The rules section.
fn rules_section() -> Shape {
    DictShape::new().min_extra(1).extra_keys(name()).extra(rule()).into()
}

/// The schema for a single rule module: every section is optional, since a
/// module might only contribute facts or constants.
#[must_use]
pub fn partial_document() -> Shape {
    DictShape::new()
        .optional("Constants", constants_section())
        .optional("Parameters", parameters_section())
        .optional("Description", Shape::text())
        .optional("Functions", functions_section())
        .optional("Facts", facts_section())
        .optional("Rules", rules_section())
        .into()
}

/// The schema for the merged engine description: facts and rules must exist.
#[must_use]
pub fn full_document() -> Shape {
    DictShape::new()
        .required("Facts", facts_section())
        .required("Rules", rules_section())
        .optional("Constants", constants_section())
        .optional("Parameters", parameters_section())
        .optional("Description", Shape::text())
        .optional("Functions", functions_section())
        .into()
}
