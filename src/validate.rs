//! Structural validation of decoded rule documents.
//!
//! Validators are small composable shapes: each one checks a [`Node`]
//! against its contract and returns a normalised copy, or fails with a
//! single-line diagnostic carrying the location path of the offending value
//! (`/Rules[Foo][MatchAll][0]` style). The rule-file schema in
//! [`crate::schema`] is assembled entirely from these combinators.
//!
//! Key case folding and duplicate detection happen when the document is
//! decoded (see [`crate::document::Map`]), so every dictionary reaching a
//! validator is already caseless and duplicate-free.

use std::fmt;

use regex::Regex;
use thiserror::Error;

use crate::document::{Map, Node};
use crate::ident::Ident;

/// A failed validation, with the location of the offending value.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{location}: {message}")]
pub struct ValidateError {
    /// Human description of what went wrong.
    pub message: String,
    /// Path of the value inside the document.
    pub location: String,
}

impl ValidateError {
    fn new(message: impl Into<String>, location: &str) -> Self {
        Self {
            message: message.into(),
            location: location.to_owned(),
        }
    }
}

/// A composable validator for one value shape.
#[derive(Clone, Debug)]
pub enum Shape {
    /// Passes when at least one alternative passes; the first success wins.
    Any(Vec<Shape>),
    /// Passes when every inner shape passes; the value is returned unchanged.
    All(Vec<Shape>),
    /// Passes exactly when the inner shape fails.
    Not {
        /// The shape that must not match.
        inner: Box<Shape>,
        /// Failure message used when the inner shape matches.
        message: String,
    },
    /// A boolean scalar.
    Boolean,
    /// An integer scalar, optionally bounded. Booleans are rejected unless
    /// explicitly allowed.
    Integer {
        /// Inclusive lower bound.
        minimum: Option<i64>,
        /// Inclusive upper bound.
        maximum: Option<i64>,
        /// Whether a boolean is acceptable where an integer is expected.
        allow_bool: bool,
    },
    /// A floating-point scalar, optionally admitting integers.
    Float {
        /// Whether an integer is acceptable where a float is expected.
        allow_integer: bool,
    },
    /// A string scalar with optional pattern and length bounds.
    Text(TextShape),
    /// A delayed (`!expr`) expression, kept opaque until rule analysis.
    Expression,
    /// A homogeneous, optionally bounded sequence.
    List(ListShape),
    /// An identifier-keyed mapping.
    Dict(Box<DictShape>),
    /// Rewrites the failure message of the inner shape, keeping the location.
    Notify {
        /// Replacement message.
        message: String,
        /// The wrapped shape.
        inner: Box<Shape>,
    },
}

impl Shape {
    /// A shape passing when any of the alternatives pass.
    #[must_use]
    pub fn any(options: impl IntoIterator<Item = Shape>) -> Self {
        Shape::Any(options.into_iter().collect())
    }

    /// A shape passing when all of the inner shapes pass.
    #[must_use]
    pub fn all(shapes: impl IntoIterator<Item = Shape>) -> Self {
        Shape::All(shapes.into_iter().collect())
    }

    /// A shape passing exactly when `inner` fails.
    #[must_use]
    pub fn not(inner: Shape, message: &str) -> Self {
        Shape::Not {
            inner: Box::new(inner),
            message: message.to_owned(),
        }
    }

    /// A plain boolean shape.
    #[must_use]
    pub fn boolean() -> Self {
        Shape::Boolean
    }

    /// An unbounded integer shape rejecting booleans.
    #[must_use]
    pub fn integer() -> Self {
        Shape::Integer {
            minimum: None,
            maximum: None,
            allow_bool: false,
        }
    }

    /// An unbounded integer shape that also admits booleans.
    #[must_use]
    pub fn integer_or_bool() -> Self {
        Shape::Integer {
            minimum: None,
            maximum: None,
            allow_bool: true,
        }
    }

    /// A float shape rejecting integers.
    #[must_use]
    pub fn float() -> Self {
        Shape::Float {
            allow_integer: false,
        }
    }

    /// An unconstrained string shape.
    #[must_use]
    pub fn text() -> Self {
        Shape::Text(TextShape::default())
    }

    /// A string shape constrained by a pattern.
    #[must_use]
    pub fn text_matching(pattern: Regex) -> Self {
        Shape::Text(TextShape::default().pattern(pattern))
    }

    /// A delayed-expression shape.
    #[must_use]
    pub fn expression() -> Self {
        Shape::Expression
    }

    /// An unbounded list shape.
    #[must_use]
    pub fn list(member: Shape) -> Self {
        Shape::List(ListShape::new(member))
    }

    /// Wrap a shape, replacing its failure message.
    #[must_use]
    pub fn notify(message: &str, inner: Shape) -> Self {
        Shape::Notify {
            message: message.to_owned(),
            inner: Box::new(inner),
        }
    }

    /// Check `node` against the shape, returning the normalised value.
    ///
    /// # Errors
    /// If the value does not conform, with the failing location in the error.
    pub fn check(&self, node: &Node, at: &str) -> Result<Node, ValidateError> {
        match self {
            Shape::Any(options) => {
                let mut messages = Vec::with_capacity(options.len());
                for option in options {
                    match option.check(node, at) {
                        Ok(result) => return Ok(result),
                        Err(failure) => messages.push(failure.message),
                    }
                }
                Err(ValidateError::new(messages.join(" and "), at))
            }
            Shape::All(shapes) => {
                for shape in shapes {
                    shape.check(node, at)?;
                }
                Ok(node.clone())
            }
            Shape::Not { inner, message } => match inner.check(node, at) {
                Err(_) => Ok(node.clone()),
                Ok(_) => Err(ValidateError::new(message.clone(), at)),
            },
            Shape::Boolean => match node {
                Node::Bool(_) => Ok(node.clone()),
                other => Err(ValidateError::new(
                    format!("Expected a boolean value, got {}", other.describe()),
                    at,
                )),
            },
            Shape::Integer {
                minimum,
                maximum,
                allow_bool,
            } => check_integer(node, *minimum, *maximum, *allow_bool, at),
            Shape::Float { allow_integer } => match node {
                Node::Real(_) => Ok(node.clone()),
                Node::Int(_) if *allow_integer => Ok(node.clone()),
                other => Err(ValidateError::new(
                    format!("Expected a float, got {}", other.describe()),
                    at,
                )),
            },
            Shape::Text(text) => text.check(node, at),
            Shape::Expression => match node {
                Node::Expr(_) => Ok(node.clone()),
                other => Err(ValidateError::new(
                    format!("Expected an expression, got {}", other.describe()),
                    at,
                )),
            },
            Shape::List(list) => list.check(node, at),
            Shape::Dict(dict) => dict.check(node, at),
            Shape::Notify { message, inner } => inner.check(node, at).map_err(|failure| {
                ValidateError::new(message.clone(), &failure.location)
            }),
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Any(_) => write!(f, "any of several shapes"),
            Shape::All(_) => write!(f, "all of several shapes"),
            Shape::Not { .. } => write!(f, "a negated shape"),
            Shape::Boolean => write!(f, "a boolean"),
            Shape::Integer { .. } => write!(f, "an integer"),
            Shape::Float { .. } => write!(f, "a float"),
            Shape::Text(_) => write!(f, "a string"),
            Shape::Expression => write!(f, "an expression"),
            Shape::List(_) => write!(f, "a list"),
            Shape::Dict(_) => write!(f, "a dictionary"),
            Shape::Notify { inner, .. } => inner.fmt(f),
        }
    }
}

fn check_integer(
    node: &Node,
    minimum: Option<i64>,
    maximum: Option<i64>,
    allow_bool: bool,
    at: &str,
) -> Result<Node, ValidateError> {
    let value = match node {
        Node::Int(value) => *value,
        Node::Bool(_) if allow_bool => return Ok(node.clone()),
        other => {
            return Err(ValidateError::new(
                format!("Expected an integer, got {}", other.describe()),
                at,
            ))
        }
    };

    if let Some(minimum) = minimum {
        if value < minimum {
            return Err(ValidateError::new(
                format!("Expected an integer greater than {minimum}"),
                at,
            ));
        }
    }

    if let Some(maximum) = maximum {
        if value > maximum {
            return Err(ValidateError::new(
                format!("Expected an integer less than {maximum}"),
                at,
            ));
        }
    }

    Ok(node.clone())
}

/// String shape with optional pattern and length bounds.
#[derive(Clone, Debug, Default)]
pub struct TextShape {
    pattern: Option<Regex>,
    min_length: Option<usize>,
    max_length: Option<usize>,
}

impl TextShape {
    /// Require the string to match a pattern.
    #[must_use]
    pub fn pattern(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }

    /// Require a minimum length.
    #[must_use]
    pub fn min_length(mut self, min_length: usize) -> Self {
        self.min_length = Some(min_length);
        self
    }

    /// Require a maximum length.
    #[must_use]
    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    fn check(&self, node: &Node, at: &str) -> Result<Node, ValidateError> {
        let Node::Str(text) = node else {
            return Err(ValidateError::new(
                format!("Expected a string, got {}", node.describe()),
                at,
            ));
        };

        if let Some(pattern) = &self.pattern {
            if !pattern.is_match(text) {
                return Err(ValidateError::new(
                    format!("Expected '{}'", pattern.as_str()),
                    at,
                ));
            }
        }

        if let Some(min_length) = self.min_length {
            if text.chars().count() < min_length {
                return Err(ValidateError::new(
                    format!("Expected a string of at least {min_length} characters"),
                    at,
                ));
            }
        }

        if let Some(max_length) = self.max_length {
            if text.chars().count() > max_length {
                return Err(ValidateError::new(
                    format!("Expected a string of at most {max_length} characters"),
                    at,
                ));
            }
        }

        Ok(node.clone())
    }
}

impl From<TextShape> for Shape {
    fn from(text: TextShape) -> Self {
        Shape::Text(text)
    }
}

/// List shape with a member shape and optional length bounds.
#[derive(Clone, Debug)]
pub struct ListShape {
    member: Box<Shape>,
    min_length: Option<usize>,
    max_length: Option<usize>,
}

impl ListShape {
    /// A list whose members all satisfy `member`.
    #[must_use]
    pub fn new(member: Shape) -> Self {
        Self {
            member: Box::new(member),
            min_length: None,
            max_length: None,
        }
    }

    /// Require a minimum number of members.
    #[must_use]
    pub fn min_length(mut self, min_length: usize) -> Self {
        self.min_length = Some(min_length);
        self
    }

    /// Require a maximum number of members.
    #[must_use]
    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    fn check(&self, node: &Node, at: &str) -> Result<Node, ValidateError> {
        let Node::List(items) = node else {
            return Err(ValidateError::new(
                format!("Expected a list, got {}", node.describe()),
                at,
            ));
        };

        if let Some(min_length) = self.min_length {
            if items.len() < min_length {
                return Err(ValidateError::new(
                    format!("Expected a list of at least length {min_length}"),
                    at,
                ));
            }
        }

        if let Some(max_length) = self.max_length {
            if items.len() > max_length {
                return Err(ValidateError::new(
                    format!("Expected a list of at most length {max_length}"),
                    at,
                ));
            }
        }

        let mut result = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            result.push(self.member.check(item, &format!("{at}[{index}]"))?);
        }

        Ok(Node::List(result))
    }
}

impl From<ListShape> for Shape {
    fn from(list: ListShape) -> Self {
        Shape::List(list)
    }
}

/// Mapping shape with required, optional and extra members.
///
/// Keys not named as required or optional are "extra": they are only
/// admitted when an extra-member shape is set, each key is checked against
/// the extra-key shape, and their count is bounded by `min_extra` and
/// `max_extra`. The normalised result is a fresh map in input order with the
/// `!output`/`!distinct` flags of the input preserved.
#[derive(Clone, Debug, Default)]
pub struct DictShape {
    required: Vec<(Ident, Shape)>,
    optional: Vec<(Ident, Shape)>,
    extra: Option<Shape>,
    extra_keys: Option<Shape>,
    min_extra: Option<usize>,
    max_extra: Option<usize>,
}

impl DictShape {
    /// An empty dictionary shape admitting nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a required member.
    #[must_use]
    pub fn required(mut self, key: &str, shape: Shape) -> Self {
        self.required.push((Ident::new(key), shape));
        self
    }

    /// Add an optional member.
    #[must_use]
    pub fn optional(mut self, key: &str, shape: Shape) -> Self {
        self.optional.push((Ident::new(key), shape));
        self
    }

    /// Admit extra members, each value checked against `shape`.
    #[must_use]
    pub fn extra(mut self, shape: Shape) -> Self {
        self.extra = Some(shape);
        self
    }

    /// Check each extra key (as a string) against `shape`.
    #[must_use]
    pub fn extra_keys(mut self, shape: Shape) -> Self {
        self.extra_keys = Some(shape);
        self
    }

    /// Require at least this many extra members.
    #[must_use]
    pub fn min_extra(mut self, min_extra: usize) -> Self {
        self.min_extra = Some(min_extra);
        self
    }

    /// Require at most this many extra members.
    #[must_use]
    pub fn max_extra(mut self, max_extra: usize) -> Self {
        self.max_extra = Some(max_extra);
        self
    }

    fn member_shape<'shape>(
        table: &'shape [(Ident, Shape)],
        key: &Ident,
    ) -> Option<&'shape Shape> {
        table
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, shape)| shape)
    }

    fn check(&self, node: &Node, at: &str) -> Result<Node, ValidateError> {
        let Node::Map(map) = node else {
            return Err(ValidateError::new(
                format!("Expected a dictionary, got {}", node.describe()),
                at,
            ));
        };

        for (key, _) in &self.required {
            if !map.contains(key.as_str()) {
                return Err(ValidateError::new(
                    format!("Missing required key '{key}'"),
                    at,
                ));
            }
        }

        let mut result = Map::new();
        if map.is_output() {
            result = result.with_output();
        }
        if map.is_distinct() {
            result = result.with_distinct();
        }

        let mut extra_count = 0;
        for (key, value) in map.iter() {
            let child_at = format!("{at}[{key}]");

            if let Some(shape) = Self::member_shape(&self.required, key) {
                result.insert(key.clone(), shape.check(value, &child_at)?);
            } else if let Some(shape) = Self::member_shape(&self.optional, key) {
                result.insert(key.clone(), shape.check(value, &child_at)?);
            } else if let Some(extra) = &self.extra {
                extra_count += 1;

                if let Some(extra_keys) = &self.extra_keys {
                    extra_keys.check(&Node::Str(key.as_str().to_owned()), &child_at)?;
                }

                result.insert(key.clone(), extra.check(value, &child_at)?);
            } else {
                return Err(ValidateError::new(format!("Disallowed key '{key}'"), at));
            }
        }

        if let Some(min_extra) = self.min_extra {
            if extra_count < min_extra {
                return Err(ValidateError::new(
                    format!("Expected at least {min_extra} extra keys"),
                    at,
                ));
            }
        }

        if let Some(max_extra) = self.max_extra {
            if extra_count > max_extra {
                return Err(ValidateError::new(
                    format!("Expected at most {max_extra} extra keys"),
                    at,
                ));
            }
        }

        Ok(Node::Map(result))
    }
}

impl From<DictShape> for Shape {
    fn from(dict: DictShape) -> Self {
        Shape::Dict(Box::new(dict))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_str_eq;
    use test_case::test_case;

    use super::*;

    fn entry(key: &str, value: Node) -> (Ident, Node) {
        (Ident::new(key), value)
    }

    #[test]
    fn dictionary_validates_required_and_optional() {
        let shape: Shape = DictShape::new()
            .required("First", Shape::text())
            .required("Last", Shape::text())
            .optional("Middle", Shape::text())
            .into();

        let map: Map = [
            entry("first", Node::Str("Rob".to_owned())),
            entry("LAST", Node::Str("King".to_owned())),
        ]
        .into_iter()
        .collect();

        assert!(shape.check(&Node::Map(map), "/").is_ok());
    }

    #[test]
    fn dictionary_reports_missing_required_keys() {
        let shape: Shape = DictShape::new().required("Fact", Shape::text()).into();
        let failure = shape.check(&Node::Map(Map::new()), "/").unwrap_err();
        assert_str_eq!("/: Missing required key 'Fact'", failure.to_string());
    }

    #[test]
    fn dictionary_rejects_unknown_keys() {
        let shape: Shape = DictShape::new().optional("Enabled", Shape::boolean()).into();
        let map: Map = [entry("Unknown", Node::Int(1))].into_iter().collect();
        let failure = shape.check(&Node::Map(map), "/").unwrap_err();
        assert_str_eq!("/: Disallowed key 'Unknown'", failure.to_string());
    }

    #[test]
    fn dictionary_bounds_extra_members() {
        let shape: Shape = DictShape::new()
            .extra(Shape::integer())
            .min_extra(1)
            .max_extra(1)
            .into();

        let failure = shape.check(&Node::Map(Map::new()), "/").unwrap_err();
        assert_str_eq!("/: Expected at least 1 extra keys", failure.to_string());

        let map: Map = [entry("A", Node::Int(1)), entry("B", Node::Int(2))]
            .into_iter()
            .collect();
        let failure = shape.check(&Node::Map(map), "/").unwrap_err();
        assert_str_eq!("/: Expected at most 1 extra keys", failure.to_string());
    }

    #[test]
    fn dictionary_checks_extra_keys_and_preserves_flags() {
        let shape: Shape = DictShape::new()
            .extra(Shape::integer())
            .extra_keys(Shape::text_matching(
                Regex::new("^[A-Z][a-z]*$").expect("pattern compiles"),
            ))
            .into();

        let mut map = Map::new().with_output();
        map.insert(Ident::new("Good"), Node::Int(1));
        let checked = shape.check(&Node::Map(map), "/").expect("valid");
        assert!(checked.as_map().expect("a map").is_output());

        let mut bad = Map::new();
        bad.insert(Ident::new("0bad"), Node::Int(1));
        assert!(shape.check(&Node::Map(bad), "/").is_err());
    }

    #[test]
    fn integer_rejects_booleans_by_default() {
        assert!(Shape::integer().check(&Node::Bool(true), "/").is_err());
        assert!(Shape::integer_or_bool().check(&Node::Bool(true), "/").is_ok());
    }

    #[test_case(Node::Int(3), true)]
    #[test_case(Node::Int(11), false)]
    #[test_case(Node::Int(-1), false)]
    fn integer_enforces_bounds(node: Node, pass: bool) {
        let shape = Shape::Integer {
            minimum: Some(0),
            maximum: Some(10),
            allow_bool: false,
        };
        assert_eq!(shape.check(&node, "/").is_ok(), pass);
    }

    #[test]
    fn any_combines_failure_messages() {
        let shape = Shape::any([Shape::boolean(), Shape::integer()]);
        let failure = shape.check(&Node::Str("nope".to_owned()), "/x").unwrap_err();
        assert_str_eq!(
            "/x: Expected a boolean value, got a string and Expected an integer, got a string",
            failure.to_string()
        );
    }

    #[test]
    fn not_inverts_the_inner_shape() {
        let shape = Shape::not(Shape::integer(), "integers are not welcome");
        assert!(shape.check(&Node::Str("ok".to_owned()), "/").is_ok());
        let failure = shape.check(&Node::Int(1), "/").unwrap_err();
        assert_str_eq!("/: integers are not welcome", failure.to_string());
    }

    #[test]
    fn notify_rewrites_the_message_but_keeps_the_location() {
        let shape = Shape::notify("Invalid variable name", Shape::text());
        let failure = shape.check(&Node::Int(7), "/Facts[F]").unwrap_err();
        assert_str_eq!("/Facts[F]: Invalid variable name", failure.to_string());
    }

    #[test]
    fn lists_check_members_with_indexed_locations() {
        let shape = Shape::list(Shape::integer());
        let failure = shape
            .check(
                &Node::List(vec![Node::Int(1), Node::Str("two".to_owned())]),
                "/xs",
            )
            .unwrap_err();
        assert_str_eq!("/xs[1]: Expected an integer, got a string", failure.to_string());
    }

    #[test]
    fn expression_shape_only_accepts_delayed_expressions() {
        assert!(Shape::expression()
            .check(&Node::Expr("1 + 2".to_owned()), "/")
            .is_ok());
        assert!(Shape::expression()
            .check(&Node::Str("1 + 2".to_owned()), "/")
            .is_err());
    }
}
