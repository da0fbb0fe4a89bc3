//! Decoded rule-document tree.
//!
//! The loader turns the serialized input into this representation before any
//! validation happens, so the rest of the compiler never touches the decoder
//! types. Custom tags from the input surface become data here: `!expr` turns
//! a string into [`Node::Expr`], while `!output` and `!distinct` set flags on
//! the tagged [`Map`].

use indexmap::IndexMap;

use crate::ident::Ident;

/// A single decoded value from a rule document.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    /// An explicit null. Never valid anywhere in a rule document, but it can
    /// be written, so it has to be representable.
    Null,
    /// A boolean scalar.
    Bool(bool),
    /// An integer scalar.
    Int(i64),
    /// A floating-point scalar.
    Real(f64),
    /// A string scalar.
    Str(String),
    /// A delayed expression (`!expr`); kept as source text until the rule
    /// analyser evaluates it in the proper scope.
    Expr(String),
    /// A sequence of values.
    List(Vec<Node>),
    /// A mapping with identifier keys.
    Map(Map),
}

impl Node {
    /// A short description of the value's shape, for diagnostics.
    #[must_use]
    pub fn describe(&self) -> &'static str {
        match self {
            Node::Null => "a null",
            Node::Bool(_) => "a boolean",
            Node::Int(_) => "an integer",
            Node::Real(_) => "a float",
            Node::Str(_) => "a string",
            Node::Expr(_) => "an expression",
            Node::List(_) => "a list",
            Node::Map(_) => "a dictionary",
        }
    }

    /// Returns the inner map if this node is a mapping.
    #[must_use]
    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Node::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Returns the inner string if this node is a string scalar.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::Str(text) => Some(text),
            _ => None,
        }
    }

    /// Returns the inner list if this node is a sequence.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Node]> {
        match self {
            Node::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the inner boolean if this node is a boolean scalar.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Node::Bool(value) => Some(*value),
            _ => None,
        }
    }
}

/// An ordered, identifier-keyed mapping.
///
/// Keys fold their case (see [`Ident`]), and the decode step rejects keys
/// that collide after folding, so lookups here are unambiguous. The two
/// marker flags record the `!output` and `!distinct` tags; validation carries
/// them through untouched so the analyser can read them off the normalised
/// document.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Map {
    entries: IndexMap<Ident, Node>,
    is_output: bool,
    distinct: bool,
}

impl Map {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag the map as a `!output` fact declaration.
    #[must_use]
    pub fn with_output(mut self) -> Self {
        self.is_output = true;
        self
    }

    /// Flag the map as a `!distinct` production clause.
    #[must_use]
    pub fn with_distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Whether the map carries the `!output` flag.
    #[must_use]
    pub fn is_output(&self) -> bool {
        self.is_output
    }

    /// Whether the map carries the `!distinct` flag.
    #[must_use]
    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    /// Insert an entry, replacing any entry with the same folded key.
    ///
    /// Returns the previous value when the key was already present.
    pub fn insert(&mut self, key: Ident, value: Node) -> Option<Node> {
        self.entries.insert(key, value)
    }

    /// Look up an entry by name, ignoring case.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.entries.get(&Ident::new(key))
    }

    /// Whether an entry with the given name exists, ignoring case.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(&Ident::new(key))
    }

    /// Iterate the entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Ident, &Node)> {
        self.entries.iter()
    }

    /// The keys of the map, in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &Ident> {
        self.entries.keys()
    }

    /// The number of entries in the map.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge another map into this one, later entries winning on key
    /// collisions. Used when several rule modules define the same section.
    pub fn extend_from(&mut self, other: &Map) {
        for (key, value) in other.iter() {
            self.entries.insert(key.clone(), value.clone());
        }
    }
}

impl FromIterator<(Ident, Node)> for Map {
    fn from_iter<T: IntoIterator<Item = (Ident, Node)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
            is_output: false,
            distinct: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_ignore_case() {
        let mut map = Map::new();
        map.insert(Ident::new("Fact"), Node::Str("Login".to_owned()));
        assert!(map.contains("FACT"));
        assert_eq!(map.get("fact"), Some(&Node::Str("Login".to_owned())));
    }

    #[test]
    fn merge_is_last_wins() {
        let mut base = Map::new();
        base.insert(Ident::new("A"), Node::Int(1));
        base.insert(Ident::new("B"), Node::Int(2));

        let mut update = Map::new();
        update.insert(Ident::new("a"), Node::Int(10));

        base.extend_from(&update);
        assert_eq!(base.get("A"), Some(&Node::Int(10)));
        assert_eq!(base.get("B"), Some(&Node::Int(2)));
        assert_eq!(base.len(), 2);
    }

    #[test]
    fn flags_survive_cloning() {
        let map = Map::new().with_output();
        assert!(map.clone().is_output());
        assert!(!map.is_distinct());
    }
}
