//! The document decode boundary.
//!
//! Reads rule modules from disk, decodes the YAML surface (including the
//! `!expr`, `!output` and `!distinct` tags) into [`crate::document`] values,
//! validates each module against the partial schema, merges modules left to
//! right, and validates the merged engine description against the full
//! schema. Everything past this module is decoder-agnostic.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde_yaml::value::TaggedValue;
use serde_yaml::Value as Yaml;
use thiserror::Error;

use crate::document::{Map, Node};
use crate::ident::Ident;
use crate::schema;
use crate::validate::ValidateError;

/// Failures while reading, decoding or validating rule modules.
#[derive(Debug, Error)]
pub enum LoadError {
    /// A file could not be read.
    #[error("{path}: {source}")]
    Io {
        /// The unreadable file.
        path: PathBuf,
        /// The underlying I/O failure.
        source: std::io::Error,
    },
    /// The input is not well-formed YAML.
    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    /// The document does not fit the rule-file schema.
    #[error(transparent)]
    Validate(#[from] ValidateError),
    /// A mapping key that is not a string.
    #[error("Mapping keys must be strings")]
    NonStringKey,
    /// Two keys that collide once case is folded.
    #[error("Duplicate keys '{0}'")]
    DuplicateKey(String),
    /// A tag the language does not define.
    #[error("Unknown tag '{0}'")]
    UnknownTag(String),
    /// An integer too large for the value range.
    #[error("Integer out of range")]
    IntegerRange,
    /// `!expr` wrapping something other than a string.
    #[error("'!expr' must wrap an expression string")]
    ExprNotString,
    /// `!output` or `!distinct` wrapping something other than a mapping.
    #[error("'!{0}' must wrap a dictionary")]
    TagNotMapping(String),
}

/// Decode one YAML value into a document node.
fn convert(value: &Yaml) -> Result<Node, LoadError> {
    match value {
        Yaml::Null => Ok(Node::Null),
        Yaml::Bool(value) => Ok(Node::Bool(*value)),
        Yaml::Number(number) => {
            if let Some(value) = number.as_i64() {
                Ok(Node::Int(value))
            } else if number.is_u64() {
                Err(LoadError::IntegerRange)
            } else {
                number.as_f64().map(Node::Real).ok_or(LoadError::IntegerRange)
            }
        }
        Yaml::String(value) => Ok(Node::Str(value.clone())),
        Yaml::Sequence(items) => {
            let mut list = Vec::with_capacity(items.len());
            for item in items {
                list.push(convert(item)?);
            }
            Ok(Node::List(list))
        }
        Yaml::Mapping(mapping) => Ok(Node::Map(convert_mapping(mapping)?)),
        Yaml::Tagged(tagged) => convert_tagged(tagged),
    }
}

/// Decode a mapping, folding keys and rejecting post-fold duplicates.
fn convert_mapping(mapping: &serde_yaml::Mapping) -> Result<Map, LoadError> {
    let mut map = Map::new();
    for (key, value) in mapping {
        let Yaml::String(key) = key else {
            return Err(LoadError::NonStringKey);
        };
        if map.contains(key) {
            return Err(LoadError::DuplicateKey(key.clone()));
        }
        map.insert(Ident::new(key), convert(value)?);
    }
    Ok(map)
}

/// Decode one tagged value.
fn convert_tagged(tagged: &TaggedValue) -> Result<Node, LoadError> {
    let tag = tagged.tag.to_string();
    let name = tag.trim_start_matches('!').to_lowercase();

    match name.as_str() {
        "expr" => match &tagged.value {
            Yaml::String(source) => Ok(Node::Expr(source.clone())),
            _ => Err(LoadError::ExprNotString),
        },
        "output" => match &tagged.value {
            Yaml::Mapping(mapping) => Ok(Node::Map(convert_mapping(mapping)?.with_output())),
            _ => Err(LoadError::TagNotMapping(name)),
        },
        "distinct" => match &tagged.value {
            Yaml::Mapping(mapping) => Ok(Node::Map(convert_mapping(mapping)?.with_distinct())),
            _ => Err(LoadError::TagNotMapping(name)),
        },
        _ => Err(LoadError::UnknownTag(tag)),
    }
}

/// Decode one module's text and validate it against the partial schema.
///
/// # Errors
/// On malformed YAML, an unknown tag, or a schema violation.
pub fn load_str(text: &str) -> Result<Node, LoadError> {
    let yaml: Yaml = serde_yaml::from_str(text)?;
    let node = convert(&yaml)?;
    Ok(schema::partial_document().check(&node, "/")?)
}

/// Merge validated partial modules into one engine description and validate
/// it against the full schema.
///
/// Sections merge by key with later modules winning; descriptions
/// concatenate; empty sections are dropped.
///
/// # Errors
/// When the merged document misses a mandatory section or otherwise fails
/// the full schema.
pub fn merge(modules: &[Node]) -> Result<Map, LoadError> {
    const SECTIONS: [&str; 5] = ["Constants", "Parameters", "Functions", "Facts", "Rules"];

    let mut sections: IndexMap<&str, Map> =
        SECTIONS.iter().map(|name| (*name, Map::new())).collect();
    let mut description = String::new();

    for module in modules {
        let Some(map) = module.as_map() else {
            continue;
        };

        for name in SECTIONS {
            if let Some(Node::Map(part)) = map.get(name) {
                if let Some(section) = sections.get_mut(name) {
                    section.extend_from(part);
                }
            }
        }

        if let Some(text) = map.get("Description").and_then(Node::as_str) {
            if !description.is_empty() {
                description.push('\n');
            }
            description.push_str(text);
        }
    }

    let mut document = Map::new();
    for (name, section) in sections {
        if !section.is_empty() {
            document.insert(Ident::new(name), Node::Map(section));
        }
    }
    document.insert(Ident::new("Description"), Node::Str(description));

    match schema::full_document().check(&Node::Map(document), "/")? {
        Node::Map(checked) => Ok(checked),
        _ => unreachable!("dictionary validation returns a dictionary"),
    }
}

/// Read, decode, validate and merge rule modules from disk.
///
/// # Errors
/// On the first unreadable or invalid module, or when the merged document
/// fails the full schema.
pub fn load_files(paths: &[impl AsRef<Path>]) -> Result<Map, LoadError> {
    let mut modules = Vec::with_capacity(paths.len());
    for path in paths {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_owned(),
            source,
        })?;
        modules.push(load_str(&text)?);
    }
    merge(&modules)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn tags_decode_into_document_markers() {
        let module = load_str(
            "Facts:\n  Score: !output\n    Value2: INTEGER\nConstants:\n  X: !expr \"1 + 2\"\n",
        )
        .expect("loads");
        let map = module.as_map().expect("a map");

        let facts = map.get("Facts").and_then(Node::as_map).expect("facts");
        let score = facts.get("Score").and_then(Node::as_map).expect("score");
        assert!(score.is_output());

        let constants = map.get("Constants").and_then(Node::as_map).expect("constants");
        assert_eq!(constants.get("X"), Some(&Node::Expr("1 + 2".to_owned())));
    }

    #[test]
    fn unknown_tags_are_rejected() {
        let failure = load_str("Constants:\n  X: !mystery 1\n").unwrap_err();
        assert!(matches!(failure, LoadError::UnknownTag(_)));
    }

    #[test]
    fn case_folded_duplicate_keys_are_rejected() {
        let failure = load_str("Constants:\n  X: 1\n  x: 2\n").unwrap_err();
        assert!(matches!(failure, LoadError::DuplicateKey(_)));
    }

    #[test]
    fn schema_violations_surface_with_locations() {
        let failure = load_str("Facts:\n  Login: {}\n").unwrap_err();
        let LoadError::Validate(failure) = failure else {
            panic!("expected a validation failure");
        };
        assert_eq!(failure.location, "/[Facts][Login]");
    }

    #[test]
    fn modules_merge_last_wins_and_concatenate_descriptions() {
        let first = load_str(
            "Description: part one\nFacts:\n  Login:\n    User2: STRING\n",
        )
        .expect("loads");
        let second = load_str(
            "Description: part two\nRules:\n  R:\n    Description: always\n    MatchAll:\n      - Fact: Login\n        Meaning: any login\n    Assert:\n      Login:\n        User2: !expr \"'x'\"\n",
        )
        .expect("loads");

        let merged = merge(&[first, second]).expect("merges");
        assert_eq!(
            merged.get("Description"),
            Some(&Node::Str("part one\npart two".to_owned()))
        );
        assert!(merged.contains("Facts"));
        assert!(merged.contains("Rules"));
    }

    #[test]
    fn merged_documents_need_facts_and_rules() {
        let only_facts = load_str("Facts:\n  Login:\n    User2: STRING\n").expect("loads");
        let failure = merge(&[only_facts]).unwrap_err();
        assert!(matches!(failure, LoadError::Validate(_)));
    }
}
