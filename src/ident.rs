use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Case-insensitive, case-preserving identifier.
///
/// An `Ident` compares, hashes and orders on its case-folded form while
/// printing with the spelling it was created with. Every map in the compiler
/// that is keyed by a language name (constants, facts, fields, locals, rules,
/// parameters, functions) is keyed by this type, which is what makes the
/// whole surface language caseless.
///
/// # Examples
/// ```rust
/// use sequent::ident::Ident;
///
/// let upper = Ident::new("HELLO");
/// let lower = Ident::new("hello");
/// assert_eq!(upper, lower);
/// assert_eq!(upper.to_string(), "HELLO");
/// ```
#[derive(Clone, Debug)]
pub struct Ident {
    /// Spelling as written in the source document.
    display: String,
    /// Case-folded form used for comparisons and hashing.
    folded: String,
}

impl Ident {
    /// Create a new identifier, preserving the given spelling.
    #[must_use]
    pub fn new(display: &str) -> Self {
        Self {
            display: display.to_owned(),
            folded: display.to_lowercase(),
        }
    }

    /// Returns the identifier with the spelling it was created with.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.display
    }

    /// Returns the case-folded form of the identifier.
    #[must_use]
    pub fn folded(&self) -> &str {
        &self.folded
    }
}

impl From<&str> for Ident {
    fn from(display: &str) -> Self {
        Self::new(display)
    }
}

impl PartialEq for Ident {
    fn eq(&self, other: &Self) -> bool {
        self.folded == other.folded
    }
}

impl Eq for Ident {}

impl PartialEq<str> for Ident {
    fn eq(&self, other: &str) -> bool {
        self.folded == other.to_lowercase()
    }
}

impl PartialEq<&str> for Ident {
    fn eq(&self, other: &&str) -> bool {
        self.folded == other.to_lowercase()
    }
}

impl Hash for Ident {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.folded.hash(state);
    }
}

impl PartialOrd for Ident {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ident {
    fn cmp(&self, other: &Self) -> Ordering {
        self.folded.cmp(&other.folded)
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_str_eq;
    use test_case::test_case;

    use super::*;

    #[test_case("HELLO, WORLD!", "hello, world!")]
    #[test_case("MixedCase", "mIXEDcASE")]
    #[test_case("same", "same")]
    fn compares_caselessly(a: &str, b: &str) {
        assert_eq!(Ident::new(a), Ident::new(b));
    }

    #[test]
    fn display_is_preserved() {
        let ident = Ident::new("CamelCase");
        assert_str_eq!("CamelCase", ident.to_string());
        assert_str_eq!("CamelCase", ident.clone().as_str());
        assert_str_eq!("camelcase", ident.folded());
    }

    #[test]
    fn map_keys_ignore_case() {
        let mut map = HashMap::new();
        map.insert(Ident::new("hello"), "a message");
        assert_eq!(map.get(&Ident::new("HELLO")), Some(&"a message"));
    }

    #[test]
    fn ordering_uses_the_fold() {
        // "B" < "a" byte-wise, but not once folded.
        assert!(Ident::new("B") > Ident::new("a"));
        assert!(Ident::new("a") < Ident::new("b"));
    }

    #[test]
    fn compares_against_plain_strings() {
        assert_eq!(Ident::new("Value"), *"VALUE");
        assert_eq!(Ident::new("Value"), "value");
    }
}
