//! The typed rule IR.
//!
//! Everything here is the output of [`crate::engine::analyzer`]: names are
//! resolved, every expression is typed, and the ordering of maps and lists
//! matches the source document (which makes emission deterministic).

use indexmap::{IndexMap, IndexSet};

use crate::expr::ast::{Expr, FunctionDecl, Kind, Value};
use crate::ident::Ident;

/// A fact: a named, ordered record of typed fields.
#[derive(Clone, Debug, PartialEq)]
pub struct Fact {
    pub(crate) fields: IndexMap<Ident, Kind>,
    pub(crate) is_output: bool,
}

impl Fact {
    /// A fact that participates in matching.
    #[must_use]
    pub fn new(fields: IndexMap<Ident, Kind>) -> Self {
        Self {
            fields,
            is_output: false,
        }
    }

    /// Mark the fact as output: produced or suppressed only, exempt from
    /// alpha pruning.
    pub fn mark_output(&mut self) {
        self.is_output = true;
    }

    /// The fields, in declaration order.
    #[must_use]
    pub fn fields(&self) -> &IndexMap<Ident, Kind> {
        &self.fields
    }

    /// Whether the fact is an output fact.
    #[must_use]
    pub fn is_output(&self) -> bool {
        self.is_output
    }
}

/// A tunable parameter and its constraints.
#[derive(Clone, Debug, PartialEq)]
pub struct Parameter {
    pub(crate) default: Value,
    pub(crate) lower: Option<Value>,
    pub(crate) upper: Option<Value>,
    pub(crate) dictionary: bool,
}

impl Parameter {
    /// The default value.
    #[must_use]
    pub fn default_value(&self) -> &Value {
        &self.default
    }

    /// The inclusive lower limit, for numeric parameters.
    #[must_use]
    pub fn lower(&self) -> Option<&Value> {
        self.lower.as_ref()
    }

    /// The inclusive upper limit, for numeric parameters.
    #[must_use]
    pub fn upper(&self) -> Option<&Value> {
        self.upper.as_ref()
    }

    /// Whether the parameter is keyed (implicit `Key` field).
    #[must_use]
    pub fn is_dictionary(&self) -> bool {
        self.dictionary
    }
}

/// One match clause, positive or negative.
#[derive(Clone, Debug, PartialEq)]
pub struct Match {
    pub(crate) fact: Ident,
    pub(crate) meaning: String,
    pub(crate) when: Option<Expr>,
    pub(crate) assignments: IndexMap<Ident, Expr>,
}

impl Match {
    /// The matched fact.
    #[must_use]
    pub fn fact(&self) -> &Ident {
        &self.fact
    }

    /// The documented meaning of the clause.
    #[must_use]
    pub fn meaning(&self) -> &str {
        &self.meaning
    }

    /// The guard predicate, when present.
    #[must_use]
    pub fn when(&self) -> Option<&Expr> {
        self.when.as_ref()
    }

    /// The local bindings made by this clause.
    #[must_use]
    pub fn assignments(&self) -> &IndexMap<Ident, Expr> {
        &self.assignments
    }
}

/// What a rule does once its matches hold.
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    /// Insert a new fact.
    Assert {
        /// The produced fact.
        fact: Ident,
        /// One expression per field of the produced fact.
        fields: IndexMap<Ident, Expr>,
        /// Whether at most one copy of the fact may exist.
        distinct: bool,
    },
    /// Remove existing facts.
    Suppress {
        /// The suppressed fact.
        fact: Ident,
        /// Which rows to remove, evaluated in the fact's field scope.
        when: Expr,
    },
}

impl Action {
    /// The fact the action produces or suppresses.
    #[must_use]
    pub fn fact(&self) -> &Ident {
        match self {
            Action::Assert { fact, .. } | Action::Suppress { fact, .. } => fact,
        }
    }
}

/// One analysed rule.
#[derive(Clone, Debug, PartialEq)]
pub struct Rule {
    pub(crate) locals: IndexMap<Ident, Kind>,
    pub(crate) matches: Vec<Match>,
    pub(crate) inverted_matches: Vec<Match>,
    pub(crate) description: String,
    pub(crate) final_predicate: Expr,
    pub(crate) metadata: IndexMap<Ident, Vec<Value>>,
    pub(crate) action: Action,
}

impl Rule {
    /// The local variables bound by the rule's matches.
    #[must_use]
    pub fn locals(&self) -> &IndexMap<Ident, Kind> {
        &self.locals
    }

    /// The positive match clauses, in order.
    #[must_use]
    pub fn matches(&self) -> &[Match] {
        &self.matches
    }

    /// The negative match clauses.
    #[must_use]
    pub fn inverted_matches(&self) -> &[Match] {
        &self.inverted_matches
    }

    /// The rule description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The rule-level predicate; `true` when none was written.
    #[must_use]
    pub fn final_predicate(&self) -> &Expr {
        &self.final_predicate
    }

    /// Free-form metadata carried through to the emitted schema.
    #[must_use]
    pub fn metadata(&self) -> &IndexMap<Ident, Vec<Value>> {
        &self.metadata
    }

    /// The rule's action.
    #[must_use]
    pub fn action(&self) -> &Action {
        &self.action
    }
}

/// The analysed engine description: everything emission needs.
#[derive(Clone, Debug, PartialEq)]
pub struct Analysis {
    pub(crate) description: String,
    pub(crate) facts: IndexMap<Ident, Fact>,
    pub(crate) parameters: IndexMap<Ident, Parameter>,
    pub(crate) functions: IndexMap<Ident, FunctionDecl>,
    pub(crate) rules: IndexMap<Ident, Rule>,
    pub(crate) distinct_facts: IndexSet<Ident>,
}

impl Analysis {
    /// The merged document description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Every fact, including the implicit parameter facts and `InitialFact`.
    #[must_use]
    pub fn facts(&self) -> &IndexMap<Ident, Fact> {
        &self.facts
    }

    /// The declared parameters.
    #[must_use]
    pub fn parameters(&self) -> &IndexMap<Ident, Parameter> {
        &self.parameters
    }

    /// The declared external functions.
    #[must_use]
    pub fn functions(&self) -> &IndexMap<Ident, FunctionDecl> {
        &self.functions
    }

    /// The active rules.
    #[must_use]
    pub fn rules(&self) -> &IndexMap<Ident, Rule> {
        &self.rules
    }

    /// The facts produced by `!distinct` assertions.
    #[must_use]
    pub fn distinct_facts(&self) -> &IndexSet<Ident> {
        &self.distinct_facts
    }
}
