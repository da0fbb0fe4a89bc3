//! Document-to-IR semantic analysis.
//!
//! Stages run in dependency order: functions, constants, facts, parameters,
//! rules, then the whole-rule-set checks (active rules exist, no suppression
//! of distinct productions, implicit output upgrades, cycle detection).
//! Failures inside one declaration are reported through `log::error!` and
//! counted; analysis of the remaining declarations continues, and a nonzero
//! count fails the compilation as a whole.

use std::fmt;

use indexmap::{IndexMap, IndexSet};
use thiserror::Error;

use crate::document::{Map, Node};
use crate::engine::cycles::find_cycle;
use crate::engine::ir::{Action, Analysis, Fact, Match, Parameter, Rule};
use crate::engine::SemanticError;
use crate::expr::ast::{Expr, FunctionDecl, Kind, Value};
use crate::expr::parser::parse_expression;
use crate::expr::Scope;
use crate::ident::Ident;

/// Analysis completed with errors; the count is the number reported.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("rule analysis failed with {count} error(s)")]
pub struct AnalysisErrors {
    /// How many errors were logged.
    pub count: usize,
}

/// Analyse a validated, merged rule document.
///
/// # Errors
/// When any declaration failed to analyse; every failure has already been
/// logged individually.
pub fn analyze(
    document: &Map,
    allow_regexp: bool,
    check_cycles: bool,
) -> Result<Analysis, AnalysisErrors> {
    let mut analyzer = Analyzer::new(allow_regexp);

    analyzer.load_functions(document);
    analyzer.load_constants(document);
    analyzer.load_facts(document);
    analyzer.load_parameters(document);
    analyzer.load_rules(document);
    analyzer.post_checks(check_cycles);

    analyzer.finish(document)
}

/// In-construction analysis state.
struct Analyzer {
    allow_regexp: bool,
    constants: IndexMap<Ident, Value>,
    functions: IndexMap<Ident, FunctionDecl>,
    facts: IndexMap<Ident, Fact>,
    parameters: IndexMap<Ident, Parameter>,
    rules: IndexMap<Ident, Rule>,
    distinct_facts: IndexSet<Ident>,
    errors: usize,
}

impl Analyzer {
    fn new(allow_regexp: bool) -> Self {
        let mut facts = IndexMap::new();
        let mut initial_fields = IndexMap::new();
        initial_fields.insert(Ident::new("InitializationTime"), Kind::Int);
        facts.insert(
            Ident::new("InitialFact"),
            Fact {
                fields: initial_fields,
                is_output: true,
            },
        );

        Self {
            allow_regexp,
            constants: IndexMap::new(),
            functions: IndexMap::new(),
            facts,
            parameters: IndexMap::new(),
            rules: IndexMap::new(),
            distinct_facts: IndexSet::new(),
            errors: 0,
        }
    }

    /// Log one failure and keep going.
    fn report(&mut self, message: impl fmt::Display) {
        self.errors += 1;
        log::error!("{message}");
    }

    /// Evaluate a document value: literals pass through, `!expr` strings are
    /// tokenised and parsed in the given scope.
    fn evaluate(
        &self,
        node: &Node,
        locals: &IndexMap<Ident, Kind>,
        this: Option<&IndexMap<Ident, Kind>>,
    ) -> Result<Expr, SemanticError> {
        match node {
            Node::Bool(value) => Ok(Expr::Literal(Value::Bool(*value))),
            Node::Int(value) => Ok(Expr::Literal(Value::Int(*value))),
            Node::Real(value) => Ok(Expr::Literal(Value::Real(*value))),
            Node::Str(value) => Ok(Expr::Literal(Value::Str(value.clone()))),
            Node::Expr(source) => {
                let scope = Scope::new(&self.constants, locals, this);
                Ok(parse_expression(
                    source,
                    scope,
                    &self.functions,
                    self.allow_regexp,
                )?)
            }
            other => Err(SemanticError::UnexpectedShape(other.describe())),
        }
    }

    /// Evaluate in a scope with no locals and no matched fact.
    fn evaluate_bare(&self, node: &Node) -> Result<Expr, SemanticError> {
        self.evaluate(node, &IndexMap::new(), None)
    }

    fn load_functions(&mut self, document: &Map) {
        let Some(Node::Map(section)) = document.get("Functions") else {
            return;
        };

        for (name, clause) in section.iter() {
            match function_decl(clause) {
                Ok(decl) => {
                    self.functions.insert(name.clone(), decl);
                }
                Err(cause) => {
                    self.report(format_args!(
                        "Error processing function declarations: {cause}"
                    ));
                }
            }
        }
    }

    fn load_constants(&mut self, document: &Map) {
        let Some(Node::Map(section)) = document.get("Constants") else {
            return;
        };

        for (name, node) in section.iter() {
            let evaluated = self.evaluate_bare(node).and_then(|expr| {
                expr.as_literal()
                    .cloned()
                    .ok_or_else(|| SemanticError::NotConstant(name.clone()))
            });

            match evaluated {
                Ok(value) => {
                    self.constants.insert(name.clone(), value);
                }
                Err(cause) => self.report(format_args!("Error processing constants: {cause}")),
            }
        }
    }

    fn load_facts(&mut self, document: &Map) {
        let Some(Node::Map(section)) = document.get("Facts") else {
            return;
        };

        for (name, declaration) in section.iter() {
            match fact_decl(declaration) {
                Ok(fact) => {
                    self.facts.insert(name.clone(), fact);
                }
                Err(cause) => self.report(format_args!("Error processing facts: {cause}")),
            }
        }
    }

    fn load_parameters(&mut self, document: &Map) {
        let Some(Node::Map(section)) = document.get("Parameters") else {
            return;
        };

        for (name, declaration) in section.iter() {
            match self.parameter(name, declaration) {
                Ok((parameter, fact)) => {
                    self.parameters.insert(name.clone(), parameter);
                    self.facts.insert(name.clone(), fact);
                }
                Err(cause) => self.report(format_args!("Error processing parameters: {cause}")),
            }
        }
    }

    /// Analyse one parameter, returning it with its implicit fact.
    fn parameter(&self, name: &Ident, node: &Node) -> Result<(Parameter, Fact), SemanticError> {
        if self.facts.contains_key(name) {
            return Err(SemanticError::ParameterCollision(name.clone()));
        }

        let Some(map) = node.as_map() else {
            return Err(SemanticError::UnexpectedShape(node.describe()));
        };

        let default = self.parameter_value(name, map, "Default")?;

        let (lower, upper) = if default.kind().is_numeric() {
            if !map.contains("Lower") {
                return Err(SemanticError::ParameterNoLower(name.clone()));
            }
            if !map.contains("Upper") {
                return Err(SemanticError::ParameterNoUpper(name.clone()));
            }

            let lower = self.parameter_value(name, map, "Lower")?;
            let upper = self.parameter_value(name, map, "Upper")?;

            if lower.kind() != default.kind() || upper.kind() != default.kind() {
                return Err(SemanticError::ParameterLimitTypes(name.clone()));
            }
            if !value_le(&lower, &upper) {
                return Err(SemanticError::ParameterLimitOrder(name.clone()));
            }
            if !value_le(&lower, &default) || !value_le(&default, &upper) {
                return Err(SemanticError::ParameterDefaultRange(name.clone()));
            }

            (Some(lower), Some(upper))
        } else {
            if map.contains("Lower") || map.contains("Upper") {
                return Err(SemanticError::ParameterLimitsOnNonNumeric(name.clone()));
            }
            (None, None)
        };

        let dictionary = map
            .get("Dictionary")
            .and_then(Node::as_bool)
            .unwrap_or(false);

        let mut fields = IndexMap::new();
        fields.insert(Ident::new("Value"), default.kind());
        if dictionary {
            fields.insert(Ident::new("Key"), Kind::Str);
        }

        Ok((
            Parameter {
                default,
                lower,
                upper,
                dictionary,
            },
            Fact::new(fields),
        ))
    }

    /// Evaluate one parameter entry to a literal.
    fn parameter_value(
        &self,
        name: &Ident,
        map: &Map,
        key: &str,
    ) -> Result<Value, SemanticError> {
        let Some(node) = map.get(key) else {
            return Err(SemanticError::ParameterNotConstant(name.clone()));
        };
        self.evaluate_bare(node)?
            .as_literal()
            .cloned()
            .ok_or_else(|| SemanticError::ParameterNotConstant(name.clone()))
    }

    fn load_rules(&mut self, document: &Map) {
        let Some(Node::Map(section)) = document.get("Rules") else {
            return;
        };

        for (name, clause) in section.iter() {
            let Some(clause) = clause.as_map() else {
                self.report(format_args!(
                    "Error processing rule '{name}': not a dictionary"
                ));
                continue;
            };

            if clause.get("Enabled").and_then(Node::as_bool) == Some(false) {
                continue;
            }

            match self.rule(clause) {
                Ok(rule) => {
                    if let Action::Assert {
                        fact,
                        distinct: true,
                        ..
                    } = rule.action()
                    {
                        self.distinct_facts.insert(fact.clone());
                    }
                    self.rules.insert(name.clone(), rule);
                }
                Err(cause) => {
                    self.report(format_args!("Error processing rule '{name}': {cause}"));
                }
            }
        }
    }

    /// Analyse one rule clause.
    fn rule(&self, clause: &Map) -> Result<Rule, SemanticError> {
        let description = clause
            .get("Description")
            .and_then(Node::as_str)
            .unwrap_or_default()
            .to_owned();

        let mut locals = IndexMap::new();
        let mut matches = Vec::new();
        let mut inverted_matches = Vec::new();

        if let Some(Node::List(clauses)) = clause.get("MatchAll") {
            for match_node in clauses {
                matches.push(self.match_clause(match_node, &mut locals, true)?);
            }
        }

        if let Some(Node::List(clauses)) = clause.get("MatchNone") {
            for match_node in clauses {
                inverted_matches.push(self.match_clause(match_node, &mut locals, false)?);
            }
        }

        let final_predicate = match clause.get("When") {
            Some(node) => {
                let predicate = self.evaluate(node, &locals, None)?;
                if predicate.kind() != Kind::Bool {
                    return Err(SemanticError::FinalPredicateNotBoolean);
                }
                predicate
            }
            None => Expr::Literal(Value::Bool(true)),
        };

        let metadata = self.metadata(clause)?;

        let action = if let Some(produce) = clause.get("Assert") {
            self.assertion(produce, &locals)?
        } else {
            self.suppression(clause.get("Suppress"), &locals)?
        };

        Ok(Rule {
            locals,
            matches,
            inverted_matches,
            description,
            final_predicate,
            metadata,
            action,
        })
    }

    /// Analyse one positive or negative match clause, extending `locals`
    /// with its assignments.
    fn match_clause(
        &self,
        node: &Node,
        locals: &mut IndexMap<Ident, Kind>,
        allow_assign: bool,
    ) -> Result<Match, SemanticError> {
        let Some(map) = node.as_map() else {
            return Err(SemanticError::UnexpectedShape(node.describe()));
        };

        let fact_name = map
            .get("Fact")
            .and_then(Node::as_str)
            .map(Ident::new)
            .ok_or_else(|| SemanticError::UnknownFact(Ident::new("")))?;
        let fact = self
            .facts
            .get(&fact_name)
            .ok_or_else(|| SemanticError::UnknownFact(fact_name.clone()))?;

        let meaning = map
            .get("Meaning")
            .and_then(Node::as_str)
            .unwrap_or_default()
            .to_owned();

        let when = match map.get("When") {
            Some(node) => {
                let predicate = self.evaluate(node, locals, Some(fact.fields()))?;
                ensure_joinable(&predicate)?;
                Some(predicate)
            }
            None => None,
        };

        let mut assignments = IndexMap::new();
        if allow_assign {
            if let Some(Node::Map(assign)) = map.get("Assign") {
                for (variable, value) in assign.iter() {
                    if locals.contains_key(variable) {
                        return Err(SemanticError::DuplicateAssignment(variable.clone()));
                    }

                    let expr = self.evaluate(value, locals, Some(fact.fields()))?;
                    locals.insert(variable.clone(), expr.kind());
                    assignments.insert(variable.clone(), expr);
                }
            }
        }

        Ok(Match {
            fact: fact_name,
            meaning,
            when,
            assignments,
        })
    }

    /// Analyse an `Assert` clause.
    fn assertion(
        &self,
        node: &Node,
        locals: &IndexMap<Ident, Kind>,
    ) -> Result<Action, SemanticError> {
        let Some(produce) = node.as_map() else {
            return Err(SemanticError::UnexpectedShape(node.describe()));
        };
        let distinct = produce.is_distinct();

        let Some((produced_name, fields_node)) = produce.iter().next() else {
            return Err(SemanticError::UnknownFact(Ident::new("")));
        };

        let fact = self
            .facts
            .get(produced_name)
            .ok_or_else(|| SemanticError::UnknownFact(produced_name.clone()))?;
        if self.parameters.contains_key(produced_name) {
            return Err(SemanticError::ProduceParameter);
        }

        let mut produced: IndexMap<Ident, Option<Expr>> = fact
            .fields()
            .keys()
            .map(|field| (field.clone(), None))
            .collect();

        if let Some(assignments) = fields_node.as_map() {
            for (field, value) in assignments.iter() {
                let Some(expected) = fact.fields().get(field) else {
                    return Err(SemanticError::UnknownProducedField(field.clone()));
                };

                let expr = self.evaluate(value, locals, None)?;
                if expr.kind() != *expected {
                    return Err(SemanticError::ProducedFieldType(field.clone()));
                }

                produced.insert(field.clone(), Some(expr));
            }
        }

        let mut fields = IndexMap::new();
        for (field, expr) in produced {
            match expr {
                Some(expr) => {
                    fields.insert(field, expr);
                }
                None => return Err(SemanticError::UnassignedField(field)),
            }
        }

        if distinct && fields.is_empty() {
            return Err(SemanticError::DistinctWithoutFields);
        }

        Ok(Action::Assert {
            fact: produced_name.clone(),
            fields,
            distinct,
        })
    }

    /// Analyse a `Suppress` clause.
    fn suppression(
        &self,
        node: Option<&Node>,
        locals: &IndexMap<Ident, Kind>,
    ) -> Result<Action, SemanticError> {
        let Some(map) = node.and_then(Node::as_map) else {
            return Err(SemanticError::SuppressWithoutWhen);
        };

        let fact_name = map
            .get("Fact")
            .and_then(Node::as_str)
            .map(Ident::new)
            .ok_or_else(|| SemanticError::UnknownFact(Ident::new("")))?;
        let fact = self
            .facts
            .get(&fact_name)
            .ok_or_else(|| SemanticError::UnknownFact(fact_name.clone()))?;
        if self.parameters.contains_key(&fact_name) {
            return Err(SemanticError::SuppressParameter);
        }

        let when_node = map.get("When").ok_or(SemanticError::SuppressWithoutWhen)?;
        let when = self.evaluate(when_node, locals, Some(fact.fields()))?;

        Ok(Action::Suppress {
            fact: fact_name,
            when,
        })
    }

    /// Evaluate rule metadata to literal lists.
    fn metadata(&self, clause: &Map) -> Result<IndexMap<Ident, Vec<Value>>, SemanticError> {
        let mut metadata = IndexMap::new();

        if let Some(Node::Map(section)) = clause.get("Metadata") {
            for (key, list) in section.iter() {
                let mut values = Vec::new();
                for item in list.as_list().unwrap_or_default() {
                    let value = self
                        .evaluate_bare(item)?
                        .as_literal()
                        .cloned()
                        .ok_or_else(|| SemanticError::MetadataNotConstant(key.clone()))?;
                    values.push(value);
                }
                metadata.insert(key.clone(), values);
            }
        }

        Ok(metadata)
    }

    /// The whole-rule-set checks run after every rule has been analysed.
    fn post_checks(&mut self, check_cycles: bool) {
        if self.rules.is_empty() {
            self.report("At least one rule must be defined and active.");
        }

        let suppressions: Vec<(Ident, Ident)> = self
            .rules
            .iter()
            .filter_map(|(name, rule)| match rule.action() {
                Action::Suppress { fact, .. } if self.distinct_facts.contains(fact) => {
                    Some((name.clone(), fact.clone()))
                }
                _ => None,
            })
            .collect();
        for (rule_name, fact) in suppressions {
            self.report(format_args!(
                "Rule {rule_name} attempts to suppress facts of type '{fact}', \
                 which are produced distinctly by some rule(s)."
            ));
        }

        // Facts that are produced or suppressed but never matched are
        // implicitly output.
        let mut only_produced: IndexSet<Ident> = self
            .rules
            .values()
            .map(|rule| rule.action().fact().clone())
            .collect();
        for rule in self.rules.values() {
            for clause in rule.matches().iter().chain(rule.inverted_matches()) {
                only_produced.shift_remove(clause.fact());
            }
        }
        for fact_name in only_produced {
            if let Some(fact) = self.facts.get_mut(&fact_name) {
                fact.mark_output();
            }
        }

        if check_cycles {
            if let Some(cycle) = find_cycle(&self.rules) {
                let names: Vec<String> = cycle.iter().map(ToString::to_string).collect();
                self.report(format_args!(
                    "A cycle exists in the rule set: {}",
                    names.join(" -> ")
                ));
            }
        }
    }

    /// Close the analysis, failing when anything was reported.
    fn finish(self, document: &Map) -> Result<Analysis, AnalysisErrors> {
        if self.errors > 0 {
            return Err(AnalysisErrors { count: self.errors });
        }

        let description = document
            .get("Description")
            .and_then(Node::as_str)
            .unwrap_or_default()
            .to_owned();

        Ok(Analysis {
            description,
            facts: self.facts,
            parameters: self.parameters,
            functions: self.functions,
            rules: self.rules,
            distinct_facts: self.distinct_facts,
        })
    }
}

/// Parse one function declaration.
fn function_decl(node: &Node) -> Result<FunctionDecl, SemanticError> {
    let Some(map) = node.as_map() else {
        return Err(SemanticError::UnexpectedShape(node.describe()));
    };

    let external = map
        .get("External")
        .and_then(Node::as_str)
        .unwrap_or_default()
        .to_owned();

    let mut params = Vec::new();
    for item in map
        .get("Parameters")
        .and_then(Node::as_list)
        .unwrap_or_default()
    {
        params.push(type_tag(item)?);
    }

    let returns = map
        .get("Returns")
        .map(type_tag)
        .transpose()?
        .unwrap_or(Kind::Str);

    Ok(FunctionDecl::new(&external, params, returns))
}

/// Parse one fact declaration.
fn fact_decl(node: &Node) -> Result<Fact, SemanticError> {
    let Some(map) = node.as_map() else {
        return Err(SemanticError::UnexpectedShape(node.describe()));
    };

    let mut fields = IndexMap::new();
    for (field, type_node) in map.iter() {
        fields.insert(field.clone(), type_tag(type_node)?);
    }

    let mut fact = Fact::new(fields);
    if map.is_output() {
        fact.mark_output();
    }
    Ok(fact)
}

/// Resolve a surface type name to its tag.
fn type_tag(node: &Node) -> Result<Kind, SemanticError> {
    let name = node.as_str().unwrap_or_default();
    Kind::from_type_name(name).ok_or_else(|| SemanticError::UnknownTypeName(name.to_owned()))
}

/// Reject match predicates the lowerer cannot join on.
fn ensure_joinable(predicate: &Expr) -> Result<(), SemanticError> {
    match predicate {
        Expr::Join { .. } => Ok(()),
        Expr::Binary { lhs, .. } if matches!(**lhs, Expr::This { .. }) => Ok(()),
        other => Err(SemanticError::NotJoinable(other.clone())),
    }
}

/// Whether `lhs <= rhs` for two literals of the same numeric kind.
fn value_le(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Int(left), Value::Int(right)) => left <= right,
        (Value::Real(left), Value::Real(right)) => left <= right,
        _ => false,
    }
}
