//! Lowering expressions and joins to SQL fragments.
//!
//! The [`Lowerer`] carries the per-compilation backend state: the object
//! prefix, the once-domain memo, and the per-table index-demand trees. Two
//! entry points matter to the emitter: [`Lowerer::predicate`] extracts the
//! constant-only tests of a match (alpha pruning), and [`Lowerer::join`]
//! renders the full join condition while recording which indexes the query
//! planner will want.

use indexmap::{IndexMap, IndexSet};

use crate::engine::ir::Rule;
use crate::expr::ast::{locals_of, substitute, BinaryOp, Expr, Kind, Value};
use crate::ident::Ident;

/// A prefix tree of index demands for one table.
///
/// Each root-to-leaf path is one demanded column order. Inserting a demand
/// that is a prefix of an existing path adds nothing, so superset demands
/// dominate and only leaf paths become `CREATE INDEX` statements.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IndexTree {
    children: IndexMap<Ident, IndexTree>,
}

impl IndexTree {
    /// Collect every root-to-leaf path.
    fn leaf_paths(&self, path: &mut Vec<Ident>, found: &mut Vec<Vec<Ident>>) {
        if self.children.is_empty() {
            found.push(path.clone());
            return;
        }

        for (field, child) in &self.children {
            path.push(field.clone());
            child.leaf_paths(path, found);
            path.pop();
        }
    }
}

/// Per-compilation lowering state.
#[derive(Clone, Debug)]
pub struct Lowerer {
    prefix: String,
    domains: IndexMap<String, IndexSet<String>>,
    indexes: IndexMap<String, IndexTree>,
}

impl Lowerer {
    /// Create a lowerer for the given (validated) public prefix. Generated
    /// objects use the prefix with a leading underscore.
    #[must_use]
    pub fn new(public_prefix: &str) -> Self {
        Self {
            prefix: format!("_{}", public_prefix.to_lowercase()),
            domains: IndexMap::new(),
            indexes: IndexMap::new(),
        }
    }

    /// The internal object prefix (`_` + public prefix, folded).
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Render one expression as SQL. `frame_prefix` qualifies local
    /// references, `fact_prefix` qualifies `This` references.
    #[must_use]
    pub fn render_expr(
        &self,
        expr: &Expr,
        frame_prefix: Option<&str>,
        fact_prefix: Option<&str>,
    ) -> String {
        match expr {
            Expr::Literal(Value::Bool(value)) => {
                let rendered = if *value { "1" } else { "0" };
                rendered.to_owned()
            }
            Expr::Literal(Value::Int(value)) => value.to_string(),
            Expr::Literal(Value::Real(value)) => format!("{value:?}"),
            Expr::Literal(Value::Str(value)) => format!("'{}'", value.replace('\'', "''")),
            Expr::This { field, .. } => match fact_prefix {
                Some(prefix) => format!("{prefix}.{}", field.folded()),
                None => field.folded().to_owned(),
            },
            Expr::Local { name, .. } => match frame_prefix {
                Some(prefix) => format!("{prefix}.{}", name.folded()),
                None => name.folded().to_owned(),
            },
            Expr::Binary { op, lhs, rhs, .. } => format!(
                "({}) {} ({})",
                self.render_expr(lhs, frame_prefix, fact_prefix),
                op.sql(),
                self.render_expr(rhs, frame_prefix, fact_prefix),
            ),
            Expr::Unary { op, operand, .. } => format!(
                "({}({}))",
                op.sql(),
                self.render_expr(operand, frame_prefix, fact_prefix),
            ),
            Expr::If {
                predicate,
                then,
                otherwise,
                ..
            } => format!(
                "(CASE WHEN ({}) THEN ({}) ELSE ({}) END)",
                self.render_expr(predicate, frame_prefix, fact_prefix),
                self.render_expr(then, frame_prefix, fact_prefix),
                self.render_expr(otherwise, frame_prefix, fact_prefix),
            ),
            Expr::Cast { expr: inner, kind } => format!(
                "CAST(({}) AS {})",
                self.render_expr(inner, frame_prefix, fact_prefix),
                kind.sql_name(),
            ),
            Expr::Call { external, args, .. } => {
                let rendered: Vec<String> = args
                    .iter()
                    .map(|arg| self.render_expr(arg, frame_prefix, fact_prefix))
                    .collect();
                format!("{external}({})", rendered.join(","))
            }
            Expr::Join { .. } => {
                let mut leaves = Vec::new();
                join_leaves(expr, &mut leaves);

                let (equalities, inequalities): (Vec<&Expr>, Vec<&Expr>) = leaves
                    .into_iter()
                    .partition(|leaf| matches!(leaf, Expr::Binary { op: BinaryOp::Eq, .. }));

                equalities
                    .into_iter()
                    .chain(inequalities)
                    .map(|leaf| self.render_expr(leaf, frame_prefix, fact_prefix))
                    .collect::<Vec<_>>()
                    .join(" AND ")
            }
        }
    }

    /// The constant-only tests of a match predicate, rendered against the
    /// `new` row and sorted by the tested field.
    ///
    /// An empty result means the predicate constrains nothing at insert
    /// time; the caller marks the matched fact as output so it skips alpha
    /// pruning entirely.
    #[must_use]
    pub fn predicate_tests(&self, when: Option<&Expr>) -> Vec<String> {
        let mut tests = Vec::new();
        if let Some(when) = when {
            constant_tests(when, &mut tests);
        }
        tests.sort_by(|a, b| lhs_field(a).cmp(&lhs_field(b)));

        tests
            .into_iter()
            .map(|test| self.render_expr(test, None, Some("new")))
            .collect()
    }

    /// [`Lowerer::predicate_tests`] joined into one conjunction, `1` when
    /// there are no tests.
    #[must_use]
    pub fn predicate(&self, when: Option<&Expr>) -> String {
        let tests = self.predicate_tests(when);
        if tests.is_empty() {
            "1".to_owned()
        } else {
            tests.join(" AND ")
        }
    }

    /// Render a match predicate as a join condition, recording the index
    /// demands it implies.
    ///
    /// `Join` trees are flattened and the `This`-rooted tests partitioned
    /// into equalities and inequalities; equalities render first, each group
    /// sorted by the tested field, which is the order an index can serve.
    /// Tests whose right side is a literal are skipped unless
    /// `include_constants` (they are alpha-pruning's job). Returns `None`
    /// when no tests survive.
    ///
    /// Demands: a materialised frame side (prefix not `new`/`old`) demands
    /// the locals of the equalities plus the first inequality's locals; a
    /// materialised fact side demands the equality fields plus the first
    /// inequality's field.
    pub fn join(
        &mut self,
        when: &Expr,
        frame_prefix: Option<&str>,
        fact_prefix: Option<&str>,
        include_constants: bool,
    ) -> Option<String> {
        let frame_prefix = frame_prefix.map(str::to_lowercase);
        let fact_prefix = fact_prefix.map(str::to_lowercase);

        let mut leaves = Vec::new();
        join_leaves(when, &mut leaves);

        let mut equalities = Vec::new();
        let mut inequalities = Vec::new();
        for leaf in leaves {
            let Expr::Binary { op, rhs, .. } = leaf else {
                continue;
            };
            if rhs.as_literal().is_some() && !include_constants {
                continue;
            }
            if *op == BinaryOp::Eq {
                equalities.push(leaf);
            } else {
                inequalities.push(leaf);
            }
        }

        equalities.sort_by(|a, b| lhs_field(a).cmp(&lhs_field(b)));
        inequalities.sort_by(|a, b| lhs_field(a).cmp(&lhs_field(b)));

        let rendered: Vec<String> = equalities
            .iter()
            .chain(&inequalities)
            .map(|test| self.render_expr(test, frame_prefix.as_deref(), fact_prefix.as_deref()))
            .collect();
        if rendered.is_empty() {
            return None;
        }

        if let Some(frame) = &frame_prefix {
            if frame != "new" && frame != "old" {
                let mut fields: Vec<Ident> =
                    equalities.iter().flat_map(|test| locals_of(test)).collect();
                if let Some(first) = inequalities.first() {
                    fields.extend(locals_of(first));
                }
                self.add_index(frame, fields);
            }
        }

        if let Some(fact) = &fact_prefix {
            if fact != "new" && fact != "old" {
                let mut fields: Vec<Ident> =
                    equalities.iter().filter_map(|test| lhs_field(test)).collect();
                if let Some(first) = inequalities.first() {
                    fields.extend(lhs_field(first));
                }
                self.add_index(fact, fields);
            }
        }

        Some(rendered.join(" AND "))
    }

    /// Record one index demand for a table.
    fn add_index(&mut self, table: &str, fields: Vec<Ident>) {
        if fields.is_empty() {
            return;
        }

        let mut current = self.indexes.entry(table.to_lowercase()).or_default();
        for field in fields {
            current = current.children.entry(field).or_default();
        }
    }

    /// Emit `text` the first time it is seen in `domain`; later identical
    /// calls in the same compilation return the empty string.
    pub fn once(&mut self, domain: &str, text: &str) -> String {
        let seen = self.domains.entry(domain.to_lowercase()).or_default();
        if seen.insert(text.to_owned()) {
            text.to_owned()
        } else {
            String::new()
        }
    }

    /// The accumulated index demands as `CREATE INDEX` statements, one per
    /// leaf path, numbered in tree-walk order.
    #[must_use]
    pub fn indexes_sql(&self) -> String {
        let mut out = String::new();
        let mut number = 0;

        for (table, tree) in &self.indexes {
            let mut paths = Vec::new();
            tree.leaf_paths(&mut Vec::new(), &mut paths);

            for path in paths {
                number += 1;
                let fields: Vec<&str> = path.iter().map(Ident::folded).collect();
                out.push_str(&format!(
                    "\nCREATE INDEX {}_auto_index_{} ON {}({});",
                    self.prefix,
                    number,
                    table,
                    fields.join(",")
                ));
            }
        }

        out
    }
}

/// Flatten a `Join` tree into its `This`-rooted boolean tests. Anything
/// else hanging off a join is ignored, matching what the join renderer can
/// actually use.
fn join_leaves<'e>(expr: &'e Expr, found: &mut Vec<&'e Expr>) {
    match expr {
        Expr::Join { lhs, rhs } => {
            join_leaves(lhs, found);
            join_leaves(rhs, found);
        }
        Expr::Binary { kind, lhs, .. }
            if *kind == Kind::Bool && matches!(**lhs, Expr::This { .. }) =>
        {
            found.push(expr);
        }
        _ => {}
    }
}

/// Collect the constant-only tests of a predicate: `This`-rooted boolean
/// comparisons whose right side references no locals.
fn constant_tests<'e>(expr: &'e Expr, found: &mut Vec<&'e Expr>) {
    match expr {
        Expr::Join { lhs, rhs } => {
            constant_tests(lhs, found);
            constant_tests(rhs, found);
        }
        Expr::Binary { kind, lhs, rhs, .. }
            if *kind == Kind::Bool
                && matches!(**lhs, Expr::This { .. })
                && locals_of(rhs).is_empty() =>
        {
            found.push(expr);
        }
        _ => {}
    }
}

/// The folded left-hand field of a `This`-rooted test, for sorting and for
/// fact-side index demands.
fn lhs_field(test: &Expr) -> Option<Ident> {
    match test {
        Expr::Binary { lhs, .. } => match &**lhs {
            Expr::This { field, .. } => Some(field.clone()),
            _ => None,
        },
        _ => None,
    }
}

/// Lift cross-clause expressions into synthetic assignments.
///
/// When a later clause's `when` tests a `This` field against an expression
/// over locals bound by earlier clauses (and the right side is not already a
/// bare local), a fresh `synthetic_assignment_N` local is added to the
/// latest clause that binds any of the referenced locals; that clause's own
/// assignments are substituted into the lifted expression, and the test is
/// rewritten to reference the synthetic local. The equality partitioner can
/// then recognise and index the join.
pub fn rewrite_synthetic_assignments(rules: &mut IndexMap<Ident, Rule>) {
    let mut counter = 0_usize;

    for rule in rules.values_mut() {
        let positive_count = rule.matches.len();

        for clause in 1..positive_count {
            if let Some(when) = rule.matches[clause].when.take() {
                let rewritten = rewrite_when(when, rule, clause, &mut counter);
                rule.matches[clause].when = Some(rewritten);
            }
        }

        for clause in 0..rule.inverted_matches.len() {
            if let Some(when) = rule.inverted_matches[clause].when.take() {
                let rewritten = rewrite_when(when, rule, positive_count, &mut counter);
                rule.inverted_matches[clause].when = Some(rewritten);
            }
        }
    }
}

/// Rewrite one `when` tree; `limit` is the number of positive clauses whose
/// assignments are in scope (and may host synthetics).
fn rewrite_when(when: Expr, rule: &mut Rule, limit: usize, counter: &mut usize) -> Expr {
    match when {
        Expr::Join { lhs, rhs } => Expr::Join {
            lhs: Box::new(rewrite_when(*lhs, rule, limit, counter)),
            rhs: Box::new(rewrite_when(*rhs, rule, limit, counter)),
        },
        Expr::Binary { op, lhs, rhs, kind }
            if kind == Kind::Bool
                && matches!(*lhs, Expr::This { .. })
                && !matches!(*rhs, Expr::Local { .. }) =>
        {
            let used = locals_of(&rhs);
            if used.is_empty() {
                return Expr::Binary { op, lhs, rhs, kind };
            }

            let host = (0..limit).rev().find(|clause| {
                used.iter()
                    .any(|variable| rule.matches[*clause].assignments.contains_key(variable))
            });
            let Some(host) = host else {
                return Expr::Binary { op, lhs, rhs, kind };
            };

            *counter += 1;
            let name = Ident::new(&format!("synthetic_assignment_{counter}"));

            // Substitute the host clause's own assignments: they are not in
            // the frame yet when its assignments evaluate. Earlier clauses'
            // locals already are, and stay as references.
            let mut lifted = (*rhs).clone();
            for variable in &used {
                if let Some(definition) = rule.matches[host].assignments.get(variable).cloned() {
                    lifted = substitute(&lifted, variable, &definition);
                }
            }

            let synthetic_kind = lifted.kind();
            rule.locals.insert(name.clone(), synthetic_kind);
            rule.matches[host].assignments.insert(name.clone(), lifted);

            Expr::Binary {
                op,
                lhs,
                rhs: Box::new(Expr::Local {
                    name,
                    kind: synthetic_kind,
                }),
                kind,
            }
        }
        other => other,
    }
}
