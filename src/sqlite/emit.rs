//! Schema text generation.
//!
//! The emitted script is a complete forward-chaining engine: one table per
//! fact, seeded parameter tables, a view per output fact, alpha-pruning
//! triggers, and per-rule trigger chains that accumulate partial matches in
//! frame tables and fire the rule's action from the last frame. The
//! automatically inferred `CREATE INDEX` statements are appended last.
//!
//! Emission is deterministic: the same analysis, prefix and timestamp
//! produce byte-identical output.

use std::fmt::Write as _;

use indexmap::IndexMap;

use crate::engine::ir::{Action, Analysis, Fact, Match, Rule};
use crate::expr::ast::{Expr, Kind};
use crate::ident::Ident;
use crate::sqlite::lower::{rewrite_synthetic_assignments, Lowerer};

/// Render the full schema for an analysed rule set.
///
/// `source` names the compiled input files and `timestamp` is the header
/// compile time, passed in so that emission itself stays deterministic.
#[must_use]
pub fn generate(
    public_prefix: &str,
    source: &str,
    timestamp: &str,
    analysis: &mut Analysis,
) -> String {
    let mut lowerer = Lowerer::new(public_prefix);

    upgrade_unpruned_facts(&lowerer, analysis);
    rewrite_synthetic_assignments(&mut analysis.rules);

    let prefix = lowerer.prefix().to_owned();
    let mut out = String::new();

    header(&mut out, source, timestamp, analysis.description());

    let _ = writeln!(out, "PRAGMA recursive_triggers = 1;");

    fact_tables(&mut out, &mut lowerer, &prefix, analysis);
    seed_initial_fact(&mut out, &prefix);
    parameter_seeds(&mut out, &mut lowerer, &prefix, analysis);
    output_views(&mut out, &prefix, analysis);
    prune_triggers(&mut out, &lowerer, &prefix, analysis);

    for (name, rule) in &analysis.rules {
        rule_section(&mut out, &mut lowerer, &prefix, name, rule);
    }

    out.push_str(&lowerer.indexes_sql());
    out.push('\n');
    out
}

/// Facts matched by at least one clause with no constant tests cannot be
/// alpha-pruned at all; mark them output so the pruning stage skips them.
fn upgrade_unpruned_facts(lowerer: &Lowerer, analysis: &mut Analysis) {
    let mut upgraded = Vec::new();

    for rule in analysis.rules.values() {
        for clause in rule.matches().iter().chain(rule.inverted_matches()) {
            if lowerer.predicate_tests(clause.when()).is_empty() {
                upgraded.push(clause.fact().clone());
            }
        }
    }

    for name in upgraded {
        if let Some(fact) = analysis.facts.get_mut(&name) {
            fact.mark_output();
        }
    }
}

fn header(out: &mut String, source: &str, timestamp: &str, description: &str) {
    let _ = writeln!(out, "-- Inference schema compiled from: {source}");
    let _ = writeln!(out, "-- Compiled: {timestamp}");
    for line in description.lines() {
        let line = line.trim();
        if !line.is_empty() {
            let _ = writeln!(out, "-- {line}");
        }
    }
    out.push('\n');
}

/// The table holding live facts of one type.
fn fact_table(prefix: &str, fact: &Ident) -> String {
    format!("{prefix}_facts_{}", fact.folded())
}

/// The frame table holding partial matches of one rule after one clause.
fn frame_table(prefix: &str, rule: &Ident, clause: usize) -> String {
    format!("{prefix}_{}_frame_{clause}", rule.folded())
}

/// The `CREATE TABLE` statement for one fact.
fn create_fact_table(prefix: &str, name: &Ident, fact: &Fact) -> String {
    let columns: Vec<String> = fact
        .fields()
        .iter()
        .map(|(field, kind)| format!("    {} {}", field.folded(), kind.sql_name()))
        .collect();

    format!(
        "CREATE TABLE {} (\n{}\n);\n",
        fact_table(prefix, name),
        columns.join(",\n")
    )
}

/// Emit one table per fact. Parameter facts are in the fact map too, so the
/// once-domain keeps the parameter stage from emitting their tables twice.
fn fact_tables(out: &mut String, lowerer: &mut Lowerer, prefix: &str, analysis: &Analysis) {
    for (name, fact) in &analysis.facts {
        out.push_str(&lowerer.once("tables", &create_fact_table(prefix, name, fact)));
    }
    out.push('\n');
}

/// Seed the distinguished initial fact at schema-load time.
fn seed_initial_fact(out: &mut String, prefix: &str) {
    let _ = writeln!(
        out,
        "INSERT INTO {}_facts_initialfact (initializationtime) VALUES (strftime('%s','now'));",
        prefix
    );
    out.push('\n');
}

/// Ensure each parameter's table exists and seed its default value.
fn parameter_seeds(out: &mut String, lowerer: &mut Lowerer, prefix: &str, analysis: &Analysis) {
    for (name, parameter) in &analysis.parameters {
        if let Some(fact) = analysis.facts.get(name) {
            out.push_str(&lowerer.once("tables", &create_fact_table(prefix, name, fact)));
        }

        let bounds = match (parameter.lower(), parameter.upper()) {
            (Some(lower), Some(upper)) => format!(", range [{lower}, {upper}]"),
            _ => String::new(),
        };
        let _ = writeln!(
            out,
            "-- parameter {name}: default {}{bounds}{}",
            parameter.default_value(),
            if parameter.is_dictionary() { ", dictionary" } else { "" },
        );

        if parameter.is_dictionary() {
            continue;
        }

        let default = lowerer.render_expr(
            &Expr::Literal(parameter.default_value().clone()),
            None,
            None,
        );
        let _ = writeln!(
            out,
            "INSERT INTO {} (value) VALUES ({default});",
            fact_table(prefix, name)
        );
    }
    out.push('\n');
}

/// One view per output fact.
fn output_views(out: &mut String, prefix: &str, analysis: &Analysis) {
    for (name, fact) in &analysis.facts {
        if !fact.is_output() {
            continue;
        }

        let fields: Vec<&str> = fact.fields().keys().map(Ident::folded).collect();
        let _ = writeln!(
            out,
            "CREATE VIEW {prefix}_view_{} AS SELECT {} FROM {};",
            name.folded(),
            fields.join(", "),
            fact_table(prefix, name)
        );
    }
    out.push('\n');
}

/// Alpha pruning: inserted facts that satisfy no match predicate are
/// deleted immediately. Output facts are exempt.
fn prune_triggers(out: &mut String, lowerer: &Lowerer, prefix: &str, analysis: &Analysis) {
    let mut retained: IndexMap<Ident, Vec<String>> = IndexMap::new();

    for rule in analysis.rules.values() {
        for clause in rule.matches().iter().chain(rule.inverted_matches()) {
            let Some(fact) = analysis.facts.get(clause.fact()) else {
                continue;
            };
            if fact.is_output() {
                continue;
            }

            retained
                .entry(clause.fact().clone())
                .or_default()
                .push(lowerer.predicate(clause.when()));
        }
    }

    for (name, predicates) in retained {
        let table = fact_table(prefix, &name);
        let _ = writeln!(
            out,
            "CREATE TRIGGER {prefix}_prune_{} AFTER INSERT ON {table}\n\
             FOR EACH ROW WHEN NOT ({})\n\
             BEGIN\n    DELETE FROM {table} WHERE rowid = new.rowid;\nEND;\n",
            name.folded(),
            predicates.join(" OR "),
        );
    }
}

/// The locals visible after each positive clause, cumulatively.
fn locals_after(matches: &[Match]) -> Vec<Vec<(Ident, Kind)>> {
    let mut accumulated = Vec::new();
    let mut visible: Vec<(Ident, Kind)> = Vec::new();

    for clause in matches {
        for (name, expr) in clause.assignments() {
            visible.push((name.clone(), expr.kind()));
        }
        accumulated.push(visible.clone());
    }

    accumulated
}

/// Frame-table columns for a set of visible locals; a dummy column keeps
/// local-free frames representable.
fn frame_columns(locals: &[(Ident, Kind)]) -> Vec<String> {
    if locals.is_empty() {
        return vec!["matched integer".to_owned()];
    }
    locals
        .iter()
        .map(|(name, kind)| format!("{} {}", name.folded(), kind.sql_name()))
        .collect()
}

/// Emit one rule: its description, frame tables, match triggers and the
/// firing trigger.
fn rule_section(out: &mut String, lowerer: &mut Lowerer, prefix: &str, name: &Ident, rule: &Rule) {
    let _ = writeln!(out, "-- Rule {name}: {}", rule.description());
    for (key, values) in rule.metadata() {
        let rendered: Vec<String> = values.iter().map(ToString::to_string).collect();
        let _ = writeln!(out, "-- {key}: {}", rendered.join(", "));
    }

    if rule.matches().is_empty() {
        let _ = writeln!(out, "-- (no match clauses; rule never fires)\n");
        return;
    }

    let visible = locals_after(rule.matches());

    for (clause, locals) in visible.iter().enumerate() {
        let columns = frame_columns(locals);
        let _ = writeln!(
            out,
            "CREATE TABLE {} (\n    {}\n);",
            frame_table(prefix, name, clause),
            columns.join(",\n    ")
        );
    }
    out.push('\n');

    for (clause, matched) in rule.matches().iter().enumerate() {
        match_trigger(out, lowerer, prefix, name, clause, matched, &visible);
        if clause > 0 {
            frame_trigger(out, lowerer, prefix, name, clause, matched, &visible);
        }
    }

    fire_trigger(out, lowerer, prefix, name, rule, &visible);
}

/// Column names of one frame.
fn frame_column_names(locals: &[(Ident, Kind)]) -> Vec<String> {
    if locals.is_empty() {
        return vec!["matched".to_owned()];
    }
    locals.iter().map(|(name, _)| name.folded().to_owned()).collect()
}

/// The trigger activating clause `index` when a matching fact arrives:
/// joins the inserted row against the previous frame.
fn match_trigger(
    out: &mut String,
    lowerer: &mut Lowerer,
    prefix: &str,
    name: &Ident,
    index: usize,
    matched: &Match,
    visible: &[Vec<(Ident, Kind)>],
) {
    let table = fact_table(prefix, matched.fact());
    let target = frame_table(prefix, name, index);
    let previous = index.checked_sub(1).map(|i| frame_table(prefix, name, i));

    let mut exprs: Vec<String> = Vec::new();
    if let Some(previous) = &previous {
        let carried = &visible[index - 1];
        exprs.extend(
            carried
                .iter()
                .map(|(local, _)| format!("{previous}.{}", local.folded())),
        );
    }
    exprs.extend(
        matched
            .assignments()
            .values()
            .map(|expr| lowerer.render_expr(expr, previous.as_deref(), Some("new"))),
    );
    if exprs.is_empty() {
        exprs.push("1".to_owned());
    }

    let condition = match (&previous, matched.when()) {
        (Some(previous), Some(when)) => {
            lowerer.join(when, Some(previous.as_str()), Some("new"), false)
        }
        _ => None,
    };

    let _ = writeln!(
        out,
        "CREATE TRIGGER {prefix}_{}_match_{index} AFTER INSERT ON {table}",
        name.folded()
    );
    let _ = writeln!(out, "FOR EACH ROW WHEN ({})", lowerer.predicate(matched.when()));
    let _ = writeln!(out, "BEGIN");
    let _ = writeln!(
        out,
        "    INSERT INTO {target} ({})",
        frame_column_names(&visible[index]).join(", ")
    );
    let _ = writeln!(out, "    SELECT {}", exprs.join(", "));
    if let Some(previous) = &previous {
        let _ = writeln!(out, "    FROM {previous}");
    }
    if let Some(condition) = condition {
        let _ = writeln!(out, "    WHERE {condition}");
    }
    let _ = writeln!(out, "    ;\nEND;\n");
}

/// The trigger activating clause `index` when the previous frame grows:
/// joins the new frame row against the already-materialised facts. This is
/// the join that demands indexes on the fact table.
fn frame_trigger(
    out: &mut String,
    lowerer: &mut Lowerer,
    prefix: &str,
    name: &Ident,
    index: usize,
    matched: &Match,
    visible: &[Vec<(Ident, Kind)>],
) {
    let table = fact_table(prefix, matched.fact());
    let target = frame_table(prefix, name, index);
    let previous = frame_table(prefix, name, index - 1);

    let mut exprs: Vec<String> = visible[index - 1]
        .iter()
        .map(|(local, _)| format!("new.{}", local.folded()))
        .collect();
    exprs.extend(
        matched
            .assignments()
            .values()
            .map(|expr| lowerer.render_expr(expr, Some("new"), Some(table.as_str()))),
    );
    if exprs.is_empty() {
        exprs.push("1".to_owned());
    }

    let condition = matched
        .when()
        .and_then(|when| lowerer.join(when, Some("new"), Some(table.as_str()), true));

    let _ = writeln!(
        out,
        "CREATE TRIGGER {prefix}_{}_join_{index} AFTER INSERT ON {previous}",
        name.folded()
    );
    let _ = writeln!(out, "FOR EACH ROW");
    let _ = writeln!(out, "BEGIN");
    let _ = writeln!(
        out,
        "    INSERT INTO {target} ({})",
        frame_column_names(&visible[index]).join(", ")
    );
    let _ = writeln!(out, "    SELECT {}", exprs.join(", "));
    let _ = writeln!(out, "    FROM {table}");
    if let Some(condition) = condition {
        let _ = writeln!(out, "    WHERE {condition}");
    }
    let _ = writeln!(out, "    ;\nEND;\n");
}

/// The guards shared by both actions: every negative match must be empty.
fn negative_guards(lowerer: &mut Lowerer, prefix: &str, rule: &Rule) -> Vec<String> {
    rule.inverted_matches()
        .iter()
        .map(|inverted| {
            let table = fact_table(prefix, inverted.fact());
            let condition = inverted
                .when()
                .and_then(|when| lowerer.join(when, Some("new"), Some(table.as_str()), true));

            match condition {
                Some(condition) => {
                    format!("NOT EXISTS (SELECT 1 FROM {table} WHERE {condition})")
                }
                None => format!("NOT EXISTS (SELECT 1 FROM {table})"),
            }
        })
        .collect()
}

/// The trigger firing the rule's action when the last frame grows.
fn fire_trigger(
    out: &mut String,
    lowerer: &mut Lowerer,
    prefix: &str,
    name: &Ident,
    rule: &Rule,
    visible: &[Vec<(Ident, Kind)>],
) {
    let last = frame_table(prefix, name, visible.len() - 1);
    let mut guards = negative_guards(lowerer, prefix, rule);

    let _ = writeln!(
        out,
        "CREATE TRIGGER {prefix}_{}_fire AFTER INSERT ON {last}",
        name.folded()
    );
    let _ = writeln!(
        out,
        "FOR EACH ROW WHEN ({})",
        lowerer.render_expr(rule.final_predicate(), Some("new"), None)
    );
    let _ = writeln!(out, "BEGIN");

    match rule.action() {
        Action::Assert {
            fact,
            fields,
            distinct,
        } => {
            let table = fact_table(prefix, fact);
            let columns: Vec<&str> = fields.keys().map(Ident::folded).collect();
            let exprs: Vec<String> = fields
                .values()
                .map(|expr| lowerer.render_expr(expr, Some("new"), None))
                .collect();

            if *distinct {
                let tests: Vec<String> = fields
                    .iter()
                    .map(|(field, expr)| {
                        format!(
                            "{} = ({})",
                            field.folded(),
                            lowerer.render_expr(expr, Some("new"), None)
                        )
                    })
                    .collect();
                guards.push(format!(
                    "NOT EXISTS (SELECT 1 FROM {table} WHERE {})",
                    tests.join(" AND ")
                ));
            }

            let _ = writeln!(out, "    INSERT INTO {table} ({})", columns.join(", "));
            let _ = writeln!(out, "    SELECT {}", exprs.join(", "));
            if !guards.is_empty() {
                let _ = writeln!(out, "    WHERE {}", guards.join("\n      AND "));
            }
            let _ = writeln!(out, "    ;");
        }
        Action::Suppress { fact, when } => {
            let table = fact_table(prefix, fact);
            let mut conditions = vec![format!(
                "({})",
                lowerer.render_expr(when, Some("new"), Some(table.as_str()))
            )];
            conditions.extend(guards);

            let _ = writeln!(out, "    DELETE FROM {table}");
            let _ = writeln!(out, "    WHERE {}", conditions.join("\n      AND "));
            let _ = writeln!(out, "    ;");
        }
    }

    let _ = writeln!(out, "END;\n");
}
