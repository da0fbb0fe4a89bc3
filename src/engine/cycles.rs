//! Cycle detection over the rule-dependency graph.
//!
//! Rule *A* depends on rule *B* when *B* matches (positively or negatively)
//! the fact *A* produces or suppresses: firing *A* can activate *B*. A cycle
//! in that graph means potentially unbounded recursive production, which
//! most database engines either forbid or mishandle, so by default a cycle
//! is a compile error.

use indexmap::{IndexMap, IndexSet};

use crate::engine::ir::Rule;
use crate::ident::Ident;

/// The rules activated by firing the given rule.
fn reachable(rules: &IndexMap<Ident, Rule>, from: &Rule) -> Vec<Ident> {
    let produced = from.action().fact();

    rules
        .iter()
        .filter(|(_, rule)| {
            rule.matches()
                .iter()
                .chain(rule.inverted_matches())
                .any(|clause| clause.fact() == produced)
        })
        .map(|(name, _)| name.clone())
        .collect()
}

/// Find a cycle in the rule-dependency graph, if one exists.
///
/// Returns the participating rule names starting at the repeated node, or
/// `None` when the graph is a DAG. Iterative depth-first search with a
/// pending set and a live stack: meeting a stack member again yields the
/// stack suffix from that member.
#[must_use]
pub fn find_cycle(rules: &IndexMap<Ident, Rule>) -> Option<Vec<Ident>> {
    let mut todo: IndexSet<Ident> = rules.keys().cloned().collect();

    while let Some(start) = todo.shift_remove_index(0) {
        let mut stack = vec![start];

        while let Some(top) = stack.last().cloned() {
            let Some(rule) = rules.get(&top) else {
                stack.pop();
                continue;
            };

            let mut advanced = false;
            for next in reachable(rules, rule) {
                if let Some(position) = stack.iter().position(|name| *name == next) {
                    return Some(stack[position..].to_vec());
                }

                if todo.shift_remove(&next) {
                    stack.push(next);
                    advanced = true;
                    break;
                }
            }

            if !advanced {
                stack.pop();
            }
        }
    }

    None
}
