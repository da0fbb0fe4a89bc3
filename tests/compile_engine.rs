use pretty_assertions::assert_str_eq;

use crate::common::{analysis_errors, compile_module};

pub mod common;

/// A small but complete engine: a constant, a bounded parameter, an
/// external function, a matched fact and an output fact.
const WATCHER: &str = r#"
Description: Failed login watcher
Constants:
  Threshold: !expr "1 + 2 * 3"
Parameters:
  Window:
    Default: 30
    Lower: 1
    Upper: 3600
Functions:
  Hostname:
    External: hostname_of
    Parameters: [STRING]
    Returns: STRING
Facts:
  Login:
    User: STRING
    Count: INTEGER
  Alert: !output
    User: STRING
    Total: INTEGER
Rules:
  RaiseAlert:
    Description: Raise an alert for noisy users
    Metadata:
      Severity: [3]
    MatchAll:
      - Fact: Login
        Meaning: a login burst
        When: !expr "This.Count > Constants.Threshold"
        Assign:
          Who: !expr "This.User"
          Seen: !expr "This.Count"
    When: !expr "Locals.Seen > 0"
    Assert:
      Alert:
        User: !expr "Locals.Who"
        Total: !expr "Locals.Seen + 0"
"#;

#[test]
fn compiles_a_complete_engine() {
    let schema = compile_module(WATCHER).expect("compiles");

    // Tables for every fact, including the parameter's implicit fact and
    // the initial fact.
    assert!(schema.contains("CREATE TABLE _test_facts_login ("));
    assert!(schema.contains("CREATE TABLE _test_facts_alert ("));
    assert!(schema.contains("CREATE TABLE _test_facts_window ("));
    assert!(schema.contains("CREATE TABLE _test_facts_initialfact ("));

    // The parameter default is seeded.
    assert!(schema.contains("INSERT INTO _test_facts_window (value) VALUES (30);"));

    // Output facts get views; matched-only facts do not.
    assert!(schema.contains("CREATE VIEW _test_view_alert "));
    assert!(schema.contains("CREATE VIEW _test_view_initialfact "));
    assert!(!schema.contains("CREATE VIEW _test_view_login "));

    // The rule's trigger chain exists.
    assert!(schema.contains("CREATE TRIGGER _test_raisealert_match_0 AFTER INSERT ON _test_facts_login"));
    assert!(schema.contains("CREATE TRIGGER _test_raisealert_fire AFTER INSERT ON _test_raisealert_frame_0"));

    // Metadata survives as a comment.
    assert!(schema.contains("-- Severity: 3"));
}

/// The constant folded at compile time: the schema tests against the
/// literal, not the expression.
#[test]
fn constants_fold_into_the_schema() {
    let schema = compile_module(WATCHER).expect("compiles");
    assert!(schema.contains("(new.count) > (7)"));
    assert!(!schema.contains("1 + 2 * 3"));
}

#[test]
fn alpha_pruning_targets_non_output_facts() {
    let schema = compile_module(WATCHER).expect("compiles");
    assert!(schema.contains("CREATE TRIGGER _test_prune_login AFTER INSERT ON _test_facts_login"));
    assert!(schema.contains("WHEN NOT ((new.count) > (7))"));
    assert!(!schema.contains("_test_prune_alert"));
}

#[test]
fn emission_is_deterministic() {
    let first = compile_module(WATCHER).expect("compiles");
    let second = compile_module(WATCHER).expect("compiles");
    assert_str_eq!(first, second);
}

/// A fact that is only ever asserted is upgraded to output.
#[test]
fn produced_but_never_matched_facts_become_output() {
    let schema = compile_module(
        r#"
Facts:
  Score:
    Points: INTEGER
Rules:
  Seed:
    Description: seed the score
    MatchAll:
      - Fact: InitialFact
        Meaning: startup
    Assert:
      Score:
        Points: 0
"#,
    )
    .expect("compiles");

    assert!(schema.contains("CREATE VIEW _test_view_score "));
}

/// Distinct production guards the insert against an existing copy.
#[test]
fn distinct_productions_are_guarded() {
    let schema = compile_module(
        r#"
Facts:
  Login:
    User: STRING
  Seen2:
    User: STRING
Rules:
  Mark:
    Description: remember each user once
    MatchAll:
      - Fact: Login
        Meaning: a login
        Assign:
          Who: !expr "This.User"
    Assert: !distinct
      Seen2:
        User: !expr "Locals.Who"
"#,
    )
    .expect("compiles");

    assert!(schema.contains("NOT EXISTS (SELECT 1 FROM _test_facts_seen2 WHERE user = (new.who))"));
}

/// Suppression rules delete from the target fact's table.
#[test]
fn suppressions_emit_deletes() {
    let schema = compile_module(
        r#"
Facts:
  Login:
    User: STRING
  Alert: !output
    User: STRING
Rules:
  Produce:
    Description: alert on every login
    MatchAll:
      - Fact: Login
        Meaning: a login
        Assign:
          Who: !expr "This.User"
    Assert:
      Alert:
        User: !expr "Locals.Who"
  Clean:
    Description: drop alerts for the admin
    MatchAll:
      - Fact: Login
        Meaning: an admin login
        When: !expr "This.User == 'admin'"
    Suppress:
      Fact: Alert
      When: !expr "This.User == 'admin'"
"#,
    )
    .expect("compiles");

    assert!(schema.contains("DELETE FROM _test_facts_alert"));
    assert!(schema.contains("(_test_facts_alert.user) = ('admin')"));
}

/// Negative matches become NOT EXISTS guards on the action.
#[test]
fn negative_matches_guard_the_action() {
    let schema = compile_module(
        r#"
Facts:
  Login:
    User: STRING
  Block:
    User: STRING
  Alert: !output
    User: STRING
Rules:
  Careful:
    Description: alert unless blocked
    MatchAll:
      - Fact: Login
        Meaning: a login
        Assign:
          Who: !expr "This.User"
    MatchNone:
      - Fact: Block
        Meaning: the user is blocked
        When: !expr "This.User == Locals.Who"
    Assert:
      Alert:
        User: !expr "Locals.Who"
"#,
    )
    .expect("compiles");

    assert!(schema.contains(
        "NOT EXISTS (SELECT 1 FROM _test_facts_block WHERE (_test_facts_block.user) = (new.who))"
    ));
}

/// External functions lower to their declared symbol.
#[test]
fn external_functions_use_their_symbol() {
    let schema = compile_module(
        r#"
Functions:
  Canonical:
    External: canonical_host
    Parameters: [STRING]
    Returns: STRING
Facts:
  Login:
    Host: STRING
  Alert: !output
    Host: STRING
Rules:
  Normalise:
    Description: canonicalise the host
    MatchAll:
      - Fact: Login
        Meaning: a login
        Assign:
          Where2: !expr "canonical(This.Host)"
    Assert:
      Alert:
        Host: !expr "Locals.Where2"
"#,
    )
    .expect("compiles");

    assert!(schema.contains("canonical_host(new.host)"));
}

/// Disabled rules are skipped, and an engine with only disabled rules has
/// no active rule at all.
#[test]
fn disabled_rules_are_skipped() {
    let errors = analysis_errors(compile_module(
        r#"
Facts:
  Login:
    User: STRING
Rules:
  Off:
    Description: switched off
    Enabled: false
    MatchAll:
      - Fact: Login
        Meaning: a login
    Assert:
      Login:
        User: !expr "'x'"
"#,
    ));
    assert_eq!(errors, 1);
}
