use sequent::CompileError;
use test_case::test_case;

use crate::common::{analysis_errors, compile_module, options};

pub mod common;

/// A harmless rule used so that the scenario under test is not also the
/// only-rule-in-the-set.
const GOOD_RULE: &str = r#"
  Good:
    Description: always fine
    MatchAll:
      - Fact: InitialFact
        Meaning: startup
    Assert:
      Marker:
        Done: !expr "true"
"#;

/// Facts shared by the error scenarios.
const BASE_FACTS: &str = r#"
Facts:
  Marker:
    Done: BOOLEAN
  Login:
    User: STRING
    Count: INTEGER
"#;

#[test]
fn mixed_type_arithmetic_fails_the_rule() {
    let module = format!(
        r#"{BASE_FACTS}
Rules:
  Bad:
    Description: adds an integer to a real
    MatchAll:
      - Fact: Login
        Meaning: a login
        Assign:
          N: !expr "This.Count"
    When: !expr "Locals.N + 1.0"
    Assert:
      Marker:
        Done: !expr "true"
{GOOD_RULE}"#
    );

    assert_eq!(analysis_errors(compile_module(&module)), 1);
}

#[test]
fn cycles_are_rejected() {
    let module = r#"
Facts:
  F:
    X: INTEGER
  G:
    X: INTEGER
Rules:
  A:
    Description: seed
    MatchAll:
      - Fact: InitialFact
        Meaning: startup
    Assert:
      F:
        X: 1
  B:
    Description: F to G
    MatchAll:
      - Fact: F
        Meaning: an F
        When: !expr "This.X > 0"
    Assert:
      G:
        X: 2
  C:
    Description: G back to F
    MatchAll:
      - Fact: G
        Meaning: a G
        When: !expr "This.X > 0"
    Assert:
      F:
        X: 3
"#;

    assert_eq!(analysis_errors(compile_module(module)), 1);

    // With the cycle check disabled the same engine compiles.
    let mut relaxed = options();
    relaxed.check_cycles = false;
    assert!(sequent::compile(&[("module.yml", module)], &relaxed).is_ok());
}

#[test]
fn suppressing_a_distinct_production_is_rejected() {
    let module = r#"
Facts:
  F:
    X: INTEGER
Rules:
  D:
    Description: distinctly produce F
    MatchAll:
      - Fact: InitialFact
        Meaning: startup
    Assert: !distinct
      F:
        X: 1
  E:
    Description: suppress F
    MatchAll:
      - Fact: InitialFact
        Meaning: startup
    Suppress:
      Fact: F
      When: !expr "This.X == 1"
"#;

    assert_eq!(analysis_errors(compile_module(module)), 1);
}

#[test_case(r#"When: !expr "true""#; "a literal predicate")]
#[test_case(r#"When: !expr "Locals.N == This.Count""#; "a local-rooted comparison")]
fn non_joinable_match_predicates_are_rejected(when: &str) {
    let module = format!(
        r#"{BASE_FACTS}
Rules:
  Bad:
    Description: not joinable
    MatchAll:
      - Fact: Login
        Meaning: binds a local
        Assign:
          N: !expr "This.Count"
      - Fact: Login
        Meaning: tested the wrong way round
        {when}
    Assert:
      Marker:
        Done: !expr "true"
{GOOD_RULE}"#
    );

    assert_eq!(analysis_errors(compile_module(&module)), 1);
}

#[test]
fn duplicate_local_assignments_are_rejected() {
    let module = format!(
        r#"{BASE_FACTS}
Rules:
  Bad:
    Description: binds N twice
    MatchAll:
      - Fact: Login
        Meaning: first binding
        Assign:
          N: !expr "This.Count"
      - Fact: Login
        Meaning: second binding
        Assign:
          N: !expr "This.Count"
    Assert:
      Marker:
        Done: !expr "true"
{GOOD_RULE}"#
    );

    assert_eq!(analysis_errors(compile_module(&module)), 1);
}

#[test_case("Unassigned", r#"
      Alert2:
        User: !expr "'x'"
"#; "a field left unassigned")]
#[test_case("WrongType", r#"
      Alert2:
        User: !expr "'x'"
        Total: !expr "'not a number'"
"#; "a field of the wrong type")]
fn bad_productions_fail_the_rule(_label: &str, assert_clause: &str) {
    let module = format!(
        r#"
Facts:
  Marker:
    Done: BOOLEAN
  Alert2:
    User: STRING
    Total: INTEGER
Rules:
  Bad:
    Description: a bad production
    MatchAll:
      - Fact: InitialFact
        Meaning: startup
    Assert:{assert_clause}
{GOOD_RULE}"#
    );

    assert_eq!(analysis_errors(compile_module(&module)), 1);
}

#[test_case("NoLimits", "Default: 5"; "numeric without limits")]
#[test_case(
    "OutOfOrder",
    "Default: 5\n    Lower: 10\n    Upper: 1";
    "limits out of order"
)]
#[test_case(
    "OutOfRange",
    "Default: 50\n    Lower: 1\n    Upper: 10";
    "default outside the limits"
)]
#[test_case(
    "StringLimits",
    "Default: hello\n    Lower: 1\n    Upper: 10";
    "limits on a string"
)]
fn bad_parameters_are_reported(_label: &str, body: &str) {
    let module = format!(
        r#"
Parameters:
  Tunable:
    {body}
Facts:
  Marker:
    Done: BOOLEAN
Rules:
{GOOD_RULE}"#
    );

    assert_eq!(analysis_errors(compile_module(&module)), 1);
}

#[test]
fn parameters_cannot_be_produced_or_suppressed() {
    let produced = format!(
        r#"
Parameters:
  Window:
    Default: 30
    Lower: 1
    Upper: 3600
Facts:
  Marker:
    Done: BOOLEAN
Rules:
  Bad:
    Description: writes to a parameter
    MatchAll:
      - Fact: InitialFact
        Meaning: startup
    Assert:
      Window:
        Value: 1
{GOOD_RULE}"#
    );
    assert_eq!(analysis_errors(compile_module(&produced)), 1);

    let suppressed = format!(
        r#"
Parameters:
  Window:
    Default: 30
    Lower: 1
    Upper: 3600
Facts:
  Marker:
    Done: BOOLEAN
Rules:
  Bad:
    Description: deletes a parameter
    MatchAll:
      - Fact: InitialFact
        Meaning: startup
    Suppress:
      Fact: Window
      When: !expr "This.Value == 30"
{GOOD_RULE}"#
    );
    assert_eq!(analysis_errors(compile_module(&suppressed)), 1);
}

#[test]
fn unknown_facts_fail_the_rule() {
    let module = format!(
        r#"{BASE_FACTS}
Rules:
  Bad:
    Description: matches a ghost
    MatchAll:
      - Fact: Ghost
        Meaning: does not exist
    Assert:
      Marker:
        Done: !expr "true"
{GOOD_RULE}"#
    );

    assert_eq!(analysis_errors(compile_module(&module)), 1);
}

#[test]
fn document_shape_failures_are_load_errors() {
    // A rule without a description fails validation, not analysis.
    let result = compile_module(
        r#"
Facts:
  Login:
    User: STRING
Rules:
  Bad:
    MatchAll:
      - Fact: Login
        Meaning: a login
    Assert:
      Login:
        User: !expr "'x'"
"#,
    );

    assert!(matches!(result, Err(CompileError::Load(_))));
}

#[test]
fn reserved_names_are_rejected_at_validation() {
    let result = compile_module(
        r#"
Facts:
  Select:
    User: STRING
Rules:
  Good:
    Description: fine
    MatchAll:
      - Fact: Select
        Meaning: a select
    Assert:
      Select:
        User: !expr "'x'"
"#,
    );

    assert!(matches!(result, Err(CompileError::Load(_))));
}
