use crate::common::compile_module;

pub mod common;

/// Two rules joining against the same materialised fact: one demands
/// `(user, time)` (equality first, the first inequality appended), the
/// other only `(user)`, which the longer demand absorbs.
const CORRELATOR: &str = r#"
Facts:
  Session:
    User: STRING
    Start: INTEGER
  Event:
    User: STRING
    Time: INTEGER
  Alert: !output
    User: STRING
Rules:
  Correlate:
    Description: pair sessions with later events
    MatchAll:
      - Fact: Session
        Meaning: the session
        Assign:
          Who: !expr "This.User"
          Began: !expr "This.Start"
      - Fact: Event
        Meaning: a matching later event
        When: !expr "This.User == Locals.Who and This.Time > Locals.Began"
    Assert:
      Alert:
        User: !expr "Locals.Who"
  CorrelateAgain:
    Description: equality-only variant
    MatchAll:
      - Fact: Session
        Meaning: the session
        Assign:
          Who2: !expr "This.User"
      - Fact: Event
        Meaning: an event for the same user
        When: !expr "This.User == Locals.Who2"
    Assert:
      Alert:
        User: !expr "Locals.Who2"
"#;

#[test]
fn joins_demand_one_index_per_leaf_path() {
    let schema = compile_module(CORRELATOR).expect("compiles");

    // Exactly one index on the event table, equalities first and exactly
    // one inequality column appended.
    let event_indexes: Vec<&str> = schema
        .lines()
        .filter(|line| line.contains("ON _test_facts_event("))
        .collect();
    assert_eq!(event_indexes.len(), 1, "{schema}");
    assert!(event_indexes[0].ends_with("ON _test_facts_event(user,time);"));
}

#[test]
fn index_statements_trail_the_schema_in_walk_order() {
    let schema = compile_module(CORRELATOR).expect("compiles");

    let index_block: Vec<&str> = schema
        .lines()
        .filter(|line| line.starts_with("CREATE INDEX"))
        .collect();

    // Frame-side and fact-side demands, numbered sequentially.
    assert!(!index_block.is_empty());
    for (position, line) in index_block.iter().enumerate() {
        assert!(
            line.starts_with(&format!("CREATE INDEX _test_auto_index_{}", position + 1)),
            "unexpected index line: {line}"
        );
    }

    // Everything after the first index line is an index line: the block is
    // the trailer of the schema.
    let first_index = schema.find("CREATE INDEX").expect("has indexes");
    assert!(schema[first_index..]
        .lines()
        .all(|line| line.is_empty() || line.starts_with("CREATE INDEX")));
}

#[test]
fn frame_joins_demand_local_columns_on_frame_tables() {
    let schema = compile_module(CORRELATOR).expect("compiles");
    assert!(schema.contains("ON _test_correlate_frame_0(who,began);"));
}

#[test]
fn joins_render_equalities_before_inequalities() {
    let schema = compile_module(CORRELATOR).expect("compiles");
    assert!(schema.contains(
        "(_test_facts_event.user) = (new.who) AND (_test_facts_event.time) > (new.began)"
    ));
}
