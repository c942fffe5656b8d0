//! Tests for the `$` keys and method invocation.
//!
//! These tests verify that:
//! - `$1`..`$9` answer the enclosing element positions
//! - `$resolve` and `$getAll` address wildcard paths with explicit positions
//! - `$trackDependency` records an edge without a read
//! - Methods run as write transactions in an element context

use pathweave_test::prelude::*;

fn rendered_todos() -> Harness {
    let harness = Harness::new(todo_definition());
    harness.bind_list("items", &[]).unwrap();
    harness.render_all().unwrap();
    harness
}

/// Test that loop indexes come from the transaction's element context.
#[test]
fn test_loop_index_from_context() {
    let harness = rendered_todos();
    let third = harness.element("items", 2).unwrap();

    let (level_one, as_value) = harness
        .component
        .update(Some(&third), |state| {
            Ok((state.loop_index(1)?, state.get("$1")?))
        })
        .unwrap();
    assert_eq!(level_one, 2);
    assert_eq!(as_value, json!(2));

    let err = harness
        .component
        .update(Some(&third), |state| state.loop_index(2))
        .unwrap_err();
    assert!(matches!(err, PathweaveError::NoContextualIndex { .. }));
}

/// Test that `$resolve` reads and writes with explicit positions.
#[test]
fn test_resolve_with_explicit_positions() {
    let harness = Harness::new(todo_definition());

    let title = harness
        .component
        .create_readonly_state(|state| {
            state.dispatch(ReservedKey::Resolve, &[json!("items.*.title"), json!([2])])
        })
        .unwrap();
    assert_eq!(title, json!("ship"));

    harness
        .component
        .update(None, |state| {
            state.dispatch(
                ReservedKey::Resolve,
                &[json!("items.*.title"), json!([0]), json!("draft")],
            )
        })
        .unwrap();
    assert_eq!(harness.component.data_snapshot()["items"][0]["title"], json!("draft"));

    let err = harness
        .component
        .create_readonly_state(|state| state.resolve("items.*.title", &[9]))
        .unwrap_err();
    assert!(matches!(
        err,
        PathweaveError::IdentityOutOfRange { position: 9, .. }
    ));
}

/// Test that `$getAll` collects every element, or the elements under fixed
/// outer positions.
#[test]
fn test_get_all() {
    let harness = Harness::new(todo_definition());
    let titles = harness
        .component
        .create_readonly_state(|state| {
            state.dispatch(ReservedKey::GetAll, &[json!("items.*.title")])
        })
        .unwrap();
    assert_eq!(titles, json!(["write", "test", "ship"]));

    let class = StateClass::builder(json!({
        "groups": [
            { "tags": ["a", "b"] },
            { "tags": ["c"] },
        ]
    }))
    .build()
    .unwrap();
    let harness = Harness::new(ComponentDefinition::new(class));
    let (all, second) = harness
        .component
        .create_readonly_state(|state| {
            Ok((
                state.get_all("groups.*.tags.*", &[])?,
                state.get_all("groups.*.tags.*", &[1])?,
            ))
        })
        .unwrap();
    assert_eq!(all, vec![json!("a"), json!("b"), json!("c")]);
    assert_eq!(second, vec![json!("c")]);
}

/// Test that `$trackDependency` adds an edge, and that the edge drives renders.
#[test]
fn test_track_dependency() {
    let class = StateClass::builder(json!({ "filter": "all" }))
        .getter("summary", |state| {
            state.dispatch(ReservedKey::TrackDependency, &[json!("filter")])?;
            Ok(json!("static"))
        })
        .build()
        .unwrap();
    let harness = Harness::new(ComponentDefinition::new(class));
    harness.bind("summary").unwrap();

    assert_eq!(harness.get("summary").unwrap(), json!("static"));
    assert_eq!(
        harness.engine.path_manager().snapshot().dynamic_dependencies["filter"],
        vec!["summary"]
    );

    harness.set("filter", json!("done")).unwrap();
    harness.flush().unwrap();
    assert_eq!(harness.log.count_for("summary"), 1);
}

/// Test that a method runs in the element context it was invoked with.
#[test]
fn test_invoke_in_element_context() {
    let harness = rendered_todos();
    harness.bind("remaining").unwrap();
    let second = harness.element("items", 1).unwrap();
    harness.get("remaining").unwrap();

    let position = harness
        .component
        .invoke("toggle", Some(&second), &[])
        .unwrap();
    harness.flush().unwrap();

    assert_eq!(position, json!(1));
    assert_eq!(harness.component.data_snapshot()["items"][1]["done"], json!(false));
    assert_eq!(harness.log.values_for("remaining"), vec![json!(3)]);
}

/// Test that methods without context work and that non-methods are refused.
#[test]
fn test_invoke_errors() {
    let harness = Harness::new(ComponentDefinition::new(counter_class()));

    harness.component.invoke("increment", None, &[]).unwrap();
    assert_eq!(harness.get("count").unwrap(), json!(1));

    let err = harness.component.invoke("double", None, &[]).unwrap_err();
    assert!(matches!(err, PathweaveError::NotCallable { .. }));

    let err = harness.component.invoke("missing", None, &[]).unwrap_err();
    assert!(matches!(err, PathweaveError::UnknownMember { .. }));
}
