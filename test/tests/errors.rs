//! Tests for error reporting.
//!
//! Every failure is returned to the caller as a distinct `PathweaveError`
//! variant carrying the offending path.

use std::rc::Rc;

use pathweave_test::prelude::*;

/// Test that a read-only view refuses writes.
#[test]
fn test_readonly_write_fails() {
    let harness = Harness::new(ComponentDefinition::new(counter_class()));

    let err = harness
        .component
        .create_readonly_state(|state| state.set("count", json!(1)))
        .unwrap_err();

    assert_eq!(
        err,
        PathweaveError::ReadonlyWrite {
            pattern: "count".to_string()
        }
    );
    assert!(!harness.scheduler.has_pending_work());
}

fn cyclic_class() -> StateClass {
    StateClass::builder(json!({}))
        .getter("a", |state| state.get("b"))
        .getter("b", |state| state.get("a"))
        .build()
        .unwrap()
}

/// Test that cyclic getters overflow the resolution stack.
#[test]
fn test_cyclic_getters_overflow_stack() {
    let harness = Harness::new(ComponentDefinition::new(cyclic_class()));

    let err = harness.get("a").unwrap_err();

    assert!(
        matches!(err, PathweaveError::StackOverflow { depth, .. } if depth == STACK_DEPTH),
        "unexpected error: {err:?}"
    );
}

/// Test that the stack depth comes from the engine config.
#[test]
fn test_stack_depth_is_configurable() {
    let config = EngineConfig {
        stack_depth: 4,
        ..EngineConfig::default()
    };
    let harness = Harness::new(ComponentDefinition::new(cyclic_class()).config(config));

    let err = harness.get("a").unwrap_err();

    assert!(matches!(err, PathweaveError::StackOverflow { depth: 4, .. }));
}

/// Test that a wildcard path needs an element context.
#[test]
fn test_wildcard_without_context() {
    let harness = Harness::new(todo_definition());

    let err = harness.get("items.*.title").unwrap_err();

    assert_eq!(
        err,
        PathweaveError::NoContextualIndex {
            pattern: "items.*.title".to_string()
        }
    );
}

/// Test that enqueueing or rendering a path the component never declared fails.
#[test]
fn test_unknown_path() {
    let harness = Harness::new(ComponentDefinition::new(counter_class()));
    let unknown = harness.component.state_ref("nowhere.at.all", None).unwrap();

    let err = harness.component.enqueue_ref(&unknown).unwrap_err();
    assert!(matches!(err, PathweaveError::UnknownPath { .. }));

    let err = harness.component.render(&[unknown]).unwrap_err();
    assert!(matches!(err, PathweaveError::UnknownPath { .. }));
}

/// Test that a getter without a setter cannot be assigned.
#[test]
fn test_getter_only_write() {
    let harness = Harness::new(ComponentDefinition::new(counter_class()));

    let err = harness.set("double", json!(8)).unwrap_err();

    assert!(matches!(err, PathweaveError::GetterOnly { .. }));
}

/// Test that an accessor routes writes through its setter.
#[test]
fn test_setter_write_is_routed() {
    let harness = Harness::new(ComponentDefinition::new(counter_class()));
    harness.bind("count").unwrap();

    harness.set("count_text", json!("7")).unwrap();
    harness.flush().unwrap();

    assert_eq!(harness.get("count").unwrap(), json!(7));
    assert_eq!(harness.log.values_for("count"), vec![json!(7)]);
}

/// Test that writing below a computed member fails.
#[test]
fn test_write_through_computed() {
    let class = StateClass::builder(json!({ "first": "Ada" }))
        .getter("profile", |state| Ok(json!({ "name": state.get("first")? })))
        .build()
        .unwrap();
    let harness = Harness::new(ComponentDefinition::new(class).path("profile.name"));

    assert_eq!(harness.get("profile.name").unwrap(), json!("Ada"));
    let err = harness.set("profile.name", json!("Grace")).unwrap_err();

    assert!(matches!(err, PathweaveError::WriteThroughComputed { .. }));
}

/// Test that a declared list holding a non-array value is reported.
#[test]
fn test_list_path_must_hold_array() {
    let class = StateClass::builder(json!({ "items": 3 })).build().unwrap();
    let harness = Harness::new(ComponentDefinition::new(class).list("items"));

    let err = harness.get("items").unwrap_err();

    assert!(matches!(err, PathweaveError::NotAList { .. }));
}

/// Test that a missing list reads as empty.
#[test]
fn test_null_list_is_empty() {
    let class = StateClass::builder(json!({ "items": null })).build().unwrap();
    let harness = Harness::new(ComponentDefinition::new(class).list("items"));

    assert_eq!(harness.get("items").unwrap(), Value::Null);
    let items = harness.component.state_ref("items", None).unwrap();
    assert_eq!(harness.component.get_list_indexes(&items), None);
}

/// Test that writing into a missing parent object fails.
#[test]
fn test_missing_parent_value() {
    let class = StateClass::builder(json!({ "user": null })).build().unwrap();
    let harness = Harness::new(ComponentDefinition::new(class));

    let err = harness.set("user.name", json!("Ada")).unwrap_err();

    assert!(matches!(err, PathweaveError::MissingParentValue { .. }));
}

/// Test that reserved names cannot be written.
#[test]
fn test_reserved_name_write() {
    let harness = Harness::new(ComponentDefinition::new(counter_class()));

    let err = harness.set("$1", json!(0)).unwrap_err();

    assert!(matches!(err, PathweaveError::ReservedName { .. }));
}

/// Test that an error inside a flush is returned by the scheduler.
#[test]
fn test_flush_error_propagates() {
    let harness = Harness::new(ComponentDefinition::new(cyclic_class()));
    harness.bind("a").unwrap();

    let a = harness.component.state_ref("a", None).unwrap();
    harness.component.enqueue_ref(&a).unwrap();
    let err = harness.flush().unwrap_err();

    assert!(matches!(err, PathweaveError::StackOverflow { .. }));
    assert_eq!(harness.component.phase(), UpdaterPhase::Idle);
}

/// Writes `other`, then reads the cyclic getter `a`.
struct WriteThenFail;

impl Binding for WriteThenFail {
    fn apply_change(&self, renderer: &mut Renderer<'_>) -> PathweaveResult<()> {
        let component = renderer.component();
        component.update(None, |state| state.set("other", json!(1)))?;
        component.create_readonly_state(|state| state.get("a"))?;
        Ok(())
    }
}

/// Test that a failed flush drops the refs it queued and later writes still
/// schedule a fresh flush.
#[test]
fn test_failed_flush_leaves_component_idle() {
    let class = StateClass::builder(json!({ "count": 0, "other": 0 }))
        .getter("a", |state| state.get("b"))
        .getter("b", |state| state.get("a"))
        .build()
        .unwrap();
    let harness = Harness::new(ComponentDefinition::new(class));
    let count = harness.component.state_ref("count", None).unwrap();
    harness.component.register_binding(count, Rc::new(WriteThenFail));
    harness.bind("other").unwrap();

    harness.set("count", json!(1)).unwrap();
    let err = harness.flush().unwrap_err();

    assert!(matches!(err, PathweaveError::StackOverflow { .. }));
    assert_eq!(harness.component.phase(), UpdaterPhase::Idle);
    assert!(harness.log.is_empty(), "the queued write was dropped with the flush");
    assert_eq!(harness.get("other").unwrap(), json!(1));

    harness.set("other", json!(2)).unwrap();
    assert!(harness.scheduler.has_pending_work());
    harness.flush().unwrap();

    assert_eq!(harness.log.values_for("other"), vec![json!(2)]);
    assert_eq!(harness.component.phase(), UpdaterPhase::Idle);
}
